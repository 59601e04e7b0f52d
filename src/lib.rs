// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::Config;
use crate::context::Context;
use crate::metrics::Metrics;
use crate::metrics_source::promql::PrometheusSource;
use crate::scanner::Scanner;
use crate::store::Store;
use crate::store::cluster::KubeStore;
use crate::types::error::InvalidPolicySnafu;
use crate::types::v1alpha1::autoscaler::{PersistentVolumeClaimAutoscaler, validation};
use kube::{Client, CustomResourceExt, ResourceExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub mod config;
mod context;
pub mod decision;
pub mod metrics;
pub mod metrics_source;
pub mod reconcile;
pub mod scanner;
pub mod server;
pub mod store;
pub mod types;
pub mod utils;

#[cfg(test)]
mod tests;

shadow_rs::shadow!(build);

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    config.validate()?;
    let resolution = config.resolution()?;
    info!(version = build::PKG_VERSION, commit = build::SHORT_COMMIT, "starting pvc-autoscaler");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                shutdown.cancel();
            }
            Err(e) => error!("listen for shutdown signal failed: {}", e),
        }
    });

    let client = Client::try_default().await?;
    let store: Arc<dyn Store> = Arc::new(KubeStore::start(client, &cancel).await?);
    let metrics = Arc::new(Metrics::new()?);

    let (queue, events) = mpsc::channel(config.queue_capacity);
    let scanner = Scanner::builder()
        .interval(config.interval())
        .stale_tolerance(config.stale_tolerance)
        .source(Arc::new(PrometheusSource::new(&config.prometheus_address)))
        .store(store.clone())
        .metrics(metrics.clone())
        .queue(queue)
        .build()?;

    let ctx = Arc::new(
        Context::new(store, metrics.clone())
            .with_resolution(resolution)
            .with_stale_tolerance(config.stale_tolerance),
    );

    let server = tokio::spawn(server::run(
        config.metrics_bind_address,
        metrics,
        cancel.clone(),
    ));
    let scanner = tokio::spawn(scanner.run(cancel.clone()));

    // returns once the scanner has stopped and the queue is drained
    reconcile::run(ctx, events, config.workers).await;
    scanner.await?;

    cancel.cancel();
    server.await??;
    info!("pvc-autoscaler stopped");

    Ok(())
}

pub async fn crd(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    writer
        .write_all(serde_yaml_ng::to_string(&PersistentVolumeClaimAutoscaler::crd())?.as_bytes())
        .await?;

    Ok(())
}

/// Defaults and validates one autoscaler manifest, reporting every violation.
pub fn check_manifest(
    manifest: &str,
) -> Result<PersistentVolumeClaimAutoscaler, Box<dyn std::error::Error>> {
    let mut autoscaler: PersistentVolumeClaimAutoscaler = serde_yaml_ng::from_str(manifest)?;
    validation::default(&mut autoscaler.spec);

    if let Err(violations) = validation::validate(&autoscaler.spec) {
        return InvalidPolicySnafu {
            name: autoscaler.name_any(),
            violations,
        }
        .fail()
        .map_err(Into::into);
    }
    Ok(autoscaler)
}

/// Prints the defaulted manifest when it is valid.
pub async fn validate(file: String) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = tokio::fs::read_to_string(&file).await?;
    let autoscaler = check_manifest(&manifest)?;

    tokio::io::stdout()
        .write_all(serde_yaml_ng::to_string(&autoscaler)?.as_bytes())
        .await?;

    Ok(())
}
