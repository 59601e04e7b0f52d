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

//! `/metrics`, `/healthz` and `/readyz`.

use crate::metrics::Metrics;
use axum::{Router, extract::State, response::IntoResponse, routing::get};
use http::{StatusCode, header};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(export_metrics))
        .route("/healthz", get(health_check))
        .route("/readyz", get(ready_check))
        .with_state(metrics)
        .layer(TraceLayer::new_for_http())
}

/// Serves [`router`] on `addr` until `cancel` fires.
pub async fn run(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on http://{}", addr);

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

async fn export_metrics(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("encode metrics failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ready_check() -> impl IntoResponse {
    (StatusCode::OK, "Ready")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::key::ObjectKey;

    #[tokio::test]
    async fn test_metrics_endpoint_serves_registry() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.resized(&ObjectKey::new("default", "data-0"));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router(metrics))
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        });

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let body = client
            .get(format!("http://{addr}/metrics"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("pvc_autoscaler_resized_total"));

        let health = client
            .get(format!("http://{addr}/healthz"))
            .send()
            .await
            .unwrap();
        assert_eq!(health.status(), reqwest::StatusCode::OK);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
