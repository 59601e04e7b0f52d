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

use super::{
    Error, EventKind, IndexClosedSnafu, KubeSnafu, NoResourceVersionSnafu, RecordSnafu, Signal,
    Store,
};
use crate::types::annotations;
use crate::types::key::ObjectKey;
use crate::types::managed::{Managed, ManagedRef};
use crate::types::v1alpha1::autoscaler::PersistentVolumeClaimAutoscaler;
use crate::types::v1alpha1::status::Status;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::storage::v1 as storagev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Patch, PatchParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::runtime::reflector::{self, Store as Index};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use snafu::futures::TryFutureExt;
use snafu::OptionExt;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const REPORTER: &str = "pvc-autoscaler";

/// [`Store`] backed by the Kubernetes API server.
///
/// Enabled objects are listed from watch-fed reflector indexes; gets and
/// patches always go to the API server.
pub struct KubeStore {
    client: kube::Client,
    recorder: Recorder,
    volumes: Index<corev1::PersistentVolumeClaim>,
    autoscalers: Index<PersistentVolumeClaimAutoscaler>,
}

async fn drive<K, S>(stream: S, cancel: CancellationToken, kind: &'static str)
where
    K: Debug,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>>,
{
    let mut stream = std::pin::pin!(stream);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = stream.next() => match event {
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!(kind, "watch failed: {}", e),
                None => break,
            },
        }
    }
    debug!(kind, "index watcher stopped");
}

fn index<K>(api: Api<K>, cancel: &CancellationToken, kind: &'static str) -> Index<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer);
    tokio::spawn(drive(stream, cancel.clone(), kind));
    reader
}

impl KubeStore {
    /// Starts the indexes and waits for their initial list.
    pub async fn start(client: kube::Client, cancel: &CancellationToken) -> Result<Self, Error> {
        let reporter = Reporter {
            controller: REPORTER.into(),
            instance: std::env::var("HOSTNAME").ok(),
        };
        let recorder = Recorder::new(client.clone(), reporter);

        let volumes = index(
            Api::<corev1::PersistentVolumeClaim>::all(client.clone()),
            cancel,
            "persistentvolumeclaims",
        );
        let autoscalers = index(
            Api::<PersistentVolumeClaimAutoscaler>::all(client.clone()),
            cancel,
            "persistentvolumeclaimautoscalers",
        );

        volumes.wait_until_ready().await.ok().context(IndexClosedSnafu {
            kind: "persistentvolumeclaims",
        })?;
        autoscalers.wait_until_ready().await.ok().context(IndexClosedSnafu {
            kind: "persistentvolumeclaimautoscalers",
        })?;
        info!(
            volumes = volumes.state().len(),
            autoscalers = autoscalers.state().len(),
            "indexes synced"
        );

        Ok(Self {
            client,
            recorder,
            volumes,
            autoscalers,
        })
    }

    fn volume_api(&self, namespace: &str) -> Api<corev1::PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn autoscaler_api(&self, namespace: &str) -> Api<PersistentVolumeClaimAutoscaler> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn enabled(&self) -> Result<Vec<Managed>, Error> {
        let volumes = self
            .volumes
            .state()
            .into_iter()
            .filter(|pvc| pvc.meta().deletion_timestamp.is_none())
            .filter(|pvc| annotations::is_enabled(pvc.annotations()))
            .map(|pvc| Managed::Volume(Arc::unwrap_or_clone(pvc)));

        let autoscalers = self
            .autoscalers
            .state()
            .into_iter()
            .filter(|pvca| pvca.meta().deletion_timestamp.is_none())
            .map(|pvca| Managed::Autoscaler(Arc::unwrap_or_clone(pvca)));

        Ok(volumes.chain(autoscalers).collect())
    }

    async fn managed(&self, reference: &ManagedRef) -> Result<Option<Managed>, Error> {
        match reference {
            ManagedRef::Volume(key) => Ok(self
                .volume_api(&key.namespace)
                .get_opt(&key.name)
                .context(KubeSnafu)
                .await?
                .filter(|pvc| annotations::is_enabled(pvc.annotations()))
                .map(Managed::Volume)),
            ManagedRef::Autoscaler(key) => Ok(self
                .autoscaler_api(&key.namespace)
                .get_opt(&key.name)
                .context(KubeSnafu)
                .await?
                .map(Managed::Autoscaler)),
        }
    }

    async fn patch_request(
        &self,
        volume: &corev1::PersistentVolumeClaim,
        request: &Quantity,
    ) -> Result<corev1::PersistentVolumeClaim, Error> {
        let key = ObjectKey::of(volume)?;
        let resource_version = volume
            .resource_version()
            .context(NoResourceVersionSnafu { key: key.clone() })?;

        // the API server rejects the merge patch with 409 when the version is stale
        let patch = json!({
            "metadata": { "resourceVersion": resource_version },
            "spec": { "resources": { "requests": { "storage": request } } }
        });

        self.volume_api(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|source| {
                let err = Error::Kube { source };
                if err.is_conflict() {
                    Error::Conflict {
                        key,
                        resource_version,
                    }
                } else {
                    err
                }
            })
    }

    async fn write_status(&self, owner: &Managed, status: &Status) -> Result<(), Error> {
        match owner {
            Managed::Volume(pvc) => {
                let key = ObjectKey::of(pvc)?;
                let patch = json!({
                    "metadata": { "annotations": annotations::status_patch(status) }
                });
                self.volume_api(&key.namespace)
                    .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
                    .context(KubeSnafu)
                    .await?;
            }
            Managed::Autoscaler(pvca) => {
                let key = ObjectKey::of(pvca)?;
                let patch = json!({ "status": status });
                self.autoscaler_api(&key.namespace)
                    .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
                    .context(KubeSnafu)
                    .await?;
            }
        }
        Ok(())
    }

    /// send event
    #[inline]
    async fn record(&self, owner: &Managed, signal: &Signal) -> Result<(), Error> {
        let type_ = match signal.kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        };

        self.recorder
            .publish(
                &Event {
                    type_,
                    reason: signal.reason.clone(),
                    note: Some(signal.message.clone()),
                    action: "Autoscale".into(),
                    secondary: None,
                },
                &owner.object_ref(),
            )
            .context(RecordSnafu)
            .await
    }
}

impl Store for KubeStore {
    fn list_enabled(&self) -> BoxFuture<'_, Result<Vec<Managed>, Error>> {
        Box::pin(self.enabled())
    }

    fn get_managed<'a>(
        &'a self,
        reference: &'a ManagedRef,
    ) -> BoxFuture<'a, Result<Option<Managed>, Error>> {
        Box::pin(self.managed(reference))
    }

    fn get_volume<'a>(
        &'a self,
        key: &'a ObjectKey,
    ) -> BoxFuture<'a, Result<Option<corev1::PersistentVolumeClaim>, Error>> {
        Box::pin(async move {
            self.volume_api(&key.namespace)
                .get_opt(&key.name)
                .context(KubeSnafu)
                .await
        })
    }

    fn get_storage_class<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<storagev1::StorageClass>, Error>> {
        Box::pin(async move {
            Api::<storagev1::StorageClass>::all(self.client.clone())
                .get_opt(name)
                .context(KubeSnafu)
                .await
        })
    }

    fn patch_volume_request<'a>(
        &'a self,
        volume: &'a corev1::PersistentVolumeClaim,
        request: &'a Quantity,
    ) -> BoxFuture<'a, Result<corev1::PersistentVolumeClaim, Error>> {
        Box::pin(self.patch_request(volume, request))
    }

    fn patch_status<'a>(
        &'a self,
        owner: &'a Managed,
        status: &'a Status,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(self.write_status(owner, status))
    }

    fn publish<'a>(
        &'a self,
        owner: &'a Managed,
        signal: &'a Signal,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(self.record(owner, signal))
    }
}
