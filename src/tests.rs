//  Copyright 2025 RustFS Team
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//      http:www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::store::{self, Signal, Store};
use crate::types::annotations;
use crate::types::key::ObjectKey;
use crate::types::managed::{Managed, ManagedRef};
use crate::types::v1alpha1::autoscaler::{
    PersistentVolumeClaimAutoscaler, PersistentVolumeClaimAutoscalerSpec, TargetRef,
};
use crate::types::v1alpha1::status::Status;
use crate::types::volume::{STORAGE, VOLUME_MODE_FILESYSTEM};
use crate::utils::lock_unpoisoned;
use futures::future::{self, BoxFuture};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::storage::v1 as storagev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub const STORAGE_CLASS: &str = "standard";

fn storage_class(allow_volume_expansion: bool) -> storagev1::StorageClass {
    storagev1::StorageClass {
        metadata: metav1::ObjectMeta {
            name: Some(STORAGE_CLASS.to_owned()),
            ..Default::default()
        },
        provisioner: "csi.example.com".to_owned(),
        allow_volume_expansion: Some(allow_volume_expansion),
        ..Default::default()
    }
}

pub fn expandable_class() -> storagev1::StorageClass {
    storage_class(true)
}

pub fn fixed_class() -> storagev1::StorageClass {
    storage_class(false)
}

/// A bound filesystem claim whose request and capacity both equal `size`.
pub fn new_pvc(name: &str, size: &str) -> corev1::PersistentVolumeClaim {
    let storage = BTreeMap::from([(STORAGE.to_owned(), Quantity(size.to_owned()))]);

    corev1::PersistentVolumeClaim {
        metadata: metav1::ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some("default".to_owned()),
            generation: Some(1),
            ..Default::default()
        },
        spec: Some(corev1::PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_owned()]),
            storage_class_name: Some(STORAGE_CLASS.to_owned()),
            volume_mode: Some(VOLUME_MODE_FILESYSTEM.to_owned()),
            resources: Some(corev1::VolumeResourceRequirements {
                requests: Some(storage.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: Some(corev1::PersistentVolumeClaimStatus {
            phase: Some("Bound".to_owned()),
            capacity: Some(storage),
            ..Default::default()
        }),
    }
}

/// [`new_pvc`] opted into autoscaling through its annotations.
pub fn new_annotated_pvc(name: &str, size: &str, max_capacity: &str) -> corev1::PersistentVolumeClaim {
    let mut pvc = new_pvc(name, size);
    let annotations = pvc.annotations_mut();
    annotations.insert(annotations::IS_ENABLED.to_owned(), "true".to_owned());
    annotations.insert(annotations::MAX_CAPACITY.to_owned(), max_capacity.to_owned());
    pvc
}

/// An autoscaler named `<target>-autoscaler` with default thresholds.
pub fn new_autoscaler(target: &str, max_capacity: &str) -> PersistentVolumeClaimAutoscaler {
    let mut autoscaler = PersistentVolumeClaimAutoscaler::new(
        &format!("{target}-autoscaler"),
        PersistentVolumeClaimAutoscalerSpec {
            target_ref: TargetRef::persistent_volume_claim(target),
            max_capacity: Quantity(max_capacity.to_owned()),
            ..Default::default()
        },
    );
    autoscaler.metadata.namespace = Some("default".to_owned());
    autoscaler.metadata.generation = Some(1);
    autoscaler
}

pub fn set_pvc_condition(pvc: &mut corev1::PersistentVolumeClaim, type_: &str, status: &str) {
    let conditions = pvc
        .status
        .get_or_insert_with(Default::default)
        .conditions
        .get_or_insert_with(Vec::new);

    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(condition) => condition.status = status.to_owned(),
        None => conditions.push(corev1::PersistentVolumeClaimCondition {
            type_: type_.to_owned(),
            status: status.to_owned(),
            ..Default::default()
        }),
    }
}

struct Inner {
    volumes: BTreeMap<ObjectKey, corev1::PersistentVolumeClaim>,
    autoscalers: BTreeMap<ObjectKey, PersistentVolumeClaimAutoscaler>,
    classes: BTreeMap<String, storagev1::StorageClass>,
    events: Vec<(ObjectKey, Signal)>,
    version: u64,
    request_patches: usize,
    conflict_next_patch: bool,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// In-memory [`Store`] with resource versions, so conditional patches can
/// conflict the way they do against the API server.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let class = expandable_class();
        Self {
            inner: Mutex::new(Inner {
                volumes: BTreeMap::new(),
                autoscalers: BTreeMap::new(),
                classes: BTreeMap::from([(class.name_any(), class)]),
                events: Vec::new(),
                version: 0,
                request_patches: 0,
                conflict_next_patch: false,
            }),
        }
    }
}

impl MemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        lock_unpoisoned(&self.inner, "memory store")
    }

    pub fn insert_volume(&self, mut pvc: corev1::PersistentVolumeClaim) {
        let mut inner = self.lock();
        pvc.metadata.resource_version = Some(inner.next_version());
        let key = ObjectKey::of(&pvc).unwrap();
        inner.volumes.insert(key, pvc);
    }

    pub fn insert_autoscaler(&self, mut autoscaler: PersistentVolumeClaimAutoscaler) {
        let mut inner = self.lock();
        autoscaler.metadata.resource_version = Some(inner.next_version());
        let key = ObjectKey::of(&autoscaler).unwrap();
        inner.autoscalers.insert(key, autoscaler);
    }

    pub fn set_expansion(&self, allow_volume_expansion: bool) {
        let class = storage_class(allow_volume_expansion);
        self.lock().classes.insert(class.name_any(), class);
    }

    pub fn volume(&self, key: &ObjectKey) -> Option<corev1::PersistentVolumeClaim> {
        self.lock().volumes.get(key).cloned()
    }

    pub fn autoscaler(&self, key: &ObjectKey) -> Option<PersistentVolumeClaimAutoscaler> {
        self.lock().autoscalers.get(key).cloned()
    }

    pub fn events(&self) -> Vec<(ObjectKey, Signal)> {
        self.lock().events.clone()
    }

    pub fn request_patches(&self) -> usize {
        self.lock().request_patches
    }

    pub fn conflict_next_patch(&self) {
        self.lock().conflict_next_patch = true;
    }

    /// Plays the resizer: the reported capacity catches up with the request.
    pub fn complete_resize(&self, key: &ObjectKey) {
        let mut inner = self.lock();
        let version = inner.next_version();
        let pvc = inner.volumes.get_mut(key).unwrap();
        let requested = pvc
            .spec
            .as_ref()
            .and_then(|s| s.resources.as_ref())
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get(STORAGE))
            .cloned()
            .unwrap();
        pvc.status
            .get_or_insert_with(Default::default)
            .capacity
            .get_or_insert_with(BTreeMap::new)
            .insert(STORAGE.to_owned(), requested);
        pvc.metadata.resource_version = Some(version);
    }

    fn managed(&self, reference: &ManagedRef) -> Option<Managed> {
        let inner = self.lock();
        match reference {
            ManagedRef::Volume(key) => inner
                .volumes
                .get(key)
                .filter(|pvc| annotations::is_enabled(pvc.annotations()))
                .cloned()
                .map(Managed::Volume),
            ManagedRef::Autoscaler(key) => inner.autoscalers.get(key).cloned().map(Managed::Autoscaler),
        }
    }

    fn patch_request(
        &self,
        volume: &corev1::PersistentVolumeClaim,
        request: &Quantity,
    ) -> Result<corev1::PersistentVolumeClaim, store::Error> {
        let key = ObjectKey::of(volume)?;
        let mut inner = self.lock();
        let resource_version = volume.resource_version().unwrap_or_default();

        let current = inner
            .volumes
            .get(&key)
            .and_then(|pvc| pvc.resource_version())
            .unwrap_or_default();
        if std::mem::take(&mut inner.conflict_next_patch) || current != resource_version {
            return Err(store::Error::Conflict {
                key,
                resource_version,
            });
        }

        let version = inner.next_version();
        inner.request_patches += 1;
        let pvc = inner.volumes.get_mut(&key).unwrap();
        pvc.spec
            .get_or_insert_with(Default::default)
            .resources
            .get_or_insert_with(Default::default)
            .requests
            .get_or_insert_with(BTreeMap::new)
            .insert(STORAGE.to_owned(), request.clone());
        pvc.metadata.resource_version = Some(version);
        Ok(pvc.clone())
    }

    fn write_status(&self, owner: &Managed, status: &Status) -> Result<(), store::Error> {
        let mut inner = self.lock();
        let version = inner.next_version();
        match owner {
            Managed::Volume(pvc) => {
                let key = ObjectKey::of(pvc)?;
                if let Some(stored) = inner.volumes.get_mut(&key) {
                    annotations::apply_status(stored.annotations_mut(), status);
                    stored.metadata.resource_version = Some(version);
                }
            }
            Managed::Autoscaler(autoscaler) => {
                let key = ObjectKey::of(autoscaler)?;
                if let Some(stored) = inner.autoscalers.get_mut(&key) {
                    // merge patch semantics: omitted sizes keep their value
                    let mut merged = status.clone();
                    if let Some(current) = &stored.status {
                        merged.prev_size = merged.prev_size.or_else(|| current.prev_size.clone());
                        merged.new_size = merged.new_size.or_else(|| current.new_size.clone());
                    }
                    stored.status = Some(merged);
                    stored.metadata.resource_version = Some(version);
                }
            }
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn list_enabled(&self) -> BoxFuture<'_, Result<Vec<Managed>, store::Error>> {
        let inner = self.lock();
        let volumes = inner
            .volumes
            .values()
            .filter(|pvc| annotations::is_enabled(pvc.annotations()))
            .cloned()
            .map(Managed::Volume);
        let autoscalers = inner.autoscalers.values().cloned().map(Managed::Autoscaler);
        let managed: Vec<Managed> = volumes.chain(autoscalers).collect();
        Box::pin(future::ready(Ok(managed)))
    }

    fn get_managed<'a>(
        &'a self,
        reference: &'a ManagedRef,
    ) -> BoxFuture<'a, Result<Option<Managed>, store::Error>> {
        Box::pin(future::ready(Ok(self.managed(reference))))
    }

    fn get_volume<'a>(
        &'a self,
        key: &'a ObjectKey,
    ) -> BoxFuture<'a, Result<Option<corev1::PersistentVolumeClaim>, store::Error>> {
        Box::pin(future::ready(Ok(self.volume(key))))
    }

    fn get_storage_class<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<storagev1::StorageClass>, store::Error>> {
        Box::pin(future::ready(Ok(self.lock().classes.get(name).cloned())))
    }

    fn patch_volume_request<'a>(
        &'a self,
        volume: &'a corev1::PersistentVolumeClaim,
        request: &'a Quantity,
    ) -> BoxFuture<'a, Result<corev1::PersistentVolumeClaim, store::Error>> {
        Box::pin(future::ready(self.patch_request(volume, request)))
    }

    fn patch_status<'a>(
        &'a self,
        owner: &'a Managed,
        status: &'a Status,
    ) -> BoxFuture<'a, Result<(), store::Error>> {
        Box::pin(future::ready(self.write_status(owner, status)))
    }

    fn publish<'a>(
        &'a self,
        owner: &'a Managed,
        signal: &'a Signal,
    ) -> BoxFuture<'a, Result<(), store::Error>> {
        let result = owner.reference().map_err(store::Error::from).map(|reference| {
            let key = match reference {
                ManagedRef::Volume(key) | ManagedRef::Autoscaler(key) => key,
            };
            self.lock().events.push((key, signal.clone()));
        });
        Box::pin(future::ready(result))
    }
}

mod flow {
    use super::*;
    use crate::context::Context;
    use crate::metrics::Metrics;
    use crate::metrics_source::VolumeInfo;
    use crate::metrics_source::fake::FakeSource;
    use crate::reconcile::{self, Outcome};
    use crate::scanner::Scanner;
    use crate::utils::quantity::GI;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn nearly_full(capacity: u64) -> VolumeInfo {
        VolumeInfo {
            capacity_bytes: capacity,
            available_bytes: capacity / 20,
            capacity_inodes: 1000,
            available_inodes: 1000,
        }
    }

    #[tokio::test]
    async fn test_grows_stepwise_until_max_capacity() {
        let key = ObjectKey::new("default", "data-0");
        let store = Arc::new(MemoryStore::default());
        store.insert_volume(new_annotated_pvc("data-0", "1Gi", "100Gi"));

        let source = FakeSource::new(Duration::from_secs(1), 0, 0);
        source.set(key.clone(), nearly_full(GI));

        let metrics = Arc::new(Metrics::new().unwrap());
        let (tx, mut rx) = mpsc::channel(4);
        let scanner = Scanner::builder()
            .source(Arc::new(source.clone()))
            .store(store.clone())
            .metrics(metrics.clone())
            .queue(tx)
            .build()
            .unwrap();
        let ctx = Context::new(store.clone(), metrics.clone());

        let mut sizes = vec![GI];
        loop {
            assert_eq!(scanner.scan().await.unwrap(), 1);
            let reference = rx.try_recv().unwrap();

            match reconcile::reconcile(&ctx, &reference).await.unwrap() {
                Outcome::Resized { from, to } => {
                    assert_eq!(from, *sizes.last().unwrap());
                    assert!(to > from && to <= 100 * GI);
                    sizes.push(to);
                }
                Outcome::MaxCapacityReached => break,
                other => panic!("unexpected outcome {other:?}"),
            }

            store.complete_resize(&key);
            source.set(key.clone(), nearly_full(*sizes.last().unwrap()));
        }

        assert_eq!(&sizes[..4], &[GI, 2 * GI, 3 * GI, 4 * GI]);
        assert_eq!(sizes.last(), Some(&(100 * GI)));
        assert!(sizes.iter().all(|size| size % GI == 0));
        assert_eq!(metrics.resized_count(&key), (sizes.len() - 1) as u64);

        // from here on only the maximum is reported
        for _ in 0..3 {
            assert_eq!(scanner.scan().await.unwrap(), 1);
            let reference = rx.try_recv().unwrap();
            assert_eq!(
                reconcile::reconcile(&ctx, &reference).await.unwrap(),
                Outcome::MaxCapacityReached
            );
        }
        assert_eq!(metrics.max_capacity_reached_count(&key), 4);
        assert_eq!(store.request_patches(), sizes.len() - 1);
    }
}
