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

use crate::metrics::Metrics;
use crate::store::{self, Signal, Store};
use crate::types::key::ObjectKey;
use crate::types::managed::Managed;
use crate::types::v1alpha1::status::Status;
use crate::types::volume::VolumeExt;
use crate::utils::quantity::GI;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::storage::v1 as storagev1;
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_SCALING_RESOLUTION: u64 = GI;
pub const DEFAULT_STALE_TOLERANCE: f64 = 20.0;

pub struct Context {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) resolution: u64,
    pub(crate) stale_tolerance: f64,
}

impl Context {
    pub fn new(store: Arc<dyn Store>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            metrics,
            resolution: DEFAULT_SCALING_RESOLUTION,
            stale_tolerance: DEFAULT_STALE_TOLERANCE,
        }
    }

    pub fn with_resolution(mut self, resolution: u64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_stale_tolerance(mut self, tolerance: f64) -> Self {
        self.stale_tolerance = tolerance;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The claim a managed object scales, read fresh unless the object is
    /// the claim itself.
    pub async fn target_volume(
        &self,
        managed: &Managed,
        target: &ObjectKey,
    ) -> Result<Option<corev1::PersistentVolumeClaim>, store::Error> {
        match managed {
            Managed::Volume(pvc) => Ok(Some(pvc.clone())),
            Managed::Autoscaler(_) => self.store.get_volume(target).await,
        }
    }

    pub async fn storage_class(
        &self,
        volume: &corev1::PersistentVolumeClaim,
    ) -> Result<Option<storagev1::StorageClass>, store::Error> {
        match volume.storage_class_name() {
            Some(name) => self.store.get_storage_class(name).await,
            None => Ok(None),
        }
    }

    pub async fn update_status(&self, owner: &Managed, status: &Status) -> Result<(), store::Error> {
        self.store.patch_status(owner, status).await
    }

    /// send event
    ///
    /// Failing to publish never fails the caller.
    #[inline]
    pub async fn record(&self, owner: &Managed, signal: &Signal) {
        if let Err(e) = self.store.publish(owner, signal).await {
            warn!(reason = signal.reason.as_str(), "publish event failed: {}", e);
        }
    }
}
