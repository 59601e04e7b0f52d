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

//! Synthetic utilization that shrinks on a timer.

use super::{Error, MetricsSource, VolumeInfo, VolumeInfoMap};
use crate::types::key::ObjectKey;
use crate::utils::lock_unpoisoned;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Every `interval`, each known volume loses `consume_bytes` bytes and
/// `consume_inodes` inodes of available capacity, never going below zero.
#[derive(Clone)]
pub struct FakeSource {
    volumes: Arc<Mutex<VolumeInfoMap>>,
    interval: Duration,
    consume_bytes: u64,
    consume_inodes: u64,
}

impl FakeSource {
    pub fn new(interval: Duration, consume_bytes: u64, consume_inodes: u64) -> Self {
        Self {
            volumes: Arc::default(),
            interval,
            consume_bytes,
            consume_inodes,
        }
    }

    pub fn set(&self, key: ObjectKey, info: VolumeInfo) {
        lock_unpoisoned(&self.volumes, "fake volumes").insert(key, info);
    }

    pub fn remove(&self, key: &ObjectKey) {
        lock_unpoisoned(&self.volumes, "fake volumes").remove(key);
    }

    pub fn snapshot(&self) -> VolumeInfoMap {
        lock_unpoisoned(&self.volumes, "fake volumes").clone()
    }

    /// Consumes one interval worth of capacity.
    pub fn tick(&self) {
        let mut volumes = lock_unpoisoned(&self.volumes, "fake volumes");
        for info in volumes.values_mut() {
            info.available_bytes = info.available_bytes.saturating_sub(self.consume_bytes);
            info.available_inodes = info.available_inodes.saturating_sub(self.consume_inodes);
        }
        debug!(volumes = volumes.len(), "fake metrics consumed capacity");
    }

    /// Runs [`Self::tick`] on the configured interval until `cancel` fires.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let source = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(source.interval);
            // the first tick of an interval completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => source.tick(),
                }
            }
        })
    }
}

impl MetricsSource for FakeSource {
    fn get(&self) -> BoxFuture<'_, Result<VolumeInfoMap, Error>> {
        let volumes = self.snapshot();
        Box::pin(async move { Ok(volumes) })
    }
}
