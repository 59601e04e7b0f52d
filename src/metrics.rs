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

//! Outcome counters, owned by one registry created at startup.

use crate::types::key::ObjectKey;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "pvc_autoscaler";
const VOLUME_LABELS: [&str; 2] = ["namespace", "persistentvolumeclaim"];
const REASON_LABELS: [&str; 3] = ["namespace", "persistentvolumeclaim", "reason"];

pub struct Metrics {
    registry: Registry,
    resized: IntCounterVec,
    threshold_reached: IntCounterVec,
    max_capacity_reached: IntCounterVec,
    skipped: IntCounterVec,
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec, prometheus::Error> {
    let counter = IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            resized: counter(
                &registry,
                "resized_total",
                "Number of capacity increases requested",
                &VOLUME_LABELS,
            )?,
            threshold_reached: counter(
                &registry,
                "threshold_reached_total",
                "Number of times a free space or inodes threshold was crossed",
                &REASON_LABELS,
            )?,
            max_capacity_reached: counter(
                &registry,
                "max_capacity_reached_total",
                "Number of times a volume needed to grow but was already at its maximum capacity",
                &VOLUME_LABELS,
            )?,
            skipped: counter(
                &registry,
                "skipped_total",
                "Number of evaluations that ended without action, by reason",
                &REASON_LABELS,
            )?,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn resized(&self, volume: &ObjectKey) {
        self.resized
            .with_label_values(&[volume.namespace.as_str(), volume.name.as_str()])
            .inc();
    }

    pub fn threshold_reached(&self, volume: &ObjectKey, reason: &str) {
        self.threshold_reached
            .with_label_values(&[volume.namespace.as_str(), volume.name.as_str(), reason])
            .inc();
    }

    pub fn max_capacity_reached(&self, volume: &ObjectKey) {
        self.max_capacity_reached
            .with_label_values(&[volume.namespace.as_str(), volume.name.as_str()])
            .inc();
    }

    pub fn skipped(&self, volume: &ObjectKey, reason: &str) {
        self.skipped
            .with_label_values(&[volume.namespace.as_str(), volume.name.as_str(), reason])
            .inc();
    }

    pub fn resized_count(&self, volume: &ObjectKey) -> u64 {
        self.resized
            .with_label_values(&[volume.namespace.as_str(), volume.name.as_str()])
            .get()
    }

    pub fn threshold_reached_count(&self, volume: &ObjectKey, reason: &str) -> u64 {
        self.threshold_reached
            .with_label_values(&[volume.namespace.as_str(), volume.name.as_str(), reason])
            .get()
    }

    pub fn max_capacity_reached_count(&self, volume: &ObjectKey) -> u64 {
        self.max_capacity_reached
            .with_label_values(&[volume.namespace.as_str(), volume.name.as_str()])
            .get()
    }

    pub fn skipped_count(&self, volume: &ObjectKey, reason: &str) -> u64 {
        self.skipped
            .with_label_values(&[volume.namespace.as_str(), volume.name.as_str(), reason])
            .get()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_registries_are_isolated() {
        let key = ObjectKey::new("default", "data-0");
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();

        first.resized(&key);
        first.skipped(&key, "StillResizing");

        assert_eq!(first.resized_count(&key), 1);
        assert_eq!(first.skipped_count(&key, "StillResizing"), 1);
        assert_eq!(second.resized_count(&key), 0);
    }

    #[test]
    fn test_encode_exposes_counters() {
        let key = ObjectKey::new("default", "data-0");
        let metrics = Metrics::new().unwrap();
        metrics.threshold_reached(&key, "FreeSpaceThresholdReached");

        let text = metrics.encode().unwrap();
        assert!(text.contains("pvc_autoscaler_threshold_reached_total"));
        assert!(text.contains(r#"reason="FreeSpaceThresholdReached""#));
    }
}
