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

//! The periodic scan loop.
//!
//! Every tick lists the enabled policy owners, takes one metrics snapshot
//! for all of them and evaluates each owner on its own. Owners that need to
//! grow are pushed onto the event queue as references only.

use crate::context::{Context, DEFAULT_STALE_TOLERANCE};
use crate::decision::{self, Decision, Ineligible};
use crate::metrics::Metrics;
use crate::metrics_source::{self, MetricsSource, VolumeInfoMap};
use crate::store::{self, Signal, Store};
use crate::types;
use crate::types::key::ObjectKey;
use crate::types::managed::{Managed, ManagedRef};
use crate::types::v1alpha1::status::{CONDITION_HEALTHY, ConditionStatus, Status, rfc3339};
use chrono::{DateTime, Utc};
use snafu::{OptionExt, ResultExt, Snafu};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const THRESHOLD_NOT_REACHED: &str = "ThresholdNotReached";
pub const NOT_BOUND: &str = "NotBound";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("scanner requires a {}", collaborator))]
    MissingCollaborator { collaborator: &'static str },

    #[snafu(display("list enabled volumes failed: {}", source))]
    List { source: store::Error },

    #[snafu(display("fetch volume metrics failed: {}", source))]
    Fetch { source: metrics_source::Error },

    #[snafu(display("target {} not found", key))]
    TargetNotFound { key: ObjectKey },

    #[snafu(display("event queue closed"))]
    QueueClosed,

    #[snafu(transparent)]
    Store { source: store::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },
}

/// Builds a [`Scanner`], refusing to do so without its collaborators.
#[derive(Default)]
pub struct ScannerBuilder {
    interval: Option<Duration>,
    stale_tolerance: Option<f64>,
    source: Option<Arc<dyn MetricsSource>>,
    store: Option<Arc<dyn Store>>,
    metrics: Option<Arc<Metrics>>,
    queue: Option<mpsc::Sender<ManagedRef>>,
}

impl ScannerBuilder {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn stale_tolerance(mut self, tolerance: f64) -> Self {
        self.stale_tolerance = Some(tolerance);
        self
    }

    pub fn source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn queue(mut self, queue: mpsc::Sender<ManagedRef>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn build(self) -> Result<Scanner, Error> {
        let queue = self.queue.context(MissingCollaboratorSnafu {
            collaborator: "event queue",
        })?;
        let source = self.source.context(MissingCollaboratorSnafu {
            collaborator: "metrics source",
        })?;
        let store = self.store.context(MissingCollaboratorSnafu {
            collaborator: "store",
        })?;
        let metrics = self.metrics.context(MissingCollaboratorSnafu {
            collaborator: "metrics registry",
        })?;

        let ctx = Context::new(store, metrics)
            .with_stale_tolerance(self.stale_tolerance.unwrap_or(DEFAULT_STALE_TOLERANCE));

        Ok(Scanner {
            interval: self.interval.unwrap_or(DEFAULT_INTERVAL),
            ctx,
            source,
            queue,
        })
    }
}

pub struct Scanner {
    interval: Duration,
    ctx: Context,
    source: Arc<dyn MetricsSource>,
    queue: mpsc::Sender<ManagedRef>,
}

impl Scanner {
    pub fn builder() -> ScannerBuilder {
        ScannerBuilder::default()
    }

    /// Scans on every tick until `cancel` fires.
    ///
    /// The scanner owns the only sender of the event queue, so returning
    /// closes the queue for its consumers.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, "scanner started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // a full queue holds the scan here until it drains or we are cancelled
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.scan() => result,
            };

            match result {
                Ok(queued) => debug!(queued, "scan finished"),
                Err(Error::QueueClosed) => {
                    warn!("event queue closed, stopping scanner");
                    break;
                }
                Err(e) => error!("scan failed: {}", e),
            }
        }
        info!("scanner stopped");
    }

    /// One tick. Returns how many references were queued.
    pub async fn scan(&self) -> Result<usize, Error> {
        let candidates = self.ctx.store.list_enabled().await.context(ListSnafu)?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let volumes = self.source.get().await.context(FetchSnafu)?;
        let now = Utc::now();

        let mut queued = 0;
        for managed in &candidates {
            match self.evaluate(managed, &volumes, now).await {
                Ok(Some(reference)) => {
                    self.queue
                        .send(reference)
                        .await
                        .ok()
                        .context(QueueClosedSnafu)?;
                    queued += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(owner = ?managed.reference().ok(), "evaluate failed: {}", e),
            }
        }
        Ok(queued)
    }

    /// Evaluates one owner and stamps its status whatever the outcome.
    async fn evaluate(
        &self,
        managed: &Managed,
        volumes: &VolumeInfoMap,
        now: DateTime<Utc>,
    ) -> Result<Option<ManagedRef>, Error> {
        let reference = managed.reference()?;
        let mut status = managed.status().unwrap_or_else(|e| {
            warn!(owner = %reference, "discarding unreadable status: {}", e);
            Status::default()
        });

        status.last_check = Some(rfc3339(now));
        status.next_check = chrono::Duration::from_std(self.interval)
            .ok()
            .and_then(|interval| now.checked_add_signed(interval))
            .map(rfc3339);

        let outcome = self.decide(managed, volumes, &mut status).await;
        let generation = managed.generation();

        let queue = match &outcome {
            Ok((target, Decision::Resize(trigger))) => {
                let reason: &'static str = trigger.reason.into();
                let message = trigger.message();
                info!(volume = %target, reason, "{}", message);
                self.ctx.metrics.threshold_reached(target, reason);
                self.ctx
                    .record(managed, &Signal::warning(reason, message))
                    .await;
                Some(reference)
            }
            Ok((target, Decision::ThresholdNotReached)) => {
                debug!(volume = %target, "threshold not reached");
                status.set_condition(
                    CONDITION_HEALTHY,
                    ConditionStatus::True,
                    THRESHOLD_NOT_REACHED,
                    "free space and inodes are above the configured threshold",
                    generation,
                    now,
                );
                None
            }
            Ok((target, Decision::NotBound)) => {
                debug!(volume = %target, "volume is not bound yet");
                self.ctx.metrics.skipped(target, NOT_BOUND);
                None
            }
            Err(Outcome::Ineligible(target, ineligible)) => {
                warn!(volume = %target, reason = ineligible.reason(), "volume is not eligible: {}", ineligible);
                self.ctx.metrics.skipped(target, ineligible.reason());
                status.set_condition(
                    CONDITION_HEALTHY,
                    ConditionStatus::False,
                    ineligible.reason(),
                    ineligible.to_string(),
                    generation,
                    now,
                );
                None
            }
            Err(Outcome::Failed(_)) => None,
        };

        // sizes are written by the reconciler only
        status.prev_size = None;
        status.new_size = None;
        self.ctx.update_status(managed, &status).await?;

        match outcome {
            Err(Outcome::Failed(e)) => Err(e),
            _ => Ok(queue),
        }
    }

    async fn decide(
        &self,
        managed: &Managed,
        volumes: &VolumeInfoMap,
        status: &mut Status,
    ) -> Result<(ObjectKey, Decision), Outcome> {
        let policy = managed.policy().map_err(|e| Outcome::Failed(e.into()))?;
        let target = policy.target.clone();

        let volume = self
            .ctx
            .target_volume(managed, &target)
            .await
            .map_err(|e| Outcome::Failed(e.into()))?
            .ok_or_else(|| Outcome::Failed(Error::TargetNotFound { key: target.clone() }))?;

        let class = self
            .ctx
            .storage_class(&volume)
            .await
            .map_err(|e| Outcome::Failed(e.into()))?;

        match decision::should_reconcile(
            &volume,
            &policy,
            volumes.get(&target),
            class.as_ref(),
            status,
            self.ctx.stale_tolerance,
        ) {
            Ok(decision) => Ok((target, decision)),
            Err(ineligible) => Err(Outcome::Ineligible(target, ineligible)),
        }
    }
}

enum Outcome {
    Ineligible(ObjectKey, Ineligible),
    Failed(Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::metrics_source::VolumeInfo;
    use crate::metrics_source::fake::FakeSource;
    use crate::tests::{MemoryStore, new_annotated_pvc, new_autoscaler, new_pvc};
    use crate::types::annotations;
    use crate::utils::quantity::GI;
    use kube::ResourceExt;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("default", name)
    }

    fn info(capacity: u64, available: u64) -> VolumeInfo {
        VolumeInfo {
            capacity_bytes: capacity,
            available_bytes: available,
            capacity_inodes: 1000,
            available_inodes: 1000,
        }
    }

    fn scanner(
        store: &Arc<MemoryStore>,
        source: &FakeSource,
        capacity: usize,
    ) -> (Scanner, mpsc::Receiver<ManagedRef>, Arc<Metrics>) {
        let (tx, rx) = mpsc::channel(capacity);
        let metrics = Arc::new(Metrics::new().unwrap());
        let scanner = Scanner::builder()
            .interval(Duration::from_secs(30))
            .source(Arc::new(source.clone()))
            .store(store.clone())
            .metrics(metrics.clone())
            .queue(tx)
            .build()
            .unwrap();
        (scanner, rx, metrics)
    }

    #[test]
    fn test_builder_fails_fast_without_collaborators() {
        let (tx, _rx) = mpsc::channel(1);
        let source = Arc::new(FakeSource::new(Duration::from_secs(1), 0, 0));

        let err = Scanner::builder().build().err().unwrap();
        assert!(matches!(
            err,
            Error::MissingCollaborator {
                collaborator: "event queue"
            }
        ));

        let err = Scanner::builder().queue(tx.clone()).build().err().unwrap();
        assert!(matches!(
            err,
            Error::MissingCollaborator {
                collaborator: "metrics source"
            }
        ));

        let err = Scanner::builder()
            .queue(tx)
            .source(source)
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::MissingCollaborator { collaborator: "store" }
        ));
    }

    #[tokio::test]
    async fn test_scan_queues_volumes_below_threshold() {
        let store = Arc::new(MemoryStore::default());
        store.insert_volume(new_annotated_pvc("low", "1Gi", "100Gi"));
        store.insert_volume(new_annotated_pvc("high", "1Gi", "100Gi"));

        let source = FakeSource::new(Duration::from_secs(1), 0, 0);
        source.set(key("low"), info(GI, GI / 20));
        source.set(key("high"), info(GI, GI / 2));

        let (scanner, mut rx, metrics) = scanner(&store, &source, 8);
        assert_eq!(scanner.scan().await.unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), ManagedRef::Volume(key("low")));
        assert!(rx.try_recv().is_err());

        assert_eq!(
            metrics.threshold_reached_count(&key("low"), "FreeSpaceThresholdReached"),
            1
        );
        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1.reason, "FreeSpaceThresholdReached");
    }

    #[tokio::test]
    async fn test_scan_stamps_status_regardless_of_outcome() {
        let store = Arc::new(MemoryStore::default());
        store.insert_volume(new_annotated_pvc("data-0", "1Gi", "100Gi"));
        let source = FakeSource::new(Duration::from_secs(1), 0, 0);

        let (scanner, _rx, metrics) = scanner(&store, &source, 8);
        assert_eq!(scanner.scan().await.unwrap(), 0);

        let pvc = store.volume(&key("data-0")).unwrap();
        let annotations = pvc.annotations();
        assert!(annotations.contains_key(annotations::LAST_CHECK));
        assert!(annotations.contains_key(annotations::NEXT_CHECK));
        assert_eq!(metrics.skipped_count(&key("data-0"), "NoMetrics"), 1);

        source.set(key("data-0"), info(GI, GI / 2));
        scanner.scan().await.unwrap();
        let pvc = store.volume(&key("data-0")).unwrap();
        assert_eq!(
            pvc.annotations()
                .get(annotations::FREE_SPACE_PERCENTAGE)
                .map(String::as_str),
            Some("50.00%")
        );
    }

    #[tokio::test]
    async fn test_scan_maintains_healthy_condition() {
        let store = Arc::new(MemoryStore::default());
        store.insert_volume(new_pvc("data-0", "1Gi"));
        store.insert_autoscaler(new_autoscaler("data-0", "100Gi"));
        let source = FakeSource::new(Duration::from_secs(1), 0, 0);
        source.set(key("data-0"), info(GI, GI / 2));

        let (scanner, _rx, _) = scanner(&store, &source, 8);
        scanner.scan().await.unwrap();

        let status = store.autoscaler(&key("data-0-autoscaler")).unwrap().status.unwrap();
        let healthy = status.condition(CONDITION_HEALTHY).unwrap();
        assert_eq!(healthy.status, "True");
        assert_eq!(healthy.reason, THRESHOLD_NOT_REACHED);

        store.set_expansion(false);
        scanner.scan().await.unwrap();

        let status = store.autoscaler(&key("data-0-autoscaler")).unwrap().status.unwrap();
        let healthy = status.condition(CONDITION_HEALTHY).unwrap();
        assert_eq!(healthy.status, "False");
        assert_eq!(healthy.reason, "StorageClassDoesNotSupportExpansion");
    }

    #[tokio::test]
    async fn test_lagging_cache_keeps_recorded_sizes() {
        let store = Arc::new(MemoryStore::default());
        let cached = new_annotated_pvc("data-0", "1Gi", "100Gi");

        // the reconciler recorded a resize after the cached copy was taken
        let mut resized = cached.clone();
        resized
            .annotations_mut()
            .insert(annotations::PREV_SIZE.to_owned(), "1Gi".to_owned());
        resized
            .annotations_mut()
            .insert(annotations::NEW_SIZE.to_owned(), "2Gi".to_owned());
        store.insert_volume(resized);

        let source = FakeSource::new(Duration::from_secs(1), 0, 0);
        let (scanner, _rx, _) = scanner(&store, &source, 8);
        scanner
            .evaluate(&Managed::Volume(cached), &VolumeInfoMap::new(), Utc::now())
            .await
            .unwrap();

        let pvc = store.volume(&key("data-0")).unwrap();
        let annotations = pvc.annotations();
        assert!(annotations.contains_key(annotations::LAST_CHECK));
        assert_eq!(annotations.get(annotations::PREV_SIZE).map(String::as_str), Some("1Gi"));
        assert_eq!(annotations.get(annotations::NEW_SIZE).map(String::as_str), Some("2Gi"));
    }

    #[tokio::test]
    async fn test_invalid_policy_does_not_abort_tick() {
        let store = Arc::new(MemoryStore::default());
        let mut broken = new_annotated_pvc("broken", "1Gi", "100Gi");
        broken
            .annotations_mut()
            .insert(annotations::THRESHOLD.to_owned(), "lots".to_owned());
        store.insert_volume(broken);
        store.insert_volume(new_annotated_pvc("low", "1Gi", "100Gi"));

        let source = FakeSource::new(Duration::from_secs(1), 0, 0);
        source.set(key("broken"), info(GI, 0));
        source.set(key("low"), info(GI, 0));

        let (scanner, mut rx, _) = scanner(&store, &source, 8);
        assert_eq!(scanner.scan().await.unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), ManagedRef::Volume(key("low")));

        // the broken owner was still stamped
        let pvc = store.volume(&key("broken")).unwrap();
        assert!(pvc.annotations().contains_key(annotations::LAST_CHECK));
    }

    #[tokio::test]
    async fn test_cancel_closes_queue() {
        let store = Arc::new(MemoryStore::default());
        store.insert_volume(new_annotated_pvc("data-0", "1Gi", "100Gi"));
        let source = FakeSource::new(Duration::from_secs(1), 0, 0);
        source.set(key("data-0"), info(GI, 0));

        let (scanner, mut rx, _) = scanner(&store, &source, 1);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scanner.run(cancel.clone()));

        assert_eq!(rx.recv().await, Some(ManagedRef::Volume(key("data-0"))));
        cancel.cancel();
        handle.await.unwrap();

        // drain what was queued before cancellation, then observe the end
        while rx.recv().await.is_some() {}
        assert!(rx.recv().await.is_none());
    }
}
