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

//! Whether a volume needs to grow, and by how much.
//!
//! Everything here is pure: callers fetch the volume, its storage class and
//! its utilization snapshot, and act on the result.

use crate::metrics_source::VolumeInfo;
use crate::types::policy::AutoscalingPolicy;
use crate::types::v1alpha1::status::Status;
use crate::types::volume::{VolumeExt, allows_expansion};
use crate::utils::percentage::format_percentage;
use crate::utils::quantity::round_up;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::storage::v1 as storagev1;
use snafu::{OptionExt, Snafu, ensure};
use strum::{Display, IntoStaticStr};

/// Upper bound for `increaseBy / threshold` when scaling the absolute step.
pub const MAX_STEP_RATIO: f64 = 20.0;

/// A named reason a volume cannot be evaluated or acted on.
#[derive(Debug, Snafu, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[snafu(visibility(pub(crate)))]
pub enum Ineligible {
    #[snafu(display("no metrics reported for the volume"))]
    NoMetrics,

    #[snafu(display("storage class of the volume was not found"))]
    StorageClassNotFound,

    #[snafu(display("storage class does not allow volume expansion"))]
    StorageClassDoesNotSupportExpansion,

    #[snafu(display("reported metrics do not match the declared capacity"))]
    StaleMetrics,

    #[snafu(display("no maximum capacity configured"))]
    NoMaxCapacity,

    #[snafu(display("volume mode is not Filesystem"))]
    VolumeModeIsNotFilesystem,
}

impl Ineligible {
    /// Stable reason label used for conditions, events and counters.
    pub fn reason(&self) -> &'static str {
        self.into()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, IntoStaticStr)]
pub enum TriggerReason {
    FreeSpaceThresholdReached,
    FreeInodesThresholdReached,
}

/// The threshold that was crossed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trigger {
    pub reason: TriggerReason,
    pub observed: f64,
    pub threshold: f64,
}

impl Trigger {
    pub fn message(&self) -> String {
        let resource = match self.reason {
            TriggerReason::FreeSpaceThresholdReached => "space",
            TriggerReason::FreeInodesThresholdReached => "inodes",
        };
        format!(
            "free {} ({}) is less than the configured threshold ({})",
            resource,
            format_percentage(self.observed),
            format_percentage(self.threshold)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Decision {
    Resize(Trigger),
    ThresholdNotReached,
    /// The claim is not bound yet; nothing to do.
    NotBound,
}

/// Outcome of the metric-independent checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preflight {
    Ready { max_capacity: u64 },
    NotBound,
}

fn stamp(status: &mut Status, info: &VolumeInfo) {
    status.free_space_percentage = info.free_space_percentage().ok().map(format_percentage);
    status.used_space_percentage = info.used_space_percentage().ok().map(format_percentage);
    status.free_inodes_percentage = info.free_inodes_percentage().ok().map(format_percentage);
    status.used_inodes_percentage = info.used_inodes_percentage().ok().map(format_percentage);
}

fn storage_class_allows_expansion(
    storage_class: Option<&storagev1::StorageClass>,
) -> Result<(), Ineligible> {
    let class = storage_class.context(StorageClassNotFoundSnafu)?;
    ensure!(allows_expansion(class), StorageClassDoesNotSupportExpansionSnafu);
    Ok(())
}

/// Whether the snapshot cannot describe the volume as it is declared now.
///
/// `tolerance` is a percentage of the declared capacity.
pub fn is_stale(volume: &corev1::PersistentVolumeClaim, info: &VolumeInfo, tolerance: f64) -> bool {
    if info.available_bytes > info.capacity_bytes {
        return true;
    }

    // an unparsable declared capacity leaves nothing to compare against
    let Some(declared) = volume.capacity().ok().flatten().filter(|c| *c > 0) else {
        return false;
    };

    let deviation = info.capacity_bytes.abs_diff(declared) as f64;
    deviation * 100.0 > tolerance * declared as f64
}

/// Eligibility predicate.
///
/// The checks run in a fixed order and the first failing one names the
/// outcome. Observed percentages are stamped into `status` before any check
/// can fail.
pub fn should_reconcile(
    volume: &corev1::PersistentVolumeClaim,
    policy: &AutoscalingPolicy,
    snapshot: Option<&VolumeInfo>,
    storage_class: Option<&storagev1::StorageClass>,
    status: &mut Status,
    stale_tolerance: f64,
) -> Result<Decision, Ineligible> {
    if let Some(info) = snapshot {
        stamp(status, info);
    }

    let info = snapshot.context(NoMetricsSnafu)?;
    storage_class_allows_expansion(storage_class)?;

    let free_space = info
        .free_space_percentage()
        .ok()
        .context(NoMetricsSnafu)?;

    ensure!(!is_stale(volume, info, stale_tolerance), StaleMetricsSnafu);

    let threshold = policy.threshold_percent;
    policy.max_capacity.context(NoMaxCapacitySnafu)?;
    ensure!(volume.is_filesystem(), VolumeModeIsNotFilesystemSnafu);

    if !volume.is_bound() {
        return Ok(Decision::NotBound);
    }

    if free_space <= threshold {
        return Ok(Decision::Resize(Trigger {
            reason: TriggerReason::FreeSpaceThresholdReached,
            observed: free_space,
            threshold,
        }));
    }

    if info.capacity_inodes > 0
        && let Ok(free_inodes) = info.free_inodes_percentage()
        && free_inodes <= threshold
    {
        return Ok(Decision::Resize(Trigger {
            reason: TriggerReason::FreeInodesThresholdReached,
            observed: free_inodes,
            threshold,
        }));
    }

    Ok(Decision::ThresholdNotReached)
}

/// The checks of [`should_reconcile`] that do not depend on metrics, in the
/// same order.
pub fn preflight(
    volume: &corev1::PersistentVolumeClaim,
    policy: &AutoscalingPolicy,
    storage_class: Option<&storagev1::StorageClass>,
) -> Result<Preflight, Ineligible> {
    storage_class_allows_expansion(storage_class)?;
    let max_capacity = policy.max_capacity.context(NoMaxCapacitySnafu)?;
    ensure!(volume.is_filesystem(), VolumeModeIsNotFilesystemSnafu);

    if !volume.is_bound() {
        return Ok(Preflight::NotBound);
    }
    Ok(Preflight::Ready { max_capacity })
}

/// Absolute lower bound of one step: `min_step` scaled by
/// `increase_by / threshold`, the ratio capped at [`MAX_STEP_RATIO`].
pub fn min_increment(increase_by_percent: f64, threshold_percent: f64, min_step: u64) -> u64 {
    let ratio = if threshold_percent > 0.0 {
        (increase_by_percent / threshold_percent).min(MAX_STEP_RATIO)
    } else {
        MAX_STEP_RATIO
    };
    (min_step as f64 * ratio).ceil() as u64
}

/// Capacity to request next, in bytes.
///
/// Never exceeds `max_capacity`, is aligned to `resolution` whenever that
/// does not cross the maximum, and never falls below the policy minimum.
pub fn new_capacity(
    current: u64,
    policy: &AutoscalingPolicy,
    max_capacity: u64,
    resolution: u64,
) -> u64 {
    let floor = policy.min_step_absolute.map_or(0, |step| {
        min_increment(policy.increase_by_percent, policy.threshold_percent, step)
    });
    let percent = (current as f64 * policy.increase_by_percent / 100.0).ceil() as u64;

    let target = current.saturating_add(floor.max(percent)).min(max_capacity);
    let target = round_up(target, resolution).min(max_capacity);

    match policy.min_capacity {
        Some(min) => target.max(min),
        None => target,
    }
}
