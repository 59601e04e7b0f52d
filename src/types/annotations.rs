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

//! Annotation keys for tag-based autoscaling of a PersistentVolumeClaim.
//!
//! The policy keys are written by users, the status keys are owned by the
//! operator and rewritten on every scan.

use crate::types::error::{BadTimestampSnafu, Error};
use crate::types::v1alpha1::status::Status;
use chrono::DateTime;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use snafu::ResultExt;
use std::collections::BTreeMap;

pub const PREFIX: &str = "autoscaling.pvc.dev/";

pub const IS_ENABLED: &str = const_str::concat!(PREFIX, "is-enabled");
pub const THRESHOLD: &str = const_str::concat!(PREFIX, "threshold");
pub const INCREASE_BY: &str = const_str::concat!(PREFIX, "increase-by");
pub const MAX_CAPACITY: &str = const_str::concat!(PREFIX, "max-capacity");
pub const MIN_CAPACITY: &str = const_str::concat!(PREFIX, "min-capacity");
pub const MIN_STEP: &str = const_str::concat!(PREFIX, "min-step");

pub const LAST_CHECK: &str = const_str::concat!(PREFIX, "last-check");
pub const NEXT_CHECK: &str = const_str::concat!(PREFIX, "next-check");
pub const USED_SPACE_PERCENTAGE: &str = const_str::concat!(PREFIX, "used-space-percentage");
pub const FREE_SPACE_PERCENTAGE: &str = const_str::concat!(PREFIX, "free-space-percentage");
pub const USED_INODES_PERCENTAGE: &str = const_str::concat!(PREFIX, "used-inodes-percentage");
pub const FREE_INODES_PERCENTAGE: &str = const_str::concat!(PREFIX, "free-inodes-percentage");
pub const PREV_SIZE: &str = const_str::concat!(PREFIX, "prev-size");
pub const NEW_SIZE: &str = const_str::concat!(PREFIX, "new-size");

/// Whether the annotations opt the claim into autoscaling.
pub fn is_enabled(annotations: &BTreeMap<String, String>) -> bool {
    annotations
        .get(IS_ENABLED)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Reads the operator-owned status annotations back into a [`Status`].
///
/// Conditions are not carried by annotations.
pub fn read_status(annotations: &BTreeMap<String, String>) -> Result<Status, Error> {
    let get = |key: &str| annotations.get(key).cloned();

    for key in [LAST_CHECK, NEXT_CHECK] {
        if let Some(value) = annotations.get(key) {
            DateTime::parse_from_rfc3339(value).context(BadTimestampSnafu { value })?;
        }
    }

    Ok(Status {
        last_check: get(LAST_CHECK),
        next_check: get(NEXT_CHECK),
        used_space_percentage: get(USED_SPACE_PERCENTAGE),
        free_space_percentage: get(FREE_SPACE_PERCENTAGE),
        used_inodes_percentage: get(USED_INODES_PERCENTAGE),
        free_inodes_percentage: get(FREE_INODES_PERCENTAGE),
        prev_size: get(PREV_SIZE).map(Quantity),
        new_size: get(NEW_SIZE).map(Quantity),
        conditions: Vec::new(),
    })
}

/// Renders a [`Status`] as a merge-patch annotation map. Unset observation
/// fields map to `None` so the patch removes stale keys. Unset sizes are left
/// out, so only a resize ever rewrites them.
pub fn status_patch(status: &Status) -> BTreeMap<&'static str, Option<String>> {
    let mut patch = BTreeMap::from([
        (LAST_CHECK, status.last_check.clone()),
        (NEXT_CHECK, status.next_check.clone()),
        (USED_SPACE_PERCENTAGE, status.used_space_percentage.clone()),
        (FREE_SPACE_PERCENTAGE, status.free_space_percentage.clone()),
        (USED_INODES_PERCENTAGE, status.used_inodes_percentage.clone()),
        (FREE_INODES_PERCENTAGE, status.free_inodes_percentage.clone()),
    ]);
    for (key, size) in [(PREV_SIZE, &status.prev_size), (NEW_SIZE, &status.new_size)] {
        if let Some(size) = size {
            patch.insert(key, Some(size.0.clone()));
        }
    }
    patch
}

/// Applies a status patch produced by [`status_patch`] to an annotation map.
pub fn apply_status(annotations: &mut BTreeMap<String, String>, status: &Status) {
    for (key, value) in status_patch(status) {
        match value {
            Some(value) => {
                annotations.insert(key.to_owned(), value);
            }
            None => {
                annotations.remove(key);
            }
        }
    }
}
