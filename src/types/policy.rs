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

use crate::types::error::{Error, InvalidPolicySnafu};
use crate::types::key::ObjectKey;
use crate::types::v1alpha1::autoscaler::validation::{PolicyFields, check_fields};
use snafu::ensure;

pub const DEFAULT_THRESHOLD: &str = "10%";
pub const DEFAULT_INCREASE_BY: &str = "10%";
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 10.0;
pub const DEFAULT_INCREASE_BY_PERCENT: f64 = 10.0;

/// Effective autoscaling policy of one volume, with defaults applied.
#[derive(Clone, Debug, PartialEq)]
pub struct AutoscalingPolicy {
    /// The PersistentVolumeClaim being grown.
    pub target: ObjectKey,
    pub threshold_percent: f64,
    pub increase_by_percent: f64,
    /// `None` when missing or zero; the decision engine refuses to act then.
    pub max_capacity: Option<u64>,
    pub min_capacity: Option<u64>,
    pub min_step_absolute: Option<u64>,
    pub cooldown_duration: Option<String>,
}

impl AutoscalingPolicy {
    /// Resolves raw policy fields into an effective policy.
    ///
    /// Every field is validated; any violation other than a missing maximum
    /// capacity fails resolution with all violations listed.
    pub fn resolve(
        name: &str,
        target: ObjectKey,
        fields: &PolicyFields<'_>,
    ) -> Result<Self, Error> {
        let (violations, parsed) = check_fields(fields);
        let violations: Vec<_> = violations
            .into_iter()
            .filter(|v| !v.is_missing_max_capacity(fields))
            .collect();

        ensure!(
            violations.is_empty(),
            InvalidPolicySnafu {
                name,
                violations
            }
        );

        Ok(Self {
            target,
            threshold_percent: parsed.threshold.unwrap_or(DEFAULT_THRESHOLD_PERCENT),
            increase_by_percent: parsed.increase_by.unwrap_or(DEFAULT_INCREASE_BY_PERCENT),
            max_capacity: parsed.max_capacity,
            min_capacity: parsed.min_capacity,
            min_step_absolute: parsed.min_step_absolute,
            cooldown_duration: fields.cooldown_duration.value.map(str::to_owned),
        })
    }
}
