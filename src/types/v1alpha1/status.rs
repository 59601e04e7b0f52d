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

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// Condition type reporting whether the target volume is in its desired state.
pub const CONDITION_HEALTHY: &str = "Healthy";

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display, IntoStaticStr)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_check: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_space_percentage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_space_percentage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_inodes_percentage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_inodes_percentage: Option<String>,

    /// Capacity observed right before the last requested resize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_size: Option<Quantity>,

    /// Capacity requested by the last resize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_size: Option<Quantity>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Kubernetes-style condition
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,

    /// True, False or Unknown
    pub status: String,

    pub reason: String,

    pub message: String,

    /// RFC 3339 time of the last status change
    pub last_transition_time: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

pub fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Status {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Inserts or updates the condition of the given type.
    ///
    /// There is at most one entry per type. `reason`, `message` and
    /// `observedGeneration` always take the new values, while
    /// `lastTransitionTime` only moves when the status flips.
    pub fn set_condition(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
        observed_generation: Option<i64>,
        now: DateTime<Utc>,
    ) {
        let status = status.to_string();
        let message = message.into();

        match self.conditions.iter_mut().find(|c| c.type_ == type_) {
            Some(existing) => {
                if existing.status != status {
                    existing.last_transition_time = rfc3339(now);
                }
                existing.status = status;
                existing.reason = reason.to_owned();
                existing.message = message;
                existing.observed_generation = observed_generation;
            }
            None => self.conditions.push(Condition {
                type_: type_.to_owned(),
                status,
                reason: reason.to_owned(),
                message,
                last_transition_time: rfc3339(now),
                observed_generation,
            }),
        }
    }
}
