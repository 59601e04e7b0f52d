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

pub mod validation;

use crate::types;
use crate::types::error::NoNamespaceSnafu;
use crate::types::key::ObjectKey;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{CustomResource, KubeSchema, ResourceExt};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;

pub const TARGET_API_VERSION: &str = "v1";
pub const TARGET_KIND: &str = "PersistentVolumeClaim";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "autoscaling.pvc.dev",
    version = "v1alpha1",
    kind = "PersistentVolumeClaimAutoscaler",
    namespaced,
    status = "crate::types::v1alpha1::status::Status",
    shortname = "pvca",
    plural = "persistentvolumeclaimautoscalers",
    singular = "persistentvolumeclaimautoscaler",
    printcolumn = r#"{"name":"Target", "type":"string", "jsonPath":".spec.targetRef.name"}"#,
    printcolumn = r#"{"name":"Max", "type":"string", "jsonPath":".spec.maxCapacity"}"#,
    printcolumn = r#"{"name":"Last Check", "type":"date", "jsonPath":".status.lastCheck"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimAutoscalerSpec {
    /// The PersistentVolumeClaim in the same namespace to grow.
    pub target_ref: TargetRef,

    /// Upper bound for the claim's storage request.
    pub max_capacity: Quantity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_capacity: Option<Quantity>,

    /// Free space (or inodes) percentage at or below which the claim is grown,
    /// e.g. `"10%"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<String>,

    /// Percentage of the current capacity added on each resize, e.g. `"10%"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increase_by: Option<String>,

    /// Smallest capacity delta of a single resize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_step_absolute: Option<Quantity>,

    /// Reserved. Accepted and validated but not acted upon yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_duration: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    #[x_kube(validation = Rule::new("self == 'v1'").message("apiVersion must be v1"))]
    pub api_version: String,

    #[x_kube(validation = Rule::new("self == 'PersistentVolumeClaim'").message("kind must be PersistentVolumeClaim"))]
    pub kind: String,

    #[x_kube(validation = Rule::new("self != ''").message("name must not be empty"))]
    pub name: String,
}

impl TargetRef {
    pub fn persistent_volume_claim(name: impl Into<String>) -> Self {
        Self {
            api_version: TARGET_API_VERSION.to_owned(),
            kind: TARGET_KIND.to_owned(),
            name: name.into(),
        }
    }
}

impl PersistentVolumeClaimAutoscaler {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    /// Key of the PersistentVolumeClaim this autoscaler manages.
    pub fn target_key(&self) -> Result<ObjectKey, types::error::Error> {
        Ok(ObjectKey::new(self.namespace()?, &self.spec.target_ref.name))
    }
}
