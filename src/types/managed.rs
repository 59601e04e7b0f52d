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

//! Objects that carry an autoscaling policy.
//!
//! A policy either lives in the annotations of the claim itself or in a
//! separate `PersistentVolumeClaimAutoscaler` pointing at the claim. The
//! engine only needs a handful of capabilities from either form, which
//! [`Managed`] exposes.

use crate::types;
use crate::types::annotations;
use crate::types::key::ObjectKey;
use crate::types::policy::AutoscalingPolicy;
use crate::types::v1alpha1::autoscaler::PersistentVolumeClaimAutoscaler;
use crate::types::v1alpha1::autoscaler::validation::PolicyFields;
use crate::types::v1alpha1::status::Status;
use k8s_openapi::api::core::v1 as corev1;
use kube::{Resource, ResourceExt};
use std::fmt;

#[derive(Clone, Debug)]
pub enum Managed {
    /// A claim configured through its own annotations.
    Volume(corev1::PersistentVolumeClaim),

    /// A claim configured through a `PersistentVolumeClaimAutoscaler`.
    Autoscaler(PersistentVolumeClaimAutoscaler),
}

/// Identity of a [`Managed`] object; the only payload carried by the event
/// queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ManagedRef {
    Volume(ObjectKey),
    Autoscaler(ObjectKey),
}

impl fmt::Display for ManagedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedRef::Volume(key) => write!(f, "persistentvolumeclaim {key}"),
            ManagedRef::Autoscaler(key) => write!(f, "persistentvolumeclaimautoscaler {key}"),
        }
    }
}

impl Managed {
    pub fn reference(&self) -> Result<ManagedRef, types::error::Error> {
        Ok(match self {
            Managed::Volume(pvc) => ManagedRef::Volume(ObjectKey::of(pvc)?),
            Managed::Autoscaler(pvca) => ManagedRef::Autoscaler(ObjectKey::of(pvca)?),
        })
    }

    /// Key of the PersistentVolumeClaim being grown.
    pub fn target_key(&self) -> Result<ObjectKey, types::error::Error> {
        match self {
            Managed::Volume(pvc) => ObjectKey::of(pvc),
            Managed::Autoscaler(pvca) => pvca.target_key(),
        }
    }

    pub fn policy(&self) -> Result<AutoscalingPolicy, types::error::Error> {
        let target = self.target_key()?;
        match self {
            Managed::Volume(pvc) => AutoscalingPolicy::resolve(
                &pvc.name_any(),
                target,
                &PolicyFields::from_annotations(pvc.annotations()),
            ),
            Managed::Autoscaler(pvca) => AutoscalingPolicy::resolve(
                &pvca.name_any(),
                target,
                &PolicyFields::from_spec(&pvca.spec),
            ),
        }
    }

    pub fn status(&self) -> Result<Status, types::error::Error> {
        match self {
            Managed::Volume(pvc) => annotations::read_status(pvc.annotations()),
            Managed::Autoscaler(pvca) => Ok(pvca.status.clone().unwrap_or_default()),
        }
    }

    pub fn generation(&self) -> Option<i64> {
        match self {
            Managed::Volume(pvc) => pvc.meta().generation,
            Managed::Autoscaler(pvca) => pvca.meta().generation,
        }
    }

    /// Reference used as the involved object of published events.
    pub fn object_ref(&self) -> corev1::ObjectReference {
        match self {
            Managed::Volume(pvc) => pvc.object_ref(&()),
            Managed::Autoscaler(pvca) => pvca.object_ref(&()),
        }
    }
}
