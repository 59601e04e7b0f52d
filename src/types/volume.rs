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

//! The slice of a PersistentVolumeClaim the autoscaler reads.

use crate::types::error::Error;
use crate::utils::quantity::quantity_bytes;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::storage::v1 as storagev1;

pub const STORAGE: &str = "storage";
pub const PHASE_BOUND: &str = "Bound";
pub const VOLUME_MODE_FILESYSTEM: &str = "Filesystem";

/// PVC condition types set by the resizer and kubelet.
pub const CONDITION_RESIZING: &str = "Resizing";
pub const CONDITION_FILE_SYSTEM_RESIZE_PENDING: &str = "FileSystemResizePending";
pub const CONDITION_MODIFYING_VOLUME: &str = "ModifyingVolume";

pub trait VolumeExt {
    /// Capacity reported in `status.capacity.storage`, in bytes.
    fn capacity(&self) -> Result<Option<u64>, Error>;

    /// Capacity requested in `spec.resources.requests.storage`, in bytes.
    fn requested(&self) -> Result<Option<u64>, Error>;

    fn is_bound(&self) -> bool;

    /// Claims without an explicit volume mode default to `Filesystem`.
    fn is_filesystem(&self) -> bool;

    /// Whether the condition of type `type_` has status `True`.
    fn has_condition(&self, type_: &str) -> bool;

    fn storage_class_name(&self) -> Option<&str>;
}

impl VolumeExt for corev1::PersistentVolumeClaim {
    fn capacity(&self) -> Result<Option<u64>, Error> {
        self.status
            .as_ref()
            .and_then(|s| s.capacity.as_ref())
            .and_then(|c| c.get(STORAGE))
            .map(quantity_bytes)
            .transpose()
    }

    fn requested(&self) -> Result<Option<u64>, Error> {
        self.spec
            .as_ref()
            .and_then(|s| s.resources.as_ref())
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get(STORAGE))
            .map(quantity_bytes)
            .transpose()
    }

    fn is_bound(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .is_some_and(|p| p == PHASE_BOUND)
    }

    fn is_filesystem(&self) -> bool {
        self.spec
            .as_ref()
            .and_then(|s| s.volume_mode.as_deref())
            .is_none_or(|m| m == VOLUME_MODE_FILESYSTEM)
    }

    fn has_condition(&self, type_: &str) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == type_ && c.status == "True")
            })
    }

    fn storage_class_name(&self) -> Option<&str> {
        self.spec
            .as_ref()
            .and_then(|s| s.storage_class_name.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// Whether the storage class lets bound volumes grow.
pub fn allows_expansion(class: &storagev1::StorageClass) -> bool {
    class.allow_volume_expansion.unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::utils::quantity::GI;

    #[test]
    fn test_capacity_and_request() {
        let pvc = crate::tests::new_pvc("data-0", "1Gi");
        assert_eq!(pvc.capacity().unwrap(), Some(GI));
        assert_eq!(pvc.requested().unwrap(), Some(GI));
        assert!(pvc.is_bound());
        assert!(pvc.is_filesystem());
        assert_eq!(pvc.storage_class_name(), Some(crate::tests::STORAGE_CLASS));
    }

    #[test]
    fn test_block_mode_and_conditions() {
        let mut pvc = crate::tests::new_pvc("data-0", "1Gi");
        pvc.spec.as_mut().unwrap().volume_mode = Some("Block".to_owned());
        crate::tests::set_pvc_condition(&mut pvc, CONDITION_RESIZING, "True");
        crate::tests::set_pvc_condition(&mut pvc, CONDITION_MODIFYING_VOLUME, "False");

        assert!(!pvc.is_filesystem());
        assert!(pvc.has_condition(CONDITION_RESIZING));
        assert!(!pvc.has_condition(CONDITION_MODIFYING_VOLUME));
        assert!(!pvc.has_condition(CONDITION_FILE_SYSTEM_RESIZE_PENDING));
    }

    #[test]
    fn test_unparsable_capacity_is_an_error() {
        let mut pvc = crate::tests::new_pvc("data-0", "1Gi");
        pvc.status
            .as_mut()
            .unwrap()
            .capacity
            .as_mut()
            .unwrap()
            .insert(STORAGE.to_owned(), k8s_openapi::apimachinery::pkg::api::resource::Quantity("huge".to_owned()));
        assert!(pvc.capacity().is_err());
    }
}
