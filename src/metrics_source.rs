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

//! Per-volume utilization snapshots and the sources that produce them.

pub mod fake;
pub mod promql;

use crate::types::key::ObjectKey;
use futures::future::BoxFuture;
use snafu::{Snafu, ensure};
use std::collections::HashMap;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("capacity is zero"))]
    CapacityIsZero,

    #[snafu(display("query '{}' failed: {}", query, source))]
    Request {
        query: String,
        source: reqwest::Error,
    },

    #[snafu(display("query '{}' failed with {}: {}", query, error_type, message))]
    QueryFailed {
        query: String,
        error_type: String,
        message: String,
    },

    #[snafu(display("query '{}' returned unsupported result type '{}'", query, result_type))]
    UnsupportedResultType { query: String, result_type: String },

    #[snafu(display("query '{}' returned a bad sample value '{}'", query, value))]
    BadSampleValue { query: String, value: String },
}

/// Utilization of one volume as seen by the kubelet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    pub capacity_bytes: u64,
    pub available_bytes: u64,
    pub capacity_inodes: u64,
    pub available_inodes: u64,
}

fn percentage(part: u64, whole: u64) -> Result<f64, Error> {
    ensure!(whole != 0, CapacityIsZeroSnafu);
    Ok(part as f64 * 100.0 / whole as f64)
}

impl VolumeInfo {
    pub fn free_space_percentage(&self) -> Result<f64, Error> {
        percentage(self.available_bytes, self.capacity_bytes)
    }

    pub fn used_space_percentage(&self) -> Result<f64, Error> {
        Ok(100.0 - self.free_space_percentage()?)
    }

    pub fn free_inodes_percentage(&self) -> Result<f64, Error> {
        percentage(self.available_inodes, self.capacity_inodes)
    }

    pub fn used_inodes_percentage(&self) -> Result<f64, Error> {
        Ok(100.0 - self.free_inodes_percentage()?)
    }
}

/// Snapshots keyed by PersistentVolumeClaim.
pub type VolumeInfoMap = HashMap<ObjectKey, VolumeInfo>;

/// Provider of utilization snapshots.
///
/// A call returns one consistent batch for the whole scan; when any part of
/// the underlying lookup fails the whole call fails.
pub trait MetricsSource: Send + Sync {
    fn get(&self) -> BoxFuture<'_, Result<VolumeInfoMap, Error>>;
}
