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

//! The narrow object-store contract the autoscaler consumes.

pub mod cluster;

use crate::types;
use crate::types::key::ObjectKey;
use crate::types::managed::{Managed, ManagedRef};
use crate::types::v1alpha1::status::Status;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::storage::v1 as storagev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("record event error: {}", source))]
    Record { source: kube::Error },

    #[snafu(display("{} was modified concurrently, resource version {} is stale", key, resource_version))]
    Conflict {
        key: ObjectKey,
        resource_version: String,
    },

    #[snafu(display("{} has no resource version to patch against", key))]
    NoResourceVersion { key: ObjectKey },

    #[snafu(display("{} index closed before its initial sync", kind))]
    IndexClosed { kind: &'static str },

    #[snafu(transparent)]
    Types { source: types::error::Error },
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube { source } => matches!(source, kube::Error::Api(status) if status.code == 409),
            _ => false,
        }
    }
}

/// Event severity, mirroring Kubernetes `Normal`/`Warning` events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// A signal published against a [`Managed`] object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signal {
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

impl Signal {
    pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Normal,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Warning,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Object-store client.
///
/// `list_enabled` may serve from a local index; every `get_*` call must read
/// the store itself so callers can re-validate against fresh state.
pub trait Store: Send + Sync {
    /// Every object that currently opts a claim into autoscaling.
    fn list_enabled(&self) -> BoxFuture<'_, Result<Vec<Managed>, Error>>;

    fn get_managed<'a>(
        &'a self,
        reference: &'a ManagedRef,
    ) -> BoxFuture<'a, Result<Option<Managed>, Error>>;

    fn get_volume<'a>(
        &'a self,
        key: &'a ObjectKey,
    ) -> BoxFuture<'a, Result<Option<corev1::PersistentVolumeClaim>, Error>>;

    fn get_storage_class<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<storagev1::StorageClass>, Error>>;

    /// Sets `spec.resources.requests.storage`, conditional on the claim
    /// still carrying the resource version it was read with.
    fn patch_volume_request<'a>(
        &'a self,
        volume: &'a corev1::PersistentVolumeClaim,
        request: &'a Quantity,
    ) -> BoxFuture<'a, Result<corev1::PersistentVolumeClaim, Error>>;

    fn patch_status<'a>(
        &'a self,
        owner: &'a Managed,
        status: &'a Status,
    ) -> BoxFuture<'a, Result<(), Error>>;

    fn publish<'a>(&'a self, owner: &'a Managed, signal: &'a Signal)
    -> BoxFuture<'a, Result<(), Error>>;
}
