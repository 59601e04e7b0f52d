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

use crate::context::Context;
use crate::decision::{self, Ineligible, Preflight};
use crate::store::{self, Signal};
use crate::types;
use crate::types::key::ObjectKey;
use crate::types::managed::ManagedRef;
use crate::types::v1alpha1::status::{CONDITION_HEALTHY, ConditionStatus, rfc3339};
use crate::types::volume::{
    CONDITION_FILE_SYSTEM_RESIZE_PENDING, CONDITION_MODIFYING_VOLUME, CONDITION_RESIZING,
    VolumeExt,
};
use crate::utils::quantity::{format_bytes, quantity_bytes, to_quantity};
use chrono::Utc;
use futures::StreamExt;
use snafu::{OptionExt, Snafu};
use std::sync::Arc;
use strum::IntoStaticStr;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

pub const RECONCILING: &str = "Reconciling";
pub const RESIZING: &str = "Resizing";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(transparent)]
    Store { source: store::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(display("{} is bound but reports no capacity", key))]
    NoCapacity { key: ObjectKey },
}

/// Why a queued volume was left alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoStaticStr)]
pub enum Skip {
    /// The owner or its claim no longer exists.
    Gone,
    NotBound,
    Resizing,
    FileSystemResizePending,
    ModifyingVolume,
    /// The last requested size has not been reflected in the capacity yet.
    StillResizing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Resized { from: u64, to: u64 },
    MaxCapacityReached,
    Skipped(Skip),
    Ineligible(Ineligible),
}

/// Re-reads the owner and its claim, re-checks every guard and requests
/// the next capacity when they all pass.
///
/// The queued reference is the only input trusted from the scanner.
pub async fn reconcile(ctx: &Context, reference: &ManagedRef) -> Result<Outcome, Error> {
    let Some(managed) = ctx.store.get_managed(reference).await? else {
        debug!(owner = %reference, "owner is gone");
        return Ok(Outcome::Skipped(Skip::Gone));
    };

    let policy = managed.policy()?;
    let target = policy.target.clone();
    let Some(volume) = ctx.target_volume(&managed, &target).await? else {
        debug!(volume = %target, "volume is gone");
        return Ok(Outcome::Skipped(Skip::Gone));
    };
    let class = ctx.storage_class(&volume).await?;

    let max_capacity = match decision::preflight(&volume, &policy, class.as_ref()) {
        Ok(Preflight::Ready { max_capacity }) => max_capacity,
        Ok(Preflight::NotBound) => return Ok(observe(ctx, &target, Outcome::Skipped(Skip::NotBound))),
        Err(ineligible) => return Ok(observe(ctx, &target, Outcome::Ineligible(ineligible))),
    };

    let guards = [
        (CONDITION_RESIZING, Skip::Resizing),
        (CONDITION_FILE_SYSTEM_RESIZE_PENDING, Skip::FileSystemResizePending),
        (CONDITION_MODIFYING_VOLUME, Skip::ModifyingVolume),
    ];
    if let Some((_, skip)) = guards.iter().find(|(type_, _)| volume.has_condition(type_)) {
        return Ok(observe(ctx, &target, Outcome::Skipped(*skip)));
    }

    let current = volume
        .capacity()?
        .context(NoCapacitySnafu { key: target.clone() })?;

    let mut status = managed.status()?;
    let previous = status.prev_size.as_ref().map(quantity_bytes).transpose()?;
    // a request ahead of the reported capacity is a resize still in flight,
    // even when its status write never landed
    let requested = volume.requested()?;
    if previous == Some(current) || requested.is_some_and(|requested| requested > current) {
        return Ok(observe(ctx, &target, Outcome::Skipped(Skip::StillResizing)));
    }

    if current >= max_capacity {
        return Ok(observe(ctx, &target, Outcome::MaxCapacityReached));
    }

    let next = decision::new_capacity(current, &policy, max_capacity, ctx.resolution);
    ctx.store
        .patch_volume_request(&volume, &to_quantity(next))
        .await?;

    let message = format!("Resizing from {} to {}", format_bytes(current), format_bytes(next));
    let now = Utc::now();
    status.prev_size = Some(to_quantity(current));
    status.new_size = Some(to_quantity(next));
    status.last_check = Some(rfc3339(now));
    status.set_condition(
        CONDITION_HEALTHY,
        ConditionStatus::False,
        RECONCILING,
        message.clone(),
        managed.generation(),
        now,
    );

    ctx.update_status(&managed, &status).await?;
    ctx.record(&managed, &Signal::normal(RESIZING, message)).await;

    Ok(observe(
        ctx,
        &target,
        Outcome::Resized {
            from: current,
            to: next,
        },
    ))
}

/// Logs and counts a terminal outcome.
fn observe(ctx: &Context, volume: &ObjectKey, outcome: Outcome) -> Outcome {
    match outcome {
        Outcome::Resized { from, to } => {
            info!(
                volume = %volume,
                from = %format_bytes(from),
                to = %format_bytes(to),
                "volume resized"
            );
            ctx.metrics.resized(volume);
        }
        Outcome::MaxCapacityReached => {
            info!(volume = %volume, "volume reached its maximum capacity");
            ctx.metrics.max_capacity_reached(volume);
        }
        Outcome::Skipped(skip) => {
            let reason: &'static str = skip.into();
            info!(volume = %volume, reason, "resize skipped");
            ctx.metrics.skipped(volume, reason);
        }
        Outcome::Ineligible(ineligible) => {
            info!(volume = %volume, reason = ineligible.reason(), "resize skipped: {}", ineligible);
            ctx.metrics.skipped(volume, ineligible.reason());
        }
    }
    outcome
}

/// Drains the event queue with up to `workers` concurrent reconciles.
///
/// Returns once the queue is closed and every accepted reference has been
/// handled.
pub async fn run(ctx: Arc<Context>, queue: mpsc::Receiver<ManagedRef>, workers: usize) {
    ReceiverStream::new(queue)
        .for_each_concurrent(workers, |reference| {
            let ctx = ctx.clone();
            async move {
                if let Err(e) = reconcile(&ctx, &reference).await {
                    warn!(owner = %reference, "reconcile failed: {}", e);
                }
            }
        })
        .await;
    info!("reconciler stopped");
}
