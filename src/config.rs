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

use crate::types;
use crate::utils::quantity::parse_bytes;
use clap::Args;
use snafu::{ResultExt, Snafu, ensure};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{} must be greater than zero", flag))]
    Zero { flag: &'static str },

    #[snafu(display("invalid scaling resolution '{}': {}", value, source))]
    Resolution {
        value: String,
        source: types::error::Error,
    },

    #[snafu(display("stale tolerance {} is outside (0, 100]", value))]
    StaleTolerance { value: f64 },
}

/// Settings of the `server` subcommand.
#[derive(Args, Clone, Debug)]
pub struct Config {
    /// Seconds between two scans
    #[arg(long, default_value_t = 60)]
    pub interval: u64,

    /// Base URL of the Prometheus HTTP API
    #[arg(long, default_value = "http://localhost:9090")]
    pub prometheus_address: String,

    /// New capacities are rounded up to a multiple of this quantity
    #[arg(long, default_value = "1Gi")]
    pub scaling_resolution: String,

    /// Percent the reported capacity may deviate from the declared one
    /// before metrics are considered stale
    #[arg(long, default_value_t = 20.0)]
    pub stale_tolerance: f64,

    /// Capacity of the queue between scanner and reconciler
    #[arg(long, default_value_t = 128)]
    pub queue_capacity: usize,

    /// Concurrent reconciles
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Address serving /metrics, /healthz and /readyz
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub metrics_bind_address: SocketAddr,
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        ensure!(self.interval > 0, ZeroSnafu { flag: "--interval" });
        ensure!(self.queue_capacity > 0, ZeroSnafu { flag: "--queue-capacity" });
        ensure!(self.workers > 0, ZeroSnafu { flag: "--workers" });
        ensure!(
            self.stale_tolerance > 0.0 && self.stale_tolerance <= 100.0,
            StaleToleranceSnafu {
                value: self.stale_tolerance
            }
        );
        ensure!(
            self.resolution()? > 0,
            ZeroSnafu {
                flag: "--scaling-resolution"
            }
        );
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Scaling resolution in bytes.
    pub fn resolution(&self) -> Result<u64, Error> {
        parse_bytes(&self.scaling_resolution).context(ResolutionSnafu {
            value: self.scaling_resolution.as_str(),
        })
    }
}
