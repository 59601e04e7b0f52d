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

//! Utilization from the kubelet volume stats scraped by Prometheus.

use super::{
    BadSampleValueSnafu, Error, MetricsSource, QueryFailedSnafu, RequestSnafu,
    UnsupportedResultTypeSnafu, VolumeInfo, VolumeInfoMap,
};
use crate::types::key::ObjectKey;
use futures::future::BoxFuture;
use serde::Deserialize;
use snafu::{ResultExt, ensure};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

pub const CAPACITY_BYTES_QUERY: &str = "kubelet_volume_stats_capacity_bytes";
pub const AVAILABLE_BYTES_QUERY: &str = "kubelet_volume_stats_available_bytes";
pub const CAPACITY_INODES_QUERY: &str = "kubelet_volume_stats_inodes";
pub const AVAILABLE_INODES_QUERY: &str = "kubelet_volume_stats_inodes_free";

const NAMESPACE_LABEL: &str = "namespace";
const CLAIM_LABEL: &str = "persistentvolumeclaim";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    status: String,

    #[serde(default)]
    data: Option<QueryData>,

    #[serde(default)]
    error_type: Option<String>,

    #[serde(default)]
    error: Option<String>,

    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,

    #[serde(default)]
    result: Vec<Sample>,
}

#[derive(Deserialize, Debug)]
struct Sample {
    #[serde(default)]
    metric: BTreeMap<String, String>,

    /// `[<unix time>, "<value>"]`
    value: (f64, String),
}

#[derive(Clone, Copy, Debug)]
enum Field {
    CapacityBytes,
    AvailableBytes,
    CapacityInodes,
    AvailableInodes,
}

impl Field {
    fn set(self, sample: &mut Partial, value: u64) {
        let slot = match self {
            Field::CapacityBytes => &mut sample.capacity_bytes,
            Field::AvailableBytes => &mut sample.available_bytes,
            Field::CapacityInodes => &mut sample.capacity_inodes,
            Field::AvailableInodes => &mut sample.available_inodes,
        };
        *slot = Some(value);
    }
}

/// Values seen so far for one claim across the four queries.
#[derive(Default, Debug)]
struct Partial {
    capacity_bytes: Option<u64>,
    available_bytes: Option<u64>,
    capacity_inodes: Option<u64>,
    available_inodes: Option<u64>,
}

impl Partial {
    /// Both byte series are required. Inodes are kept only as a pair.
    fn complete(self) -> Option<VolumeInfo> {
        let (capacity_bytes, available_bytes) = (self.capacity_bytes?, self.available_bytes?);
        let (capacity_inodes, available_inodes) = match (self.capacity_inodes, self.available_inodes) {
            (Some(capacity), Some(available)) => (capacity, available),
            _ => (0, 0),
        };
        Some(VolumeInfo {
            capacity_bytes,
            available_bytes,
            capacity_inodes,
            available_inodes,
        })
    }
}

/// Turns one instant-query response into per-claim values.
fn parse_response(query: &str, response: QueryResponse) -> Result<Vec<(ObjectKey, u64)>, Error> {
    for warning in &response.warnings {
        warn!(query, warning = warning.as_str(), "prometheus returned a warning");
    }

    ensure!(
        response.status == "success",
        QueryFailedSnafu {
            query,
            error_type: response.error_type.unwrap_or_default(),
            message: response.error.unwrap_or_default(),
        }
    );

    let Some(data) = response.data else {
        return Ok(Vec::new());
    };

    ensure!(
        data.result_type == "vector",
        UnsupportedResultTypeSnafu {
            query,
            result_type: data.result_type,
        }
    );

    let mut values = Vec::with_capacity(data.result.len());
    for sample in data.result {
        let (Some(namespace), Some(name)) = (
            sample.metric.get(NAMESPACE_LABEL),
            sample.metric.get(CLAIM_LABEL),
        ) else {
            debug!(query, metric = ?sample.metric, "sample without claim labels ignored");
            continue;
        };

        let raw = &sample.value.1;
        let parsed: f64 = raw
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| {
                BadSampleValueSnafu {
                    query,
                    value: raw.as_str(),
                }
                .build()
            })?;

        values.push((ObjectKey::new(namespace, name), parsed.round() as u64));
    }

    Ok(values)
}

fn merge(into: &mut HashMap<ObjectKey, Partial>, field: Field, values: Vec<(ObjectKey, u64)>) {
    for (key, value) in values {
        field.set(into.entry(key).or_default(), value);
    }
}

/// Drops claims that lack a byte series instead of reporting zeros for them.
fn finish(partials: HashMap<ObjectKey, Partial>) -> VolumeInfoMap {
    partials
        .into_iter()
        .filter_map(|(key, partial)| match partial.complete() {
            Some(info) => Some((key, info)),
            None => {
                debug!(volume = %key, "incomplete byte series, claim skipped");
                None
            }
        })
        .collect()
}

/// Queries the Prometheus HTTP API once per snapshot field.
pub struct PrometheusSource {
    client: reqwest::Client,
    address: String,
}

impl PrometheusSource {
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), address)
    }

    pub fn with_client(client: reqwest::Client, address: impl Into<String>) -> Self {
        Self {
            client,
            address: address.into().trim_end_matches('/').to_owned(),
        }
    }

    async fn query(&self, query: &str) -> Result<Vec<(ObjectKey, u64)>, Error> {
        let response: QueryResponse = self
            .client
            .get(format!("{}/api/v1/query", self.address))
            .query(&[("query", query)])
            .send()
            .await
            .context(RequestSnafu { query })?
            .json()
            .await
            .context(RequestSnafu { query })?;

        parse_response(query, response)
    }

    async fn fetch(&self) -> Result<VolumeInfoMap, Error> {
        let (capacity_bytes, available_bytes, capacity_inodes, available_inodes) = futures::try_join!(
            self.query(CAPACITY_BYTES_QUERY),
            self.query(AVAILABLE_BYTES_QUERY),
            self.query(CAPACITY_INODES_QUERY),
            self.query(AVAILABLE_INODES_QUERY),
        )?;

        let mut partials = HashMap::new();
        merge(&mut partials, Field::CapacityBytes, capacity_bytes);
        merge(&mut partials, Field::AvailableBytes, available_bytes);
        merge(&mut partials, Field::CapacityInodes, capacity_inodes);
        merge(&mut partials, Field::AvailableInodes, available_inodes);
        let volumes = finish(partials);

        debug!(volumes = volumes.len(), "fetched volume metrics");
        Ok(volumes)
    }
}

impl MetricsSource for PrometheusSource {
    fn get(&self) -> BoxFuture<'_, Result<VolumeInfoMap, Error>> {
        Box::pin(self.fetch())
    }
}
