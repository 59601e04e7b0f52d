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

//! Byte quantities in Kubernetes suffix notation (`5Gi`, `500M`, `1.5Ti`).

use crate::types::error::{BadQuantitySnafu, Error};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use snafu::{OptionExt, ensure};

pub const KI: u64 = 1 << 10;
pub const MI: u64 = 1 << 20;
pub const GI: u64 = 1 << 30;
pub const TI: u64 = 1 << 40;

const BINARY_SUFFIXES: [(&str, u64); 6] = [
    ("Ei", 1 << 60),
    ("Pi", 1 << 50),
    ("Ti", TI),
    ("Gi", GI),
    ("Mi", MI),
    ("Ki", KI),
];

fn multiplier(suffix: &str) -> Option<u64> {
    let m = match suffix {
        "" => 1,
        "k" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "P" => 1_000_000_000_000_000,
        "E" => 1_000_000_000_000_000_000,
        binary => {
            return BINARY_SUFFIXES
                .iter()
                .find(|(s, _)| *s == binary)
                .map(|(_, m)| *m);
        }
    };
    Some(m)
}

/// Parses a byte quantity. Fractional values are rounded up to the next byte.
pub fn parse_bytes(value: &str) -> Result<u64, Error> {
    let bad = || BadQuantitySnafu { value };
    let trimmed = value.trim();

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    ensure!(!number.is_empty(), bad());
    let multiplier = multiplier(suffix).context(bad())? as u128;

    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (number, ""),
    };
    ensure!(!whole.is_empty() && !fraction.contains('.'), bad());
    ensure!(fraction.len() <= 18, bad());

    let whole: u128 = whole.parse().map_err(|_| bad().build())?;
    let mut bytes = whole.checked_mul(multiplier).context(bad())?;

    if !fraction.is_empty() {
        let digits: u128 = fraction.parse().map_err(|_| bad().build())?;
        let scale = 10u128.pow(fraction.len() as u32);
        let scaled = digits * multiplier;
        bytes += scaled.div_ceil(scale);
    }

    u64::try_from(bytes).ok().context(bad())
}

/// Parses a Kubernetes [`Quantity`] as bytes.
pub fn quantity_bytes(quantity: &Quantity) -> Result<u64, Error> {
    parse_bytes(&quantity.0)
}

/// Renders bytes with the largest binary suffix that divides them exactly.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0".to_owned();
    }

    BINARY_SUFFIXES
        .iter()
        .find(|(_, m)| bytes % m == 0)
        .map(|(suffix, m)| format!("{}{}", bytes / m, suffix))
        .unwrap_or_else(|| bytes.to_string())
}

pub fn to_quantity(bytes: u64) -> Quantity {
    Quantity(format_bytes(bytes))
}

/// Rounds `bytes` up to the next multiple of `resolution`.
pub fn round_up(bytes: u64, resolution: u64) -> u64 {
    if resolution <= 1 {
        return bytes;
    }
    bytes.div_ceil(resolution).saturating_mul(resolution)
}
