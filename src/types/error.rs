// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::types::v1alpha1::autoscaler::validation::Violation;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("object has no namespace associated"))]
    NoNamespace,

    #[snafu(display("bad percentage value '{}'", value))]
    BadPercentageValue { value: String },

    #[snafu(display("bad quantity value '{}'", value))]
    BadQuantity { value: String },

    #[snafu(display("invalid timestamp '{}': {}", value, source))]
    BadTimestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[snafu(display(
        "invalid autoscaling policy for {}: {}",
        name,
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    ))]
    InvalidPolicy {
        name: String,
        violations: Vec<Violation>,
    },
}
