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

//! Defaulting and validation of autoscaling policies.
//!
//! Validation never stops at the first problem: every field is checked and
//! all violations are reported together, so a rejected write tells the user
//! everything that needs fixing.

use super::{PersistentVolumeClaimAutoscalerSpec, TARGET_API_VERSION, TARGET_KIND};
use crate::types::annotations;
use crate::types::policy::{DEFAULT_INCREASE_BY, DEFAULT_THRESHOLD};
use crate::utils::percentage::parse_percentage;
use crate::utils::quantity::parse_bytes;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Problem {
    Required,
    BadPercentage { value: String },
    PercentageOutOfRange { value: f64 },
    BadQuantity { value: String },
    Zero,
    MinAboveMax { min: String, max: String },
    Empty,
    UnsupportedTarget { api_version: String, kind: String },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::Required => write!(f, "is required"),
            Problem::BadPercentage { value } => {
                write!(f, "'{value}' is not a percentage of the form NN.NN%")
            }
            Problem::PercentageOutOfRange { value } => {
                write!(f, "{value}% must be greater than 0% and at most 100%")
            }
            Problem::BadQuantity { value } => write!(f, "'{value}' is not a valid quantity"),
            Problem::Zero => write!(f, "must be greater than zero"),
            Problem::MinAboveMax { min, max } => {
                write!(f, "minimum {min} is greater than maximum {max}")
            }
            Problem::Empty => write!(f, "must not be empty when specified"),
            Problem::UnsupportedTarget { api_version, kind } => write!(
                f,
                "{api_version}/{kind} is not supported, expected {TARGET_API_VERSION}/{TARGET_KIND}"
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    pub field: String,
    pub problem: Problem,
}

impl Violation {
    fn new(field: &str, problem: Problem) -> Self {
        Self {
            field: field.to_owned(),
            problem,
        }
    }

    /// Missing or zero maximum capacity. The decision engine reports this
    /// case itself, so policy resolution lets it through.
    pub fn is_missing_max_capacity(&self, fields: &PolicyFields<'_>) -> bool {
        self.field == fields.max_capacity.path
            && matches!(self.problem, Problem::Required | Problem::Zero)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// A raw policy field together with the path used to report it.
#[derive(Clone, Copy, Debug)]
pub struct Field<'a> {
    pub path: &'a str,
    pub value: Option<&'a str>,
}

/// Raw, unparsed policy fields, from either the custom resource or annotations.
#[derive(Clone, Copy, Debug)]
pub struct PolicyFields<'a> {
    pub threshold: Field<'a>,
    pub increase_by: Field<'a>,
    pub max_capacity: Field<'a>,
    pub min_capacity: Field<'a>,
    pub min_step_absolute: Field<'a>,
    pub cooldown_duration: Field<'a>,
}

impl<'a> PolicyFields<'a> {
    pub fn from_spec(spec: &'a PersistentVolumeClaimAutoscalerSpec) -> Self {
        Self {
            threshold: Field {
                path: "spec.threshold",
                value: spec.threshold.as_deref(),
            },
            increase_by: Field {
                path: "spec.increaseBy",
                value: spec.increase_by.as_deref(),
            },
            max_capacity: Field {
                path: "spec.maxCapacity",
                value: Some(spec.max_capacity.0.as_str()).filter(|v| !v.is_empty()),
            },
            min_capacity: Field {
                path: "spec.minCapacity",
                value: spec.min_capacity.as_ref().map(|q| q.0.as_str()),
            },
            min_step_absolute: Field {
                path: "spec.minStepAbsolute",
                value: spec.min_step_absolute.as_ref().map(|q| q.0.as_str()),
            },
            cooldown_duration: Field {
                path: "spec.cooldownDuration",
                value: spec.cooldown_duration.as_deref(),
            },
        }
    }

    pub fn from_annotations(map: &'a BTreeMap<String, String>) -> Self {
        let field = |path: &'a str| Field {
            path,
            value: map.get(path).map(String::as_str),
        };

        Self {
            threshold: field(annotations::THRESHOLD),
            increase_by: field(annotations::INCREASE_BY),
            max_capacity: field(annotations::MAX_CAPACITY),
            min_capacity: field(annotations::MIN_CAPACITY),
            min_step_absolute: field(annotations::MIN_STEP),
            cooldown_duration: Field {
                path: "",
                value: None,
            },
        }
    }
}

/// Parsed values of the fields that passed their own checks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedFields {
    pub threshold: Option<f64>,
    pub increase_by: Option<f64>,
    pub max_capacity: Option<u64>,
    pub min_capacity: Option<u64>,
    pub min_step_absolute: Option<u64>,
}

fn check_percentage(field: Field<'_>, violations: &mut Vec<Violation>) -> Option<f64> {
    let value = field.value?;
    match parse_percentage(value) {
        Ok(parsed) if parsed > 0.0 => Some(parsed),
        Ok(parsed) => {
            violations.push(Violation::new(
                field.path,
                Problem::PercentageOutOfRange { value: parsed },
            ));
            None
        }
        Err(_) => {
            violations.push(Violation::new(
                field.path,
                Problem::BadPercentage {
                    value: value.to_owned(),
                },
            ));
            None
        }
    }
}

fn check_quantity(field: Field<'_>, violations: &mut Vec<Violation>) -> Option<u64> {
    let value = field.value?;
    match parse_bytes(value) {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            violations.push(Violation::new(
                field.path,
                Problem::BadQuantity {
                    value: value.to_owned(),
                },
            ));
            None
        }
    }
}

/// Checks every policy field and returns the violations alongside whatever
/// could be parsed.
pub fn check_fields(fields: &PolicyFields<'_>) -> (Vec<Violation>, ParsedFields) {
    let mut violations = Vec::new();

    let threshold = check_percentage(fields.threshold, &mut violations);
    let increase_by = check_percentage(fields.increase_by, &mut violations);

    let max_capacity = match fields.max_capacity.value {
        None => {
            violations.push(Violation::new(fields.max_capacity.path, Problem::Required));
            None
        }
        Some(_) => check_quantity(fields.max_capacity, &mut violations),
    };
    if max_capacity == Some(0) {
        violations.push(Violation::new(fields.max_capacity.path, Problem::Zero));
    }

    let min_capacity = check_quantity(fields.min_capacity, &mut violations);
    if let (Some(min), Some(max)) = (min_capacity, max_capacity.filter(|m| *m > 0))
        && min > max
    {
        violations.push(Violation::new(
            fields.min_capacity.path,
            Problem::MinAboveMax {
                min: fields.min_capacity.value.unwrap_or_default().to_owned(),
                max: fields.max_capacity.value.unwrap_or_default().to_owned(),
            },
        ));
    }

    let min_step_absolute = check_quantity(fields.min_step_absolute, &mut violations);
    if min_step_absolute == Some(0) {
        violations.push(Violation::new(fields.min_step_absolute.path, Problem::Zero));
    }

    if fields
        .cooldown_duration
        .value
        .is_some_and(|v| v.trim().is_empty())
    {
        violations.push(Violation::new(fields.cooldown_duration.path, Problem::Empty));
    }

    let parsed = ParsedFields {
        threshold,
        increase_by,
        max_capacity: max_capacity.filter(|m| *m > 0),
        min_capacity,
        min_step_absolute: min_step_absolute.filter(|m| *m > 0),
    };

    (violations, parsed)
}

/// Fills unset percentages with their documented defaults. Returns whether
/// anything changed.
pub fn default(spec: &mut PersistentVolumeClaimAutoscalerSpec) -> bool {
    let mut changed = false;

    if spec.threshold.is_none() {
        spec.threshold = Some(DEFAULT_THRESHOLD.to_owned());
        changed = true;
    }
    if spec.increase_by.is_none() {
        spec.increase_by = Some(DEFAULT_INCREASE_BY.to_owned());
        changed = true;
    }

    changed
}

/// Validates a custom resource spec, reporting all violations at once.
pub fn validate(spec: &PersistentVolumeClaimAutoscalerSpec) -> Result<(), Vec<Violation>> {
    let (mut violations, _) = check_fields(&PolicyFields::from_spec(spec));

    let target = &spec.target_ref;
    if target.api_version != TARGET_API_VERSION || target.kind != TARGET_KIND {
        violations.push(Violation::new(
            "spec.targetRef",
            Problem::UnsupportedTarget {
                api_version: target.api_version.clone(),
                kind: target.kind.clone(),
            },
        ));
    }
    if target.name.trim().is_empty() {
        violations.push(Violation::new("spec.targetRef.name", Problem::Required));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Validates the tag-based policy annotations of a PersistentVolumeClaim.
pub fn validate_annotations(map: &BTreeMap<String, String>) -> Result<(), Vec<Violation>> {
    let (violations, _) = check_fields(&PolicyFields::from_annotations(map));

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
