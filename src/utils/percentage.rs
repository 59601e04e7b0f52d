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

//! Percentage strings of the form `NN.NN%`.

use crate::types::error::{BadPercentageValueSnafu, Error};
use snafu::ensure;

/// Parses a percentage string such as `"20%"` or `" 12.5% "`.
///
/// Surrounding whitespace is ignored, the `%` suffix is mandatory and must
/// directly follow the number. The value must lie within `[0, 100]`.
pub fn parse_percentage(value: &str) -> Result<f64, Error> {
    let bad = || BadPercentageValueSnafu { value };

    let number = value.trim().strip_suffix('%').ok_or_else(|| bad().build())?;

    ensure!(!number.is_empty(), bad());
    ensure!(
        number.chars().all(|c| c.is_ascii_digit() || c == '.'),
        bad()
    );
    ensure!(number.matches('.').count() <= 1, bad());
    ensure!(!number.starts_with('.') && !number.ends_with('.'), bad());

    let parsed: f64 = number.parse().map_err(|_| bad().build())?;
    ensure!((0.0..=100.0).contains(&parsed), bad());

    Ok(parsed)
}

/// Renders a percentage with two decimals, e.g. `"9.50%"`.
pub fn format_percentage(value: f64) -> String {
    format!("{value:.2}%")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_padded() {
        assert_eq!(parse_percentage("20%").unwrap(), 20.0);
        assert_eq!(parse_percentage(" 20% ").unwrap(), 20.0);
        assert_eq!(parse_percentage("\t12.75%\n").unwrap(), 12.75);
        assert_eq!(parse_percentage("0%").unwrap(), 0.0);
        assert_eq!(parse_percentage("100%").unwrap(), 100.0);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for value in [
            "20 %", "1000%", "-100%", "", "%", "20", "abc%", "1.2.3%", ".5%", "5.%", "+5%",
            "100.01%",
        ] {
            let err = parse_percentage(value).expect_err(value);
            assert!(
                matches!(err, Error::BadPercentageValue { .. }),
                "unexpected error for {value:?}: {err}"
            );
        }
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(10.0), "10.00%");
        assert_eq!(format_percentage(9.5), "9.50%");
        assert_eq!(parse_percentage(&format_percentage(33.33)).unwrap(), 33.33);
    }
}
