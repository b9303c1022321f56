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

//! Just enough of the Kubernetes quantity grammar to add memory sizes.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 1),
    ("Mi", 2),
    ("Gi", 3),
    ("Ti", 4),
    ("Pi", 5),
    ("Ei", 6),
];

const DECIMAL_SUFFIXES: [(&str, u32); 6] = [
    ("k", 1),
    ("M", 2),
    ("G", 3),
    ("T", 4),
    ("P", 5),
    ("E", 6),
];

/// Parses a quantity into whole units, rounding fractions up.
pub fn parse(value: &str) -> Option<u128> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (number, multiplier) = split_suffix(value)?;
    let number: f64 = number.parse().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }

    Some((number * multiplier).ceil() as u128)
}

fn split_suffix(value: &str) -> Option<(&str, f64)> {
    for (suffix, power) in BINARY_SUFFIXES {
        if let Some(number) = value.strip_suffix(suffix) {
            return Some((number, 1024f64.powi(power as i32)));
        }
    }
    for (suffix, power) in DECIMAL_SUFFIXES {
        if let Some(number) = value.strip_suffix(suffix) {
            return Some((number, 1000f64.powi(power as i32)));
        }
    }
    if let Some(number) = value.strip_suffix('m') {
        return Some((number, 0.001));
    }
    value
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.')
        .then_some((value, 1.0))
}

/// Formats with the largest binary suffix that divides the value exactly.
pub fn format(units: u128) -> String {
    for (suffix, power) in BINARY_SUFFIXES.iter().rev() {
        let base = 1024u128.pow(*power);
        if units >= base && units % base == 0 {
            return format!("{}{}", units / base, suffix);
        }
    }
    units.to_string()
}

/// `a + b`, or `None` when either side is not a valid quantity.
pub fn add(a: &Quantity, b: &Quantity) -> Option<Quantity> {
    Some(Quantity(format(parse(&a.0)? + parse(&b.0)?)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // Test: common suffixes
    #[test]
    fn test_parse() {
        assert_eq!(parse("1Ki"), Some(1024));
        assert_eq!(parse("2Gi"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse("1.5Mi"), Some(1536 * 1024));
        assert_eq!(parse("1G"), Some(1_000_000_000));
        assert_eq!(parse("512"), Some(512));
        assert_eq!(parse(""), None);
        assert_eq!(parse("ten"), None);
        assert_eq!(parse("10Xi"), None);
    }

    // Test: sums are formatted with binary suffixes
    #[test]
    fn test_add() {
        let sum = add(&Quantity("1Gi".to_string()), &Quantity("512Mi".to_string())).unwrap();
        assert_eq!(sum.0, "1536Mi");

        let sum = add(&Quantity("1Gi".to_string()), &Quantity("1Gi".to_string())).unwrap();
        assert_eq!(sum.0, "2Gi");

        assert!(add(&Quantity("bad".to_string()), &Quantity("1Gi".to_string())).is_none());
    }
}
