// Copyright 2024 OctoFHIR Team
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

//! Equality, equivalence and ordering between values
//!
//! JSON documents carry dates as strings, so a string compared with a date
//! or dateTime literal is parsed on demand.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::cmp::Ordering;

use super::value::FhirPathValue;

/// Parse a date literal; partial dates (`2020`, `2020-01`) stay strings
pub fn parse_date_literal(text: &str) -> FhirPathValue {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(FhirPathValue::Date)
        .unwrap_or_else(|_| FhirPathValue::String(text.to_string()))
}

/// Parse a dateTime literal; values without a timezone are taken as UTC
pub fn parse_datetime_literal(text: &str) -> FhirPathValue {
    parse_datetime(text)
        .map(FhirPathValue::DateTime)
        .unwrap_or_else(|| FhirPathValue::String(text.to_string()))
}

/// Parse a time literal (`12:00`, `12:00:00`, `12:00:00.123`)
pub fn parse_time_literal(text: &str) -> FhirPathValue {
    ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
        .map(FhirPathValue::Time)
        .unwrap_or_else(|| FhirPathValue::String(text.to_string()))
}

fn parse_datetime(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl FhirPathValue {
    /// FHIRPath `=` between two single values; `None` when the result is empty
    pub fn equals(&self, other: &FhirPathValue) -> Option<bool> {
        use FhirPathValue::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => Some(a == b),
            (String(a), String(b)) => Some(a == b),
            (Resource(a), Resource(b)) => Some(a == b),
            (Integer(_) | Decimal(_), Integer(_) | Decimal(_)) => {
                Some(self.as_decimal() == other.as_decimal())
            }
            (Date(_) | DateTime(_) | Time(_), _) | (_, Date(_) | DateTime(_) | Time(_)) => {
                self.compare(other).map(|ordering| ordering == Ordering::Equal)
            }
            _ => Some(false),
        }
    }

    /// FHIRPath `~`: case and whitespace insensitive for strings, never empty
    pub fn equivalent(&self, other: &FhirPathValue) -> bool {
        match (self, other) {
            (FhirPathValue::String(a), FhirPathValue::String(b)) => {
                normalize_whitespace(a) == normalize_whitespace(b)
            }
            _ => self.equals(other) == Some(true),
        }
    }

    /// Ordering used by `<`, `<=`, `>`, `>=`; `None` when the values are not comparable
    pub fn compare(&self, other: &FhirPathValue) -> Option<Ordering> {
        use FhirPathValue::*;
        match (self, other) {
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Integer(_) | Decimal(_), Integer(_) | Decimal(_)) => {
                Some(self.as_decimal()?.cmp(&other.as_decimal()?))
            }
            (String(a), String(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
            (Time(a), Time(b)) => Some(a.cmp(b)),
            (Date(a), DateTime(b)) => Some(a.cmp(&b.date_naive())),
            (DateTime(a), Date(b)) => Some(a.date_naive().cmp(b)),
            (String(text), Date(_) | DateTime(_) | Time(_)) => {
                coerce_string(text, other)?.compare(other)
            }
            (Date(_) | DateTime(_) | Time(_), String(text)) => {
                self.compare(&coerce_string(text, self)?)
            }
            _ => None,
        }
    }
}

/// Interpret a string in the temporal type of `like`
fn coerce_string(text: &str, like: &FhirPathValue) -> Option<FhirPathValue> {
    let coerced = match like {
        FhirPathValue::Date(_) if text.contains('T') => parse_datetime_literal(text),
        FhirPathValue::Date(_) => parse_date_literal(text),
        FhirPathValue::DateTime(_) if !text.contains('T') => parse_date_literal(text),
        FhirPathValue::DateTime(_) => parse_datetime_literal(text),
        FhirPathValue::Time(_) => parse_time_literal(text),
        _ => return None,
    };
    match coerced {
        FhirPathValue::String(_) => None,
        value => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;

    fn string(value: &str) -> FhirPathValue {
        FhirPathValue::String(value.to_string())
    }

    #[rstest]
    #[case(FhirPathValue::Integer(1), FhirPathValue::Decimal(Decimal::new(10, 1)), Some(true))]
    #[case(string("a"), string("a"), Some(true))]
    #[case(string("a"), FhirPathValue::Integer(1), Some(false))]
    #[case(parse_date_literal("2020-01-01"), string("2020-01-01"), Some(true))]
    #[case(parse_date_literal("2020-01-01"), string("not a date"), None)]
    fn test_equals(
        #[case] left: FhirPathValue,
        #[case] right: FhirPathValue,
        #[case] expected: Option<bool>,
    ) {
        assert_eq!(left.equals(&right), expected);
    }

    #[test]
    fn test_equivalence_ignores_case_and_spacing() {
        assert!(string("Hello  World").equivalent(&string("hello world")));
        assert!(!string("a").equivalent(&string("b")));
    }

    #[test]
    fn test_temporal_ordering_against_strings() {
        let literal = parse_date_literal("2000-01-01");
        assert_eq!(string("1990-05-12").compare(&literal), Some(Ordering::Less));
        let instant = parse_datetime_literal("2020-01-01T10:00:00Z");
        assert_eq!(
            string("2020-01-01T12:00:00+02:00").compare(&instant),
            Some(Ordering::Equal)
        );
        assert_eq!(string("a").compare(&FhirPathValue::Integer(1)), None);
    }

    #[test]
    fn test_partial_dates_stay_strings() {
        assert_eq!(parse_date_literal("2020-01"), string("2020-01"));
        assert!(matches!(parse_time_literal("10:30"), FhirPathValue::Time(_)));
    }
}
