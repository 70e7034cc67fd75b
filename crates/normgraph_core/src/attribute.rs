//! Attribute type inference and value coercion.
//!
//! # Responsibility
//! - Infer the narrowest storage type that every observed value satisfies.
//! - Track the maximum observed value length.
//! - Reuse previously registered attribute metadata instead of re-inferring.
//! - Coerce raw values into the canonical text form of their type.
//!
//! # Invariants
//! - Candidate order is fixed: integer, decimal, boolean, date, time,
//!   datetime, text. The first candidate accepted by every value wins.
//! - Lengths count characters, not bytes.
//! - A registered text attribute with a non-zero length rejects longer values.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d %B %Y", "%d %b %Y", "%B %d, %Y", "%b %d, %Y",
    "%B %d %Y", "%b %d %Y",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

/// Storage type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Integer,
    Decimal,
    Boolean,
    Date,
    Time,
    #[serde(rename = "datetime")]
    DateTime,
    Text,
}

impl AttributeType {
    /// Name persisted in the `Type` column of attribute definitions.
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::Text => "text",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AttributeError> {
        match value {
            "integer" => Ok(Self::Integer),
            "decimal" => Ok(Self::Decimal),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "time" => Ok(Self::Time),
            "datetime" => Ok(Self::DateTime),
            "text" => Ok(Self::Text),
            other => Err(AttributeError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    /// Value exceeds the registered fixed length of a text attribute.
    TooLong {
        name: String,
        length: usize,
        actual: usize,
    },
    /// Value cannot be parsed as the attribute's registered type.
    InvalidValue {
        name: String,
        kind: AttributeType,
        value: String,
    },
    /// Persisted type name is not one of the known candidates.
    UnknownType(String),
}

impl Display for AttributeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLong {
                name,
                length,
                actual,
            } => write!(
                f,
                "value of attribute `{name}` has {actual} characters, registered length is {length}"
            ),
            Self::InvalidValue { name, kind, value } => write!(
                f,
                "value `{value}` of attribute `{name}` is not a valid {}",
                kind.as_db_str()
            ),
            Self::UnknownType(kind) => write!(f, "unknown attribute type: {kind}"),
        }
    }
}

impl Error for AttributeError {}

/// Registered attribute metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub id: Uuid,
    pub name: String,
    pub kind: AttributeType,
    /// Maximum value length; `0` means unbounded.
    pub length: usize,
}

/// Outcome of inference over one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inference {
    pub kind: AttributeType,
    pub max_length: usize,
}

/// Whether a descriptor came from the store or from fresh inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Reused(AttributeDescriptor),
    Inferred(AttributeDescriptor),
}

impl Resolution {
    pub fn descriptor(&self) -> &AttributeDescriptor {
        match self {
            Self::Reused(descriptor) | Self::Inferred(descriptor) => descriptor,
        }
    }
}

/// Infers the storage type and maximum length of a column.
///
/// An empty value set is accepted by every candidate and therefore
/// infers `Integer` with length `0`.
pub fn infer_attribute_type<'a, I>(values: I) -> Inference
where
    I: IntoIterator<Item = &'a str>,
{
    let mut integer = true;
    let mut decimal = true;
    let mut boolean = true;
    let mut date = true;
    let mut time = true;
    let mut datetime = true;
    let mut max_length = 0usize;

    for value in values {
        max_length = max_length.max(value.chars().count());
        if parse_integer(value).is_none() {
            integer = false;
        }
        if parse_decimal(value).is_none() {
            decimal = false;
        }
        match parse_generic_datetime(value) {
            Some(parsed) => {
                if parsed.hour() != 0 || parsed.minute() != 0 {
                    date = false;
                }
                if parsed.date() != reference_date() {
                    time = false;
                }
            }
            None => {
                datetime = false;
                date = false;
                time = false;
            }
        }
        if parse_boolean(value).is_none() {
            boolean = false;
        }
    }

    let kind = if integer {
        AttributeType::Integer
    } else if decimal {
        AttributeType::Decimal
    } else if boolean {
        AttributeType::Boolean
    } else if date {
        AttributeType::Date
    } else if time {
        AttributeType::Time
    } else if datetime {
        AttributeType::DateTime
    } else {
        AttributeType::Text
    };

    Inference { kind, max_length }
}

/// Reuses `existing` metadata, or infers a new descriptor from `values`.
pub fn resolve_attribute<'a, I>(
    existing: Option<AttributeDescriptor>,
    name: &str,
    values: I,
) -> Resolution
where
    I: IntoIterator<Item = &'a str>,
{
    if let Some(descriptor) = existing {
        return Resolution::Reused(descriptor);
    }

    let inference = infer_attribute_type(values);
    Resolution::Inferred(AttributeDescriptor {
        id: Uuid::new_v4(),
        name: name.to_string(),
        kind: inference.kind,
        length: inference.max_length,
    })
}

/// Validates `value` against `descriptor` and returns its canonical form.
pub fn coerce_value(descriptor: &AttributeDescriptor, value: &str) -> Result<String, AttributeError> {
    let invalid = || AttributeError::InvalidValue {
        name: descriptor.name.clone(),
        kind: descriptor.kind,
        value: value.to_string(),
    };

    match descriptor.kind {
        AttributeType::Text => {
            let actual = value.chars().count();
            if descriptor.length > 0 && actual > descriptor.length {
                return Err(AttributeError::TooLong {
                    name: descriptor.name.clone(),
                    length: descriptor.length,
                    actual,
                });
            }
            Ok(value.to_string())
        }
        AttributeType::Integer => parse_integer(value)
            .map(|parsed| parsed.to_string())
            .ok_or_else(invalid),
        AttributeType::Decimal => parse_decimal(value)
            .map(|parsed| parsed.to_string())
            .ok_or_else(invalid),
        AttributeType::Boolean => parse_boolean(value)
            .map(|parsed| if parsed { "True" } else { "False" }.to_string())
            .ok_or_else(invalid),
        AttributeType::Date => parse_generic_datetime(value)
            .map(|parsed| parsed.format("%Y-%m-%d").to_string())
            .ok_or_else(invalid),
        AttributeType::Time => parse_generic_datetime(value)
            .map(|parsed| parsed.format("%H:%M:%S").to_string())
            .ok_or_else(invalid),
        AttributeType::DateTime => parse_generic_datetime(value)
            .map(|parsed| parsed.format("%Y-%m-%dT%H:%M:%S").to_string())
            .ok_or_else(invalid),
    }
}

fn parse_integer(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}

/// Accepts `nan`, `inf` and `infinity` in any case, like other decimals.
fn parse_decimal(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}

fn parse_boolean(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Parses a date, a time or both; missing parts come from
/// `0001-01-01 00:00:00`.
fn parse_generic_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(parsed.and_time(NaiveTime::MIN));
        }
    }
    for format in TIME_FORMATS {
        if let Ok(parsed) = NaiveTime::parse_from_str(trimmed, format) {
            return Some(reference_date().and_time(parsed));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{
        coerce_value, infer_attribute_type, resolve_attribute, AttributeDescriptor, AttributeError,
        AttributeType, Resolution,
    };
    use uuid::Uuid;

    fn infer(values: &[&str]) -> (AttributeType, usize) {
        let inference = infer_attribute_type(values.iter().copied());
        (inference.kind, inference.max_length)
    }

    #[test]
    fn integers_infer_integer() {
        assert_eq!(infer(&["1", "2", "3"]), (AttributeType::Integer, 1));
    }

    #[test]
    fn mixed_integer_and_fraction_infer_decimal() {
        assert_eq!(infer(&["1", "2.5"]), (AttributeType::Decimal, 3));
    }

    #[test]
    fn non_finite_values_infer_decimal() {
        assert_eq!(infer(&["nan", "Inf", "-1.5"]).0, AttributeType::Decimal);
    }

    #[test]
    fn boolean_match_is_case_insensitive() {
        assert_eq!(infer(&["true", "False"]), (AttributeType::Boolean, 5));
    }

    #[test]
    fn any_unparseable_value_falls_back_to_text() {
        assert_eq!(infer(&["abc", "1"]), (AttributeType::Text, 3));
    }

    #[test]
    fn dates_times_and_datetimes_are_distinguished() {
        assert_eq!(infer(&["2016-03-01", "2017-12-31"]).0, AttributeType::Date);
        assert_eq!(infer(&["09:30", "17:45:10"]).0, AttributeType::Time);
        assert_eq!(
            infer(&["2016-03-01 09:30", "2016-03-02"]).0,
            AttributeType::DateTime
        );
    }

    #[test]
    fn max_length_counts_characters() {
        assert_eq!(infer(&["naïve", "ab"]).1, 5);
    }

    #[test]
    fn existing_descriptor_is_reused_without_inference() {
        let existing = AttributeDescriptor {
            id: Uuid::new_v4(),
            name: "Age".to_string(),
            kind: AttributeType::Text,
            length: 2,
        };
        let resolution = resolve_attribute(Some(existing.clone()), "Age", ["123456"]);
        assert_eq!(resolution, Resolution::Reused(existing));

        let fresh = resolve_attribute(None, "Age", ["12", "345"]);
        assert!(matches!(fresh, Resolution::Inferred(_)));
        assert_eq!(fresh.descriptor().kind, AttributeType::Integer);
        assert_eq!(fresh.descriptor().length, 3);
    }

    #[test]
    fn text_longer_than_registered_length_is_rejected() {
        let descriptor = AttributeDescriptor {
            id: Uuid::new_v4(),
            name: "Code".to_string(),
            kind: AttributeType::Text,
            length: 3,
        };
        let err = coerce_value(&descriptor, "abcd").unwrap_err();
        assert_eq!(
            err,
            AttributeError::TooLong {
                name: "Code".to_string(),
                length: 3,
                actual: 4
            }
        );
        assert_eq!(coerce_value(&descriptor, "abc").unwrap(), "abc");
    }

    #[test]
    fn values_are_coerced_to_canonical_text() {
        let mut descriptor = AttributeDescriptor {
            id: Uuid::new_v4(),
            name: "x".to_string(),
            kind: AttributeType::Boolean,
            length: 0,
        };
        assert_eq!(coerce_value(&descriptor, "TRUE").unwrap(), "True");

        descriptor.kind = AttributeType::Date;
        assert_eq!(coerce_value(&descriptor, "2016/03/01").unwrap(), "2016-03-01");

        descriptor.kind = AttributeType::Integer;
        assert!(matches!(
            coerce_value(&descriptor, "twelve"),
            Err(AttributeError::InvalidValue { .. })
        ));
    }

    #[test]
    fn unknown_type_names_are_rejected() {
        assert_eq!(AttributeType::parse("datetime").unwrap(), AttributeType::DateTime);
        assert_eq!(
            AttributeType::parse("blob").unwrap_err(),
            AttributeError::UnknownType("blob".to_string())
        );
    }
}
