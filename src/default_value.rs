//! Typed default / fixed values and their one canonical XML rendering.
//!
//! Reconciliation compares two defaults by their rendered text, so every
//! value of one type must render identically no matter how it was written:
//! `1.50` and `1.5` are the same decimal, `2024-01-02T03:04:05.000` and
//! `2024-01-02T03:04:05` the same dateTime.
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use ordered_float::OrderedFloat;
use serde::{Serialize, Serializer};

use crate::error::{MappingError, MappingResult};
use crate::type_desc::TypeDesc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(OrderedFloat<f64>),
    /// Canonical decimal text: no `+`, no trailing fractional zeros.
    Decimal(String),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
    Text(String),
    /// Enum constant names (code names, not XML names); several for flags.
    Enum(Vec<String>),
}

impl DefaultValue {
    /// Parse XML text against the primitive `desc` it defaults.
    pub fn parse(text: &str, desc: &TypeDesc) -> MappingResult<Self> {
        let bad = |what: &str| {
            MappingError::annotation(
                desc.name.clone(),
                format!("default value `{text}` is not a valid {what}"),
            )
        };
        let trimmed = text.trim();
        let value = match desc.name.as_str() {
            "bool" => match trimmed {
                "true" | "1" => Self::Bool(true),
                "false" | "0" => Self::Bool(false),
                _ => return Err(bad("boolean")),
            },
            "i8" | "i16" | "i32" | "i64" => {
                let v: i64 = trimmed.parse().map_err(|_| bad("integer"))?;
                let (lo, hi) = match desc.name.as_str() {
                    "i8" => (i8::MIN as i64, i8::MAX as i64),
                    "i16" => (i16::MIN as i64, i16::MAX as i64),
                    "i32" => (i32::MIN as i64, i32::MAX as i64),
                    _ => (i64::MIN, i64::MAX),
                };
                if v < lo || v > hi {
                    return Err(bad(&desc.name));
                }
                Self::Int(v)
            }
            "u8" | "u16" | "u32" | "u64" => {
                let v: u64 = trimmed.parse().map_err(|_| bad("unsigned integer"))?;
                let hi = match desc.name.as_str() {
                    "u8" => u8::MAX as u64,
                    "u16" => u16::MAX as u64,
                    "u32" => u32::MAX as u64,
                    _ => u64::MAX,
                };
                if v > hi {
                    return Err(bad(&desc.name));
                }
                Self::UInt(v)
            }
            "f32" | "f64" => Self::Float(OrderedFloat(parse_float(trimmed).ok_or_else(|| bad("float"))?)),
            "decimal" => Self::Decimal(canonical_decimal(trimmed).ok_or_else(|| bad("decimal"))?),
            "datetime" => match desc.data_type.as_deref() {
                Some("date") => Self::Date(
                    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| bad("date"))?,
                ),
                Some("time") => Self::Time(
                    NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f").map_err(|_| bad("time"))?,
                ),
                _ => parse_date_time(trimmed).ok_or_else(|| bad("dateTime"))?,
            },
            "char" => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(_), None) => Self::Text(text.to_owned()),
                    _ => return Err(bad("char")),
                }
            }
            _ => Self::Text(text.to_owned()),
        };
        Ok(value)
    }

    /// Parse a default written in a JSON document: scalars go through their
    /// text form so both inputs land on the same canonical value.
    pub fn from_json(value: &serde_json::Value, desc: &TypeDesc) -> MappingResult<Self> {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(MappingError::annotation(
                    desc.name.clone(),
                    format!("default value {other} is not a scalar"),
                ));
            }
        };
        Self::parse(&text, desc)
    }

    /// Canonical, culture-invariant text.
    pub fn to_xml_string(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(v) => v.to_string(),
            Self::UInt(v) => v.to_string(),
            Self::Float(f) => format_float(f.0),
            Self::Decimal(s) | Self::Text(s) => s.clone(),
            Self::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            Self::DateTimeOffset(dt) => dt.to_rfc3339(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            Self::Enum(names) => names.join(" "),
        }
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml_string())
    }
}

impl Serialize for DefaultValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn parse_float(s: &str) -> Option<f64> {
    match s {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => s.parse().ok().filter(|f: &f64| f.is_finite()),
    }
}

/// Shortest round-trip digits; XSD spellings for the non-finite values.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_owned()
    } else if f == f64::INFINITY {
        "INF".to_owned()
    } else if f == f64::NEG_INFINITY {
        "-INF".to_owned()
    } else {
        f.to_string()
    }
}

fn canonical_decimal(s: &str) -> Option<String> {
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.strip_prefix('+').unwrap_or(s)),
    };
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if int.is_empty() && frac.is_empty() {
        return None;
    }
    if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let int = int.trim_start_matches('0');
    let frac = frac.trim_end_matches('0');
    let int = if int.is_empty() { "0" } else { int };
    let sign = if int == "0" && frac.is_empty() { "" } else { sign };
    Some(if frac.is_empty() { format!("{sign}{int}") } else { format!("{sign}{int}.{frac}") })
}

fn parse_date_time(s: &str) -> Option<DefaultValue> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(DefaultValue::DateTimeOffset(dt));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(DefaultValue::DateTime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_desc::TypeScope;

    fn desc(scope: &TypeScope, name: &str) -> TypeDesc {
        scope.get(scope.named(name).unwrap()).clone()
    }

    #[test]
    fn equivalent_spellings_render_identically() {
        let scope = TypeScope::new();
        let dec = desc(&scope, "decimal");
        let a = DefaultValue::parse("+01.50", &dec).unwrap();
        let b = DefaultValue::parse("1.5", &dec).unwrap();
        assert_eq!(a.to_xml_string(), b.to_xml_string());
        assert_eq!(a.to_xml_string(), "1.5");

        let dt = desc(&scope, "datetime");
        let a = DefaultValue::parse("2024-01-02T03:04:05.000", &dt).unwrap();
        let b = DefaultValue::parse("2024-01-02T03:04:05", &dt).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn floats_use_xsd_spellings() {
        let scope = TypeScope::new();
        let f = desc(&scope, "f64");
        assert_eq!(DefaultValue::parse("INF", &f).unwrap().to_xml_string(), "INF");
        assert_eq!(DefaultValue::parse("0.10", &f).unwrap().to_xml_string(), "0.1");
        let json = DefaultValue::from_json(&serde_json::json!(2.5), &f).unwrap();
        assert_eq!(json, DefaultValue::parse("2.5", &f).unwrap());
    }

    #[test]
    fn range_is_checked() {
        let scope = TypeScope::new();
        assert!(DefaultValue::parse("300", &desc(&scope, "u8")).is_err());
        assert!(DefaultValue::parse("maybe", &desc(&scope, "bool")).is_err());
        assert_eq!(DefaultValue::parse("1", &desc(&scope, "bool")).unwrap(), DefaultValue::Bool(true));
    }
}
