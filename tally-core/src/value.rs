//! Scalar values carried by a [`Record`](crate::record::Record).
//!
//! Nullability is part of the type: [`Value::Null`] and non-finite numbers
//! both serialize as JSON `null`, so no encoder has to patch "not a number"
//! sentinels on the way out.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Date format used when a date takes part in a composite key or is sent to
/// the remote store.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Largest magnitude for which an integral `f64` is printed without a fraction.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDate),
    /// Nested list/object values returned by the remote API.
    Json(serde_json::Value),
}

impl Value {
    /// Convert a decoded JSON value. Arrays and objects are kept verbatim.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }

    /// `true` for `Null` and for numbers that are NaN or infinite.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Number(n) => !n.is_finite(),
            _ => false,
        }
    }

    /// Borrow the text payload, if this is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Stringified form used to build composite keys.
    ///
    /// Integral numbers drop the fractional part (`42.0` → `"42"`), so a sheet
    /// cell `"42"` and an API number `42` produce the same key text.
    pub fn key_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format(DATE_FORMAT).to_string(),
            Value::Json(v) => v.to_string(),
        }
    }

    /// Convert to a JSON value for upload.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
            Value::Json(v) => v.clone(),
        }
    }
}

fn format_number(n: f64) -> String {
    if !n.is_finite() {
        String::new()
    } else if n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key_text())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if !n.is_finite() => serializer.serialize_unit(),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&d.format(DATE_FORMAT).to_string()),
            Value::Json(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_numbers_key_without_fraction() {
        assert_eq!(Value::Number(42.0).key_text(), "42");
        assert_eq!(Value::Number(-7.0).key_text(), "-7");
        assert_eq!(Value::Number(1.5).key_text(), "1.5");
    }

    #[test]
    fn nan_is_null_and_serializes_as_null() {
        let v = Value::Number(f64::NAN);
        assert!(v.is_null());
        assert_eq!(v.key_text(), "");
        assert_eq!(serde_json::to_string(&v).unwrap(), "null");
        assert_eq!(v.to_json(), serde_json::Value::Null);
    }

    #[test]
    fn dates_use_iso_form() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(Value::Date(d).key_text(), "2024-03-01");
        assert_eq!(serde_json::to_string(&Value::Date(d)).unwrap(), "\"2024-03-01\"");
    }

    #[test]
    fn from_json_keeps_nested_values() {
        let v = Value::from_json(json!(["a", "b"]));
        assert_eq!(v, Value::Json(json!(["a", "b"])));
        assert_eq!(v.key_text(), r#"["a","b"]"#);
        assert_eq!(Value::from_json(json!(3)), Value::Number(3.0));
        assert_eq!(Value::from_json(json!(null)), Value::Null);
    }

    #[test]
    fn integral_numbers_serialize_as_integers() {
        assert_eq!(serde_json::to_string(&Value::Number(9876543210.0)).unwrap(), "9876543210");
        assert_eq!(serde_json::to_string(&Value::Number(0.25)).unwrap(), "0.25");
    }
}
