//! Conversions between Rust attribute types and document values.

use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use facetdb_codec::Value;

/// Converts an attribute into a document value.
pub trait ToValue {
    /// Returns the document representation.
    fn to_value(&self) -> Value;
}

/// Converts a document value back into an attribute.
pub trait FromValue: Sized {
    /// Parses the value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] if the value has another shape.
    fn from_value(value: &Value) -> CoreResult<Self>;
}

/// Renders a timestamp the way documents store it.
///
/// Always nine fractional digits and a `Z`, so stored timestamps compare
/// correctly as text.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses any RFC 3339 timestamp into UTC.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn mismatch(expected: &'static str, found: &Value) -> CoreError {
    CoreError::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> CoreResult<Self> {
        Ok(value.clone())
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> CoreResult<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl ToValue for i64 {
    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> CoreResult<Self> {
        value.as_integer().ok_or_else(|| mismatch("integer", value))
    }
}

macro_rules! narrow_integer {
    ($($ty:ty => $name:literal),*) => {
        $(
            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    Value::Integer(i64::from(*self))
                }
            }

            impl FromValue for $ty {
                fn from_value(value: &Value) -> CoreResult<Self> {
                    value
                        .as_integer()
                        .and_then(|n| <$ty>::try_from(n).ok())
                        .ok_or_else(|| mismatch($name, value))
                }
            }
        )*
    };
}

narrow_integer!(i32 => "i32", u32 => "u32", u16 => "u16", u8 => "u8");

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> CoreResult<Self> {
        value.as_float().ok_or_else(|| mismatch("float", value))
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl FromValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: &Value) -> CoreResult<Self> {
        value
            .as_float()
            .map(|f| f as f32)
            .ok_or_else(|| mismatch("float", value))
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> CoreResult<Self> {
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| mismatch("text", value))
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Text(format_timestamp(*self))
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> CoreResult<Self> {
        value
            .as_text()
            .and_then(parse_timestamp)
            .ok_or_else(|| mismatch("timestamp", value))
    }
}

impl ToValue for EntityId {
    fn to_value(&self) -> Value {
        Value::Text(self.as_str().to_string())
    }
}

impl FromValue for EntityId {
    fn from_value(value: &Value) -> CoreResult<Self> {
        value
            .as_text()
            .map(EntityId::from)
            .ok_or_else(|| mismatch("entity id", value))
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, ToValue::to_value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> CoreResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> CoreResult<Self> {
        value
            .as_array()
            .ok_or_else(|| mismatch("list", value))?
            .iter()
            .map(T::from_value)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_narrow_with_range_check() {
        assert_eq!(u32::from_value(&Value::Integer(7)).unwrap(), 7);
        assert!(matches!(
            u32::from_value(&Value::Integer(-1)),
            Err(CoreError::TypeMismatch { expected: "u32", .. })
        ));
        assert!(i32::from_value(&Value::Integer(i64::MAX)).is_err());
    }

    #[test]
    fn floats_accept_integers() {
        assert_eq!(f64::from_value(&Value::Integer(2)).unwrap(), 2.0);
        assert!(f64::from_value(&Value::from("2")).is_err());
    }

    #[test]
    fn options_map_null() {
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(Some(5i64).to_value(), Value::Integer(5));
        assert_eq!(None::<String>.to_value(), Value::Null);
    }

    #[test]
    fn lists_convert_elementwise() {
        let value = vec!["a".to_string(), "b".to_string()].to_value();
        assert_eq!(
            Vec::<String>::from_value(&value).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(Vec::<i64>::from_value(&value).is_err());
    }

    #[test]
    fn timestamp_text_is_lossless_and_ordered() {
        let early = parse_timestamp("2024-01-01T00:00:00.000000001Z").unwrap();
        let late = parse_timestamp("2024-01-01T00:00:00.000000010Z").unwrap();

        assert_eq!(DateTime::<Utc>::from_value(&early.to_value()).unwrap(), early);
        let (a, b) = (format_timestamp(early), format_timestamp(late));
        assert!(a < b);
        assert_eq!(a, "2024-01-01T00:00:00.000000001Z");
    }

    #[test]
    fn references_through_borrows() {
        let name = String::from("John");
        assert_eq!((&name).to_value(), Value::from("John"));
        assert_eq!("John".to_value(), Value::from("John"));
    }
}
