//! Lenient deserializers and accessors for API records
//!
//! The API is loose with types: numbers arrive as strings, booleans as `0`/`1`
//! and timestamps in more than one format.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

use htb_core::{HtbError, Result};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString<T> {
    Number(T),
    String(String),
}

/// Number that is sometimes sent as a string
pub fn number<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    NumberOrString::<T>::deserialize(deserializer)?.resolve()
}

impl<T> NumberOrString<T>
where
    T: FromStr,
    T::Err: Display,
{
    fn resolve<E: serde::de::Error>(self) -> std::result::Result<T, E> {
        match self {
            Self::Number(n) => Ok(n),
            Self::String(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

/// Like [`number`], with `null` as the type's default
pub fn number_or_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr + Default,
    T::Err: Display,
{
    Option::<NumberOrString<T>>::deserialize(deserializer)?
        .map_or_else(|| Ok(T::default()), NumberOrString::resolve)
}

/// Like [`number`], with `null` and `""` as `None`
pub fn optional_number<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match Option::<NumberOrString<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => value.resolve().map(Some),
    }
}

/// Boolean that may be sent as `0`/`1`, `"0"`/`"1"` or `null`
pub fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|n| n != 0.0)),
        Value::String(s) => Ok(!matches!(s.as_str(), "" | "0" | "false")),
        other => Err(D::Error::custom(format!("expected a boolean, got {other}"))),
    }
}

/// `null` becomes the type's default
pub fn or_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Optional timestamp; `null` and empty strings are `None`
pub fn timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.is_empty())
        .map(|s| parse_timestamp(&s).map_err(D::Error::custom))
        .transpose()
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC
pub fn parse_timestamp(text: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
}

/// Durations are exposed as whole seconds
pub fn seconds<S>(duration: &Option<Duration>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match duration {
        Some(duration) => serializer.serialize_u64(duration.as_secs()),
        None => serializer.serialize_none(),
    }
}

/// `{"id": ..}` reference to another record
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IdRef {
    #[serde(deserialize_with = "number")]
    pub id: u64,
}

/// Truthiness of a loosely typed status value
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !matches!(s.as_str(), "" | "0" | "false"),
        _ => false,
    }
}

/// Numeric `id` of a raw record
pub fn record_id(record: &Value) -> Result<u64> {
    match record.get("id") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| HtbError::Api(format!("record has no usable id: {}", snippet(record))))
}

/// Move `key` out of a response object
pub fn take(mut body: Value, key: &str) -> Result<Value> {
    match body.get_mut(key) {
        Some(value) => Ok(value.take()),
        None => Err(HtbError::Api(format!(
            "response has no '{key}': {}",
            snippet(&body)
        ))),
    }
}

/// Move the value at a JSON pointer out of a response
pub fn take_pointer(mut body: Value, pointer: &str) -> Result<Value> {
    match body.pointer_mut(pointer) {
        Some(value) => Ok(value.take()),
        None => Err(HtbError::Api(format!(
            "response has no '{pointer}': {}",
            snippet(&body)
        ))),
    }
}

/// Interpret a value as a list of records
pub fn into_list(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(HtbError::Api(format!("expected a list: {}", snippet(&other)))),
    }
}

/// Text of a response's `message`, empty when absent
pub fn message(body: &Value) -> &str {
    body.get("message").and_then(Value::as_str).unwrap_or_default()
}

/// Apply an optional `limit` the way list endpoints are truncated
pub fn truncate<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}

fn snippet(value: &Value) -> String {
    value.to_string().chars().take(200).collect()
}
