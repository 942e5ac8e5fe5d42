//! Cache key composition.
//!
//! Defines `QueryKey` for typed cache entries and `compose_key` for turning a
//! logical request into the canonical string that identifies it.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;

/// Scope used for metrics series keys.
pub const METRICS_SCOPE: &str = "metrics";
/// Scope used for resource info keys.
pub const INFO_SCOPE: &str = "info";

/// Identifies one cache entry and the value type it resolves to.
///
/// The string is the identity; `T` only keeps reads and writes for the key
/// type-consistent.
pub struct QueryKey<T> {
    raw: Arc<str>,
    _value: PhantomData<fn() -> T>,
}

impl<T> QueryKey<T> {
    pub fn new(raw: impl Into<Arc<str>>) -> Self {
        Self {
            raw: raw.into(),
            _value: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub(crate) fn shared(&self) -> Arc<str> {
        Arc::clone(&self.raw)
    }
}

impl<T> Clone for QueryKey<T> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
            _value: PhantomData,
        }
    }
}

impl<T> PartialEq for QueryKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for QueryKey<T> {}

impl<T> Hash for QueryKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for QueryKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueryKey").field(&self.raw).finish()
    }
}

impl<T> fmt::Display for QueryKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl<T> From<String> for QueryKey<T> {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl<T> From<&str> for QueryKey<T> {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// A single request parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Unsigned(u64),
    /// Non-finite values are stored as their `Text` rendering on insertion.
    Float(f64),
    Bool(bool),
    /// Normalized to a comma-joined `Text` on insertion.
    List(Vec<String>),
}

impl ParamValue {
    fn normalize(self) -> Self {
        match self {
            ParamValue::List(items) => ParamValue::Text(items.join(",")),
            // JSON has no encoding for these and would write them all as `null`.
            ParamValue::Float(value) if !value.is_finite() => ParamValue::Text(value.to_string()),
            other => other,
        }
    }

    /// Render the value the way it travels in a query string.
    pub fn to_query_value(&self) -> String {
        match self {
            ParamValue::Text(value) => value.clone(),
            ParamValue::Integer(value) => value.to_string(),
            ParamValue::Unsigned(value) => value.to_string(),
            ParamValue::Float(value) => value.to_string(),
            ParamValue::Bool(value) => value.to_string(),
            ParamValue::List(items) => items.join(","),
        }
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Integer(value.into())
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::Unsigned(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Unsigned(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(items: Vec<String>) -> Self {
        ParamValue::List(items)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(items: Vec<&str>) -> Self {
        ParamValue::List(items.into_iter().map(str::to_string).collect())
    }
}

/// Normalized request parameters.
///
/// Absent values never enter the set and list values are stored comma-joined,
/// so two logically equal requests serialize identically whatever order their
/// parameters were supplied in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, ParamValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, or remove it when `value` is `None`.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<ParamValue>) -> &mut Self {
        let name = name.into();
        match value {
            Some(value) => {
                self.0.insert(name, value.normalize());
            }
            None => {
                self.0.remove(&name);
            }
        }
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, Some(value.into()));
        self
    }

    pub fn with_opt<V: Into<ParamValue>>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        self.insert(name, value.map(Into::into));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Query-string pairs in canonical (sorted) order.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.to_query_value()))
            .collect()
    }

    /// Canonical JSON form of the parameters alone.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).expect("serializing query params should succeed")
    }
}

#[derive(Serialize)]
struct KeyDocument<'a> {
    scope: &'a str,
    resource: &'a str,
    series: &'a str,
    params: &'a QueryParams,
}

/// Compose the cache key for a metrics series request.
pub fn compose_key(resource: &str, series: &str, params: &QueryParams) -> String {
    compose_scoped_key(METRICS_SCOPE, resource, series, params)
}

/// Compose a cache key for any scope.
///
/// The key is canonical JSON: field order is fixed and parameters are sorted by
/// name, so equal requests yield byte-identical keys and JSON string escaping
/// keeps distinct requests apart.
pub fn compose_scoped_key(scope: &str, resource: &str, series: &str, params: &QueryParams) -> String {
    let document = KeyDocument {
        scope,
        resource,
        series,
        params,
    };
    serde_json::to_string(&document).expect("serializing cache key should succeed")
}
