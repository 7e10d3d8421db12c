#![forbid(unsafe_code)]

//! Component identifiers.
//!
//! A component is addressed either by a plain string or by a dict id: a
//! non-empty map from key name to a scalar value. Dict ids have one canonical
//! string form (keys sorted, compact JSON) which is what every map in the
//! engine keys on, so two dict ids with the same entries in a different
//! insertion order are the same component.
//!
//! # Value ordering
//!
//! [`IdValue`] is totally ordered so that `ALLSMALLER` can compare ids:
//! numbers sort before booleans, booleans before strings. Numbers compare
//! numerically, so `3` and `3.0` are the same value.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{IdError, Result};

// ============================================================================
// IdValue
// ============================================================================

/// A scalar value inside a dict id.
#[derive(Debug, Clone)]
pub enum IdValue {
    Int(i64),
    /// Always finite and never integral; integral floats normalize to `Int`.
    Float(f64),
    Bool(bool),
    Str(String),
}

impl IdValue {
    /// Interpret a JSON scalar. Arrays, objects and null are rejected.
    pub fn from_json(key: &str, value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Self::Str(s.clone())),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Self::Int(i));
                }
                let f = n.as_f64().ok_or_else(|| IdError::NonFiniteNumber {
                    key: key.to_string(),
                })?;
                Self::from_f64(key, f)
            }
            _ => Err(IdError::NonScalarValue {
                key: key.to_string(),
            }),
        }
    }

    fn from_f64(key: &str, f: f64) -> Result<Self> {
        if !f.is_finite() {
            return Err(IdError::NonFiniteNumber {
                key: key.to_string(),
            });
        }
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
            Ok(Self::Int(f as i64))
        } else {
            Ok(Self::Float(f))
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Bool(b) => Value::Bool(*b),
            Self::Str(s) => Value::String(s.clone()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Int(_) | Self::Float(_) => 0,
            Self::Bool(_) => 1,
            Self::Str(_) => 2,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl Ord for IdValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

impl PartialOrd for IdValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IdValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IdValue {}

impl Hash for IdValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Int(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Bool(b) => b.hash(state),
            Self::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json().to_string())
    }
}

impl From<i64> for IdValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for IdValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for IdValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for IdValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

// ============================================================================
// DictId
// ============================================================================

/// A concrete dict id. Keys are kept sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DictId(BTreeMap<String, IdValue>);

impl DictId {
    pub fn new(entries: BTreeMap<String, IdValue>) -> Result<Self> {
        if entries.is_empty() {
            return Err(IdError::EmptyId);
        }
        Ok(Self(entries))
    }

    /// Build from literal pairs. Panics on an empty list; meant for tests and fixtures.
    #[must_use]
    pub fn of<K: Into<String>, V: Into<IdValue>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        let map: BTreeMap<String, IdValue> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        assert!(!map.is_empty(), "dict id needs at least one key");
        Self(map)
    }

    pub fn from_json_map(map: &Map<String, Value>) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (key, value) in map {
            if is_wildcard_json(value) {
                return Err(IdError::WildcardInConcreteId { key: key.clone() });
            }
            entries.insert(key.clone(), IdValue::from_json(key, value)?);
        }
        Self::new(entries)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&IdValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IdValue)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sorted key names joined by ','; the bucket key for pattern lookup.
    #[must_use]
    pub fn key_set(&self) -> String {
        join_keys(self.0.keys())
    }

    /// Canonical string form: sorted keys, compact JSON.
    #[must_use]
    pub fn stringify(&self) -> String {
        stringify_entries(self.0.iter().map(|(k, v)| (k.as_str(), v.to_json())))
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

pub(crate) fn join_keys<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    keys.map(String::as_str).collect::<Vec<_>>().join(",")
}

pub(crate) fn stringify_entries<'a>(entries: impl Iterator<Item = (&'a str, Value)>) -> String {
    let body: Vec<String> = entries
        .map(|(k, v)| format!("{}:{}", Value::String(k.to_string()), v))
        .collect();
    format!("{{{}}}", body.join(","))
}

pub(crate) fn is_wildcard_json(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.len() == 1 && items[0].is_string())
}

// ============================================================================
// ComponentId
// ============================================================================

/// Identity of a component in the layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentId {
    Plain(String),
    Dict(DictId),
}

impl ComponentId {
    #[must_use]
    pub fn plain(id: impl Into<String>) -> Self {
        Self::Plain(id.into())
    }

    /// Interpret an `id` value taken from a layout node or a payload.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s.is_empty() => Err(IdError::EmptyId),
            Value::String(s) => Ok(Self::Plain(s.clone())),
            Value::Object(map) => Ok(Self::Dict(DictId::from_json_map(map)?)),
            other => Err(IdError::InvalidIdType {
                found: json_type_name(other),
            }),
        }
    }

    /// Inverse of [`ComponentId::stringify`]: strings starting with '{' are
    /// parsed as a dict id.
    pub fn parse(text: &str) -> Result<Self> {
        if !text.starts_with('{') {
            if text.is_empty() {
                return Err(IdError::EmptyId);
            }
            return Ok(Self::Plain(text.to_string()));
        }
        let value: Value = serde_json::from_str(text).map_err(|e| IdError::InvalidJson {
            text: text.to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&value)
    }

    #[must_use]
    pub fn stringify(&self) -> String {
        match self {
            Self::Plain(s) => s.clone(),
            Self::Dict(d) => d.stringify(),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Plain(s) => Value::String(s.clone()),
            Self::Dict(d) => d.to_json(),
        }
    }

    #[must_use]
    pub fn as_dict(&self) -> Option<&DictId> {
        match self {
            Self::Dict(d) => Some(d),
            Self::Plain(_) => None,
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify())
    }
}

impl From<DictId> for ComponentId {
    fn from(d: DictId) -> Self {
        Self::Dict(d)
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        Self::Plain(s.to_string())
    }
}

impl Serialize for ComponentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ComponentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
