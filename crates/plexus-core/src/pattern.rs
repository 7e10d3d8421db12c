#![forbid(unsafe_code)]

//! Wildcard id patterns and the unifier that matches concrete ids against them.
//!
//! A pattern is a dict id whose values may be wildcards:
//!
//! | Wildcard     | Matches                                                    |
//! |--------------|------------------------------------------------------------|
//! | `MATCH`      | one value, bound consistently across a callback instance   |
//! | `ALL`        | every value, yielding a list                               |
//! | `ALLSMALLER` | every value strictly smaller than the `MATCH` binding      |
//!
//! Wildcards are serialized as single-element arrays (`["MATCH"]`), which is
//! also how they appear in the canonical string form.
//!
//! # Anchored matching
//!
//! Resolution is relative to an [`Anchor`]: a concrete id together with the
//! pattern it was matched by. For a wildcard key of the candidate pattern the
//! candidate value is compared to the anchor value under the same key:
//!
//! - candidate `ALLSMALLER`: candidate value must be smaller;
//! - anchor `ALLSMALLER`, candidate `MATCH`: candidate value must be larger;
//! - otherwise (`MATCH` against anything): values must be equal.
//!
//! `ALL` keys are never constrained. A wildcard key absent from the anchor is
//! unconstrained as well.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::error::{IdError, Result};
use crate::id::{ComponentId, DictId, IdValue, is_wildcard_json, join_keys, json_type_name, stringify_entries};

pub const MATCH: &str = "MATCH";
pub const ALL: &str = "ALL";
pub const ALLSMALLER: &str = "ALLSMALLER";

/// One value slot of a dict pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Matcher {
    Literal(IdValue),
    Match,
    All,
    AllSmaller,
}

impl Matcher {
    pub fn from_json(key: &str, value: &Value) -> Result<Self> {
        if is_wildcard_json(value) {
            let name = value[0].as_str().unwrap_or_default();
            return match name {
                MATCH => Ok(Self::Match),
                ALL => Ok(Self::All),
                ALLSMALLER => Ok(Self::AllSmaller),
                other => Err(IdError::UnknownWildcard {
                    key: key.to_string(),
                    name: other.to_string(),
                }),
            };
        }
        IdValue::from_json(key, value).map(Self::Literal)
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Self::Literal(_))
    }

    /// `ALL` and `ALLSMALLER` resolve to lists.
    #[must_use]
    pub fn is_multi(&self) -> bool {
        matches!(self, Self::All | Self::AllSmaller)
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Literal(v) => v.to_json(),
            Self::Match => Value::Array(vec![Value::from(MATCH)]),
            Self::All => Value::Array(vec![Value::from(ALL)]),
            Self::AllSmaller => Value::Array(vec![Value::from(ALLSMALLER)]),
        }
    }
}

/// A dict pattern: key name to matcher, keys sorted.
pub type DictPattern = BTreeMap<String, Matcher>;

/// An id as written in a dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdPattern {
    Plain(String),
    Dict(DictPattern),
}

impl IdPattern {
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s.is_empty() => Err(IdError::EmptyId),
            Value::String(s) => Ok(Self::Plain(s.clone())),
            Value::Object(map) => Self::from_json_map(map),
            other => Err(IdError::InvalidIdType {
                found: json_type_name(other),
            }),
        }
    }

    fn from_json_map(map: &Map<String, Value>) -> Result<Self> {
        if map.is_empty() {
            return Err(IdError::EmptyId);
        }
        let mut pattern = DictPattern::new();
        for (key, value) in map {
            pattern.insert(key.clone(), Matcher::from_json(key, value)?);
        }
        Ok(Self::Dict(pattern))
    }

    /// Parse the canonical string form (plain text or dict JSON).
    pub fn parse(text: &str) -> Result<Self> {
        if !text.starts_with('{') {
            return Self::from_json(&Value::String(text.to_string()));
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
            Self::Dict(p) => stringify_entries(p.iter().map(|(k, m)| (k.as_str(), m.to_json()))),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Plain(s) => Value::String(s.clone()),
            Self::Dict(p) => Value::Object(p.iter().map(|(k, m)| (k.clone(), m.to_json())).collect()),
        }
    }

    #[must_use]
    pub fn as_dict(&self) -> Option<&DictPattern> {
        match self {
            Self::Dict(p) => Some(p),
            Self::Plain(_) => None,
        }
    }

    #[must_use]
    pub fn key_set(&self) -> Option<String> {
        self.as_dict().map(|p| join_keys(p.keys()))
    }

    #[must_use]
    pub fn is_multi(&self) -> bool {
        self.as_dict()
            .is_some_and(|p| p.values().any(Matcher::is_multi))
    }

    #[must_use]
    pub fn has_wildcards(&self) -> bool {
        self.as_dict()
            .is_some_and(|p| p.values().any(Matcher::is_wildcard))
    }

    /// Keys holding `MATCH`, sorted.
    pub fn match_keys(&self) -> impl Iterator<Item = &String> {
        self.as_dict()
            .into_iter()
            .flat_map(|p| p.iter().filter(|(_, m)| **m == Matcher::Match).map(|(k, _)| k))
    }

    /// Keys holding `ALLSMALLER`, sorted.
    pub fn all_smaller_keys(&self) -> impl Iterator<Item = &String> {
        self.as_dict().into_iter().flat_map(|p| {
            p.iter()
                .filter(|(_, m)| **m == Matcher::AllSmaller)
                .map(|(k, _)| k)
        })
    }
}

impl fmt::Display for IdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify())
    }
}

/// A pattern id together with a property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternRef {
    pub id: IdPattern,
    pub property: String,
}

impl PatternRef {
    #[must_use]
    pub fn new(id: IdPattern, property: impl Into<String>) -> Self {
        Self {
            id,
            property: property.into(),
        }
    }

    /// Canonical `<id>.<property>` key.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.{}", self.id.stringify(), self.property)
    }

    #[must_use]
    pub fn is_multi(&self) -> bool {
        self.id.is_multi()
    }
}

impl fmt::Display for PatternRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

// ============================================================================
// Anchored matching
// ============================================================================

/// A concrete dict id and the pattern it satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Anchor {
    pub id: DictId,
    pub pattern: DictPattern,
}

impl Anchor {
    #[must_use]
    pub fn new(id: DictId, pattern: DictPattern) -> Self {
        Self { id, pattern }
    }

    /// `MATCH` values of the anchor, in key order, as a JSON array string.
    /// Empty when the anchor binds no `MATCH` key.
    #[must_use]
    pub fn match_values(&self) -> String {
        let vals: Vec<Value> = self
            .pattern
            .iter()
            .filter(|(_, m)| **m == Matcher::Match)
            .filter_map(|(k, _)| self.id.get(k).map(IdValue::to_json))
            .collect();
        if vals.is_empty() {
            String::new()
        } else {
            Value::Array(vals).to_string()
        }
    }
}

/// Does `id` satisfy `pattern`, optionally relative to `anchor`?
///
/// The key sets must be identical; literals must be equal.
#[must_use]
pub fn id_matches(pattern: &DictPattern, id: &DictId, anchor: Option<&Anchor>) -> bool {
    if pattern.len() != id.len() {
        return false;
    }
    for (key, matcher) in pattern {
        let Some(value) = id.get(key) else {
            return false;
        };
        match matcher {
            Matcher::Literal(expected) => {
                if value != expected {
                    return false;
                }
            }
            Matcher::All => {}
            Matcher::Match | Matcher::AllSmaller => {
                let Some(anchor) = anchor else { continue };
                let Some(anchor_value) = anchor.id.get(key) else {
                    continue;
                };
                let anchor_matcher = anchor.pattern.get(key);
                let expected = match (matcher, anchor_matcher) {
                    (Matcher::AllSmaller, Some(Matcher::AllSmaller)) => return false,
                    (Matcher::AllSmaller, _) => Ordering::Less,
                    (_, Some(Matcher::AllSmaller)) => Ordering::Greater,
                    _ => Ordering::Equal,
                };
                if value.cmp(anchor_value) != expected {
                    return false;
                }
            }
        }
    }
    true
}

/// Does a concrete id satisfy an id pattern (no anchor)?
#[must_use]
pub fn component_matches(pattern: &IdPattern, id: &ComponentId) -> bool {
    match (pattern, id) {
        (IdPattern::Plain(p), ComponentId::Plain(s)) => p == s,
        (IdPattern::Dict(p), ComponentId::Dict(d)) => id_matches(p, d, None),
        _ => false,
    }
}

/// Can some concrete id satisfy both patterns? Used to detect overlapping outputs.
#[must_use]
pub fn patterns_overlap(a: &DictPattern, b: &DictPattern) -> bool {
    if a.len() != b.len() || !a.keys().eq(b.keys()) {
        return false;
    }
    a.iter().zip(b.values()).all(|((_, x), y)| match (x, y) {
        (Matcher::Literal(l), Matcher::Literal(r)) => l == r,
        _ => true,
    })
}
