//! Concrete `(component, property)` references and their string keys.

use std::fmt;

use crate::error::{IdError, Result};
use crate::id::ComponentId;

/// A resolved property of a concrete component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyRef {
    pub id: ComponentId,
    pub property: String,
}

impl PropertyRef {
    #[must_use]
    pub fn new(id: ComponentId, property: impl Into<String>) -> Self {
        Self {
            id,
            property: property.into(),
        }
    }

    /// `<stringified id>.<property>`.
    #[must_use]
    pub fn key(&self) -> String {
        combine_id_and_prop(&self.id.stringify(), &self.property)
    }

    /// Parse a key produced by [`PropertyRef::key`].
    pub fn parse(key: &str) -> Result<Self> {
        let (id, property) = split_id_and_prop(key)?;
        Ok(Self {
            id: ComponentId::parse(id)?,
            property: property.to_string(),
        })
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[must_use]
pub fn combine_id_and_prop(id: &str, property: &str) -> String {
    format!("{id}.{property}")
}

/// Split on the last '.'; ids may contain dots, property names may not.
pub fn split_id_and_prop(key: &str) -> Result<(&str, &str)> {
    match key.rsplit_once('.') {
        Some((id, prop)) if !id.is_empty() && !prop.is_empty() => Ok((id, prop)),
        _ => Err(IdError::MissingProperty {
            key: key.to_string(),
        }),
    }
}
