#![forbid(unsafe_code)]

//! Core data model for plexus.
//!
//! - [`id`]: component identifiers and their canonical string form.
//! - [`pattern`]: wildcard id patterns (`MATCH`, `ALL`, `ALLSMALLER`) and the
//!   anchored unifier.
//! - [`prop`]: `(id, property)` references and `id.prop` keys.
//! - [`paths`]: the path registry mapping ids to layout locations.
//! - [`layout`]: the layout store trait and an in-memory JSON implementation.

pub mod error;
pub mod id;
pub mod layout;
pub mod paths;
pub mod pattern;
pub mod prop;

pub use error::IdError;
pub use id::{ComponentId, DictId, IdValue};
pub use layout::{JsonLayout, LayoutStore, UpdateSource};
pub use paths::{LayoutPath, PathRegistry, PathSegment};
pub use pattern::{Anchor, DictPattern, IdPattern, Matcher, PatternRef};
pub use prop::PropertyRef;
