#![forbid(unsafe_code)]

//! Callback dependency graph for plexus.
//!
//! - [`dependency`]: the wire DTO and per-declaration validation.
//! - [`graph`]: the indexed graph of accepted callbacks plus diagnostics for
//!   rejected ones.
//! - [`resolve`]: expansion of registrations into concrete callback
//!   instances against the current path registry.

pub mod dependency;
pub mod error;
pub mod graph;
pub mod resolve;

pub use dependency::{CallbackSpec, ClientsideFunction, Dependency, RefDecl};
pub use error::{DependencyError, GraphDiagnostic, RefSlot};
pub use graph::{CallbackIdx, DependencyGraph, EdgeKind, PatternEntry};
pub use resolve::{ResolvedCallback, ResolvedRef, resolve_from_outputs, resolve_ref};
