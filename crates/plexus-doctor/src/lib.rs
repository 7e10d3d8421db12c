#![forbid(unsafe_code)]

//! Diagnostics for plexus apps.
//!
//! `plexus-doctor lint` reports callback declarations the graph builder
//! rejects, `paths` lists where each identified component sits in a layout,
//! `triggers` explains which callbacks a write to `id.prop` would request,
//! and `check-config` validates an engine config file.

pub mod cli;
pub mod error;
pub mod inspect;

pub use cli::{run, run_from_env};
pub use error::{DoctorError, Result};
