#![forbid(unsafe_code)]

//! Read-only inspection of an app's dependency and layout files.
//!
//! Every command writes to a caller-supplied sink so the same code drives
//! the binary and the tests. Findings that should fail a CI step surface
//! as [`DoctorError::Exit`] with code 2.

use std::io::Write;
use std::path::Path;

use plexus_core::prop::split_id_and_prop;
use plexus_core::{ComponentId, PathRegistry, PathSegment};
use plexus_graph::DependencyGraph;
use plexus_runtime::factory::callbacks_by_input;
use plexus_runtime::{ChangeKind, EngineConfig};
use serde::Serialize;
use serde_json::Value;

use crate::error::{DoctorError, Result};

pub const FINDINGS_EXIT_CODE: i32 = 2;

// ============================================================================
// Loading
// ============================================================================

fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(DoctorError::MissingPath {
            path: path.to_path_buf(),
        });
    }
    Ok(std::fs::read_to_string(path)?)
}

fn json_error(path: &Path) -> impl FnOnce(serde_json::Error) -> DoctorError + '_ {
    move |source| DoctorError::Json {
        path: path.to_path_buf(),
        source,
    }
}

pub fn load_graph(path: &Path) -> Result<DependencyGraph> {
    let text = read_file(path)?;
    DependencyGraph::from_json_str(&text).map_err(json_error(path))
}

pub fn load_layout(path: &Path) -> Result<Value> {
    let text = read_file(path)?;
    serde_json::from_str(&text).map_err(json_error(path))
}

/// `props.children.0.props.children.1` style rendering of a layout path.
#[must_use]
pub fn format_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "(root)".to_string();
    }
    path.iter()
        .map(|segment| match segment {
            PathSegment::Key(key) => key.clone(),
            PathSegment::Index(index) => index.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

// ============================================================================
// lint
// ============================================================================

#[derive(Debug, Serialize)]
struct LintFinding {
    index: usize,
    output: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct LintReport {
    accepted: usize,
    rejected: Vec<LintFinding>,
}

/// Report rejected declarations. Exits with code 2 when any are found.
pub fn lint(deps: &Path, json: bool, out: &mut dyn Write) -> Result<()> {
    let graph = load_graph(deps)?;
    let report = LintReport {
        accepted: graph.len(),
        rejected: graph
            .diagnostics()
            .iter()
            .map(|d| LintFinding {
                index: d.index,
                output: d.output.clone(),
                error: d.error.to_string(),
            })
            .collect(),
    };

    if json {
        let text = serde_json::to_string_pretty(&report).map_err(json_error(deps))?;
        writeln!(out, "{text}")?;
    } else {
        for diagnostic in graph.diagnostics() {
            writeln!(out, "rejected {diagnostic}")?;
        }
        writeln!(
            out,
            "{} accepted, {} rejected",
            report.accepted,
            report.rejected.len()
        )?;
    }

    if report.rejected.is_empty() {
        Ok(())
    } else {
        Err(DoctorError::exit(
            FINDINGS_EXIT_CODE,
            format!("{} callback declaration(s) rejected", report.rejected.len()),
        ))
    }
}

// ============================================================================
// edges
// ============================================================================

/// `from -> to  kind  group N` for every graph edge, or those out of `from`.
pub fn edges(deps: &Path, from: Option<&str>, out: &mut dyn Write) -> Result<()> {
    let graph = load_graph(deps)?;
    let mut count = 0usize;
    for (source, target, kind) in graph.edges() {
        if from.is_some_and(|f| f != source) {
            continue;
        }
        let group = graph
            .group_of(target)
            .map_or_else(|| "-".to_string(), |idx| idx.to_string());
        writeln!(out, "{source} -> {target}\t{}\tgroup {group}", kind.as_str())?;
        count += 1;
    }
    if count == 0 {
        match from {
            Some(key) => writeln!(out, "nothing depends on {key}")?,
            None => writeln!(out, "no edges")?,
        }
    }
    Ok(())
}

// ============================================================================
// paths
// ============================================================================

/// Every identified component and where it sits, sorted by id.
pub fn paths(layout: &Path, out: &mut dyn Write) -> Result<()> {
    let registry = PathRegistry::from_layout(&load_layout(layout)?);
    let mut rows: Vec<(String, String)> = registry
        .iter()
        .map(|(id, path)| (id.stringify(), format_path(path)))
        .collect();
    rows.sort();
    for (id, path) in rows {
        writeln!(out, "{id}\t{path}")?;
    }
    Ok(())
}

// ============================================================================
// triggers
// ============================================================================

/// Callback instances a user write to `key` would request.
pub fn triggers(deps: &Path, layout: &Path, key: &str, out: &mut dyn Write) -> Result<()> {
    let (id, property) = split_id_and_prop(key)?;
    let id = ComponentId::parse(id)?;
    let graph = load_graph(deps)?;
    let registry = PathRegistry::from_layout(&load_layout(layout)?);
    if !registry.contains(&id) {
        return Err(DoctorError::invalid(format!("{id} is not in the layout")));
    }

    let candidates = callbacks_by_input(&graph, &registry, &id, property, ChangeKind::Direct);
    if candidates.is_empty() {
        writeln!(out, "no callbacks read {key}")?;
    }
    for candidate in candidates {
        writeln!(out, "{}", candidate.resolved.resolved_id())?;
    }
    Ok(())
}

// ============================================================================
// check-config
// ============================================================================

/// Load an engine config (`.toml`, otherwise JSON) and list its problems.
pub fn check_config(path: &Path, out: &mut dyn Write) -> Result<()> {
    if !path.exists() {
        return Err(DoctorError::MissingPath {
            path: path.to_path_buf(),
        });
    }
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => EngineConfig::from_toml_file(path)?,
        _ => EngineConfig::from_json_file(path)?,
    };
    let problems = config.validate();
    for problem in &problems {
        writeln!(out, "{problem}")?;
    }
    if problems.is_empty() {
        writeln!(out, "ok: update url {}", config.update_url())?;
        Ok(())
    } else {
        Err(DoctorError::exit(
            FINDINGS_EXIT_CODE,
            format!("{} config problem(s)", problems.len()),
        ))
    }
}
