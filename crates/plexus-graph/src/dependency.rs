#![forbid(unsafe_code)]

//! Dependency declarations and their validated form.
//!
//! [`Dependency`] is the wire DTO served by the dependencies endpoint;
//! [`CallbackSpec`] is what the graph keeps after validation. The output of a
//! declaration is a single string: `"id.prop"` for one output, or
//! `"..id1.prop1...id2.prop2.."` for several. Pattern ids appear in their
//! canonical JSON form.
//!
//! Validation here is per declaration; overlap with other declarations is
//! checked by the graph builder.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use plexus_core::pattern::{ALLSMALLER, MATCH};
use plexus_core::prop::split_id_and_prop;
use plexus_core::{IdPattern, PatternRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DependencyError, RefSlot};

// ============================================================================
// Wire DTO
// ============================================================================

/// One `{id, property}` reference in an input or state list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RefDecl {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub property: Option<String>,
}

impl RefDecl {
    #[must_use]
    pub fn new(id: Value, property: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            property: Some(property.into()),
        }
    }
}

/// Name of a function in the clientside registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientsideFunction {
    pub namespace: String,
    pub function_name: String,
}

/// A callback registration as served by the dependencies endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dependency {
    pub output: String,
    #[serde(default)]
    pub inputs: Vec<RefDecl>,
    #[serde(default)]
    pub state: Vec<RefDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clientside_function: Option<ClientsideFunction>,
    #[serde(default)]
    pub prevent_initial_call: bool,
}

impl Dependency {
    /// Declaration builder for code-defined graphs; ids are given as JSON.
    #[must_use]
    pub fn new(outputs: &[(Value, &str)]) -> Self {
        let parts: Vec<String> = outputs
            .iter()
            .map(|(id, prop)| format!("{}.{}", id_text(id), prop))
            .collect();
        let output = if parts.len() == 1 {
            parts[0].clone()
        } else {
            format!("..{}..", parts.join("..."))
        };
        Self {
            output,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn input(mut self, id: Value, property: &str) -> Self {
        self.inputs.push(RefDecl::new(id, property));
        self
    }

    #[must_use]
    pub fn state(mut self, id: Value, property: &str) -> Self {
        self.state.push(RefDecl::new(id, property));
        self
    }

    #[must_use]
    pub fn clientside(mut self, namespace: &str, function_name: &str) -> Self {
        self.clientside_function = Some(ClientsideFunction {
            namespace: namespace.to_string(),
            function_name: function_name.to_string(),
        });
        self
    }

    #[must_use]
    pub fn prevent_initial_call(mut self) -> Self {
        self.prevent_initial_call = true;
        self
    }
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => IdPattern::from_json(other).map_or_else(|_| other.to_string(), |p| p.stringify()),
    }
}

/// Split an output string into its `id.prop` parts.
pub fn split_output_string(output: &str) -> Result<Vec<&str>, DependencyError> {
    let malformed = || DependencyError::MalformedOutput {
        output: output.to_string(),
    };
    if output.is_empty() {
        return Err(DependencyError::NoOutputs);
    }
    if let Some(inner) = output.strip_prefix("..") {
        let inner = inner.strip_suffix("..").ok_or_else(malformed)?;
        let parts: Vec<&str> = inner.split("...").collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(malformed());
        }
        Ok(parts)
    } else {
        Ok(vec![output])
    }
}

// ============================================================================
// CallbackSpec
// ============================================================================

/// A validated callback registration.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackSpec {
    /// Position of the declaration in the list it was loaded from.
    pub index: usize,
    /// Canonical output string; unique per accepted registration.
    pub output: String,
    pub outputs: Vec<PatternRef>,
    pub inputs: Vec<PatternRef>,
    pub state: Vec<PatternRef>,
    pub clientside_function: Option<ClientsideFunction>,
    pub prevent_initial_call: bool,
    /// More than one output; the response is a list.
    pub multi_output: bool,
    /// `MATCH` keys shared by every output, sorted.
    pub match_keys: Vec<String>,
    /// First output that resolves to a single id, if any.
    pub first_single_output: Option<usize>,
}

impl CallbackSpec {
    /// Validate one declaration in isolation.
    pub fn from_dependency(index: usize, dep: &Dependency) -> Result<Arc<Self>, DependencyError> {
        let mut outputs = Vec::new();
        for (position, part) in split_output_string(&dep.output)?.into_iter().enumerate() {
            outputs.push(parse_output(part, position)?);
        }
        let inputs = parse_refs(&dep.inputs, RefSlot::Input)?;
        let state = parse_refs(&dep.state, RefSlot::State)?;

        let mut seen = HashSet::new();
        for out in &outputs {
            if !seen.insert(out.key()) {
                return Err(DependencyError::DuplicateOutputInCallback { output: out.key() });
            }
            if out.id.all_smaller_keys().next().is_some() {
                return Err(DependencyError::AllSmallerInOutput { output: out.key() });
            }
        }
        for input in &inputs {
            if input.id.as_dict().is_none() && seen.contains(&input.key()) {
                return Err(DependencyError::InputIsOutput { key: input.key() });
            }
        }

        let match_keys: Vec<String> = outputs[0].id.match_keys().cloned().collect();
        for out in &outputs[1..] {
            let keys: Vec<String> = out.id.match_keys().cloned().collect();
            if keys != match_keys {
                return Err(DependencyError::MismatchedMatchKeys {
                    output: out.key(),
                    expected: match_keys.join(","),
                    found: keys.join(","),
                });
            }
        }
        let bound: BTreeSet<&String> = match_keys.iter().collect();
        for (slot, refs) in [(RefSlot::Input, &inputs), (RefSlot::State, &state)] {
            for r in refs {
                let unbound = r
                    .id
                    .match_keys()
                    .map(|k| (k, MATCH))
                    .chain(r.id.all_smaller_keys().map(|k| (k, ALLSMALLER)))
                    .find(|(k, _)| !bound.contains(k));
                if let Some((key, wildcard)) = unbound {
                    return Err(DependencyError::UnboundWildcard {
                        slot,
                        reference: r.key(),
                        wildcard,
                        key: key.clone(),
                    });
                }
            }
        }

        let multi_output = outputs.len() > 1;
        let first_single_output = outputs.iter().position(|o| !o.is_multi());
        let output = if multi_output {
            let keys: Vec<String> = outputs.iter().map(PatternRef::key).collect();
            format!("..{}..", keys.join("..."))
        } else {
            outputs[0].key()
        };

        Ok(Arc::new(Self {
            index,
            output,
            outputs,
            inputs,
            state,
            clientside_function: dep.clientside_function.clone(),
            prevent_initial_call: dep.prevent_initial_call,
            multi_output,
            match_keys,
            first_single_output,
        }))
    }

    /// Does any ref of this callback use a wildcard?
    #[must_use]
    pub fn has_patterns(&self) -> bool {
        self.outputs
            .iter()
            .chain(&self.inputs)
            .chain(&self.state)
            .any(|r| r.id.as_dict().is_some())
    }

    /// Inputs using `ALL` or `ALLSMALLER`.
    pub fn multi_inputs(&self) -> impl Iterator<Item = &PatternRef> {
        self.inputs.iter().filter(|r| r.is_multi())
    }
}

fn parse_output(part: &str, position: usize) -> Result<PatternRef, DependencyError> {
    let (id, property) = split_id_and_prop(part).map_err(|_| DependencyError::MissingProperty {
        slot: RefSlot::Output,
        position,
    })?;
    let id = IdPattern::parse(id).map_err(|source| DependencyError::MalformedId {
        slot: RefSlot::Output,
        position,
        source,
    })?;
    Ok(PatternRef::new(id, property))
}

fn parse_refs(decls: &[RefDecl], slot: RefSlot) -> Result<Vec<PatternRef>, DependencyError> {
    decls
        .iter()
        .enumerate()
        .map(|(position, decl)| {
            let id = decl
                .id
                .as_ref()
                .filter(|v| !v.is_null())
                .ok_or(DependencyError::MissingId { slot, position })?;
            let property = decl
                .property
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or(DependencyError::MissingProperty { slot, position })?;
            let id = IdPattern::from_json(id).map_err(|source| DependencyError::MalformedId {
                slot,
                position,
                source,
            })?;
            Ok(PatternRef::new(id, property))
        })
        .collect()
}
