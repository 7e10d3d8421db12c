#![forbid(unsafe_code)]

//! Dependency graph builder.
//!
//! [`DependencyGraph::build`] validates every declaration, rejects the bad
//! ones with a [`GraphDiagnostic`], and indexes the accepted callbacks:
//!
//! | Index             | Key                               | Value                 |
//! |-------------------|-----------------------------------|-----------------------|
//! | `input_map`       | plain id → property               | callbacks reading it  |
//! | `output_map`      | plain id → property               | owning callback       |
//! | `input_patterns`  | key set → property                | pattern + callback    |
//! | `output_patterns` | key set → property                | pattern + callback    |
//! | `input_graph`     | input/state node key              | output key + edge kind|
//! | `output_groups`   | output node key                   | owning callback       |
//!
//! Pattern references are stored as patterns; they are expanded against the
//! path registry only when a callback is resolved. `input_graph` records
//! state reads as [`EdgeKind::State`] edges so they show up in the graph,
//! but only [`EdgeKind::Input`] edges are triggering.
//!
//! # Invariants
//!
//! 1. An output node (plain key, or overlapping pattern) has one owner.
//! 2. Rejected declarations leave no trace in any index.
//! 3. Callback handles ([`CallbackIdx`]) are positions into `callbacks()`.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use plexus_core::pattern::{DictPattern, id_matches, patterns_overlap};
use plexus_core::{ComponentId, IdPattern, PatternRef};
use tracing::{debug, warn};

use crate::dependency::{CallbackSpec, Dependency};
use crate::error::{DependencyError, GraphDiagnostic};

/// Handle to an accepted callback.
pub type CallbackIdx = usize;

/// How a node feeds an output node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    /// A change to the node requests the owning callback.
    Input,
    /// The node is read when the callback runs but never requests it.
    State,
}

impl EdgeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::State => "state",
        }
    }
}

/// A pattern registration under a key set and property.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternEntry {
    pub pattern: DictPattern,
    pub callback: CallbackIdx,
}

type PlainIndex<T> = AHashMap<String, AHashMap<String, T>>;
type PatternIndex = AHashMap<String, AHashMap<String, Vec<PatternEntry>>>;

/// The validated, indexed set of callbacks.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    callbacks: Vec<Arc<CallbackSpec>>,
    input_map: PlainIndex<Vec<CallbackIdx>>,
    output_map: PlainIndex<CallbackIdx>,
    input_patterns: PatternIndex,
    output_patterns: PatternIndex,
    input_graph: BTreeMap<String, BTreeMap<String, EdgeKind>>,
    output_groups: AHashMap<String, CallbackIdx>,
    diagnostics: Vec<GraphDiagnostic>,
}

impl DependencyGraph {
    /// Validate and index `deps`. Bad declarations are skipped, never fatal.
    #[must_use]
    pub fn build(deps: &[Dependency]) -> Self {
        let mut graph = Self::default();
        for (index, dep) in deps.iter().enumerate() {
            let accepted = CallbackSpec::from_dependency(index, dep)
                .and_then(|spec| graph.check_ownership(&spec).map(|()| spec));
            match accepted {
                Ok(spec) => graph.insert(spec),
                Err(error) => {
                    warn!(
                        target: "plexus.graph",
                        index,
                        output = %dep.output,
                        %error,
                        "rejected callback declaration"
                    );
                    graph.diagnostics.push(GraphDiagnostic {
                        index,
                        output: dep.output.clone(),
                        error,
                    });
                }
            }
        }
        debug!(
            target: "plexus.graph",
            accepted = graph.callbacks.len(),
            rejected = graph.diagnostics.len(),
            "dependency graph built"
        );
        graph
    }

    /// Parse the dependencies endpoint payload and build.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let deps: Vec<Dependency> = serde_json::from_str(text)?;
        Ok(Self::build(&deps))
    }

    fn check_ownership(&self, spec: &CallbackSpec) -> Result<(), DependencyError> {
        for out in &spec.outputs {
            if let Some(owner) = self.find_output_owner(out) {
                return Err(DependencyError::DuplicateOutput {
                    output: out.key(),
                    owner: self.callbacks[owner].output.clone(),
                });
            }
        }
        Ok(())
    }

    fn find_output_owner(&self, out: &PatternRef) -> Option<CallbackIdx> {
        match &out.id {
            IdPattern::Plain(id) => self
                .output_map
                .get(id)
                .and_then(|props| props.get(&out.property))
                .copied(),
            IdPattern::Dict(pattern) => {
                let key_set = out.id.key_set()?;
                self.output_patterns
                    .get(&key_set)
                    .and_then(|props| props.get(&out.property))
                    .and_then(|entries| {
                        entries
                            .iter()
                            .find(|e| patterns_overlap(&e.pattern, pattern))
                            .map(|e| e.callback)
                    })
            }
        }
    }

    fn insert(&mut self, spec: Arc<CallbackSpec>) {
        let idx = self.callbacks.len();
        for out in &spec.outputs {
            self.output_groups.insert(out.key(), idx);
            match &out.id {
                IdPattern::Plain(id) => {
                    self.output_map
                        .entry(id.clone())
                        .or_default()
                        .insert(out.property.clone(), idx);
                }
                IdPattern::Dict(pattern) => {
                    push_pattern(&mut self.output_patterns, out, pattern, idx);
                }
            }
        }
        for input in spec.inputs.iter() {
            match &input.id {
                IdPattern::Plain(id) => {
                    let readers = self
                        .input_map
                        .entry(id.clone())
                        .or_default()
                        .entry(input.property.clone())
                        .or_default();
                    if !readers.contains(&idx) {
                        readers.push(idx);
                    }
                }
                IdPattern::Dict(pattern) => {
                    push_pattern(&mut self.input_patterns, input, pattern, idx);
                }
            }
            self.add_edges(input, &spec.outputs, EdgeKind::Input);
        }
        for state in spec.state.iter() {
            self.add_edges(state, &spec.outputs, EdgeKind::State);
        }
        self.callbacks.push(spec);
    }

    /// A ref that is both input and state keeps its `Input` edge.
    fn add_edges(&mut self, from: &PatternRef, outputs: &[PatternRef], kind: EdgeKind) {
        let dependents = self.input_graph.entry(from.key()).or_default();
        for out in outputs {
            dependents
                .entry(out.key())
                .and_modify(|k| *k = (*k).min(kind))
                .or_insert(kind);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[must_use]
    pub fn callbacks(&self) -> &[Arc<CallbackSpec>] {
        &self.callbacks
    }

    #[must_use]
    pub fn callback(&self, idx: CallbackIdx) -> Option<&Arc<CallbackSpec>> {
        self.callbacks.get(idx)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[GraphDiagnostic] {
        &self.diagnostics
    }

    /// Callbacks reading `id.property` for a plain id.
    #[must_use]
    pub fn plain_readers(&self, id: &str, property: &str) -> &[CallbackIdx] {
        self.input_map
            .get(id)
            .and_then(|props| props.get(property))
            .map_or(&[], Vec::as_slice)
    }

    /// Properties of a plain id that some callback reads.
    pub fn plain_input_props(&self, id: &str) -> impl Iterator<Item = &String> {
        self.input_map.get(id).into_iter().flat_map(|props| props.keys())
    }

    /// Owner of `id.property` for a plain id.
    #[must_use]
    pub fn plain_owner(&self, id: &str, property: &str) -> Option<CallbackIdx> {
        self.output_map
            .get(id)
            .and_then(|props| props.get(property))
            .copied()
    }

    /// `(property, owner)` for every output prop of a plain id.
    pub fn plain_output_props(&self, id: &str) -> impl Iterator<Item = (&String, CallbackIdx)> {
        self.output_map
            .get(id)
            .into_iter()
            .flat_map(|props| props.iter().map(|(p, idx)| (p, *idx)))
    }

    /// Input patterns registered for `key_set.property`.
    #[must_use]
    pub fn input_patterns(&self, key_set: &str, property: &str) -> &[PatternEntry] {
        lookup_patterns(&self.input_patterns, key_set, property)
    }

    /// Output patterns registered for `key_set.property`.
    #[must_use]
    pub fn output_patterns(&self, key_set: &str, property: &str) -> &[PatternEntry] {
        lookup_patterns(&self.output_patterns, key_set, property)
    }

    /// `(property, entries)` of every input pattern under a key set.
    pub fn input_patterns_for(&self, key_set: &str) -> impl Iterator<Item = (&String, &[PatternEntry])> {
        self.input_patterns
            .get(key_set)
            .into_iter()
            .flat_map(|props| props.iter().map(|(p, e)| (p, e.as_slice())))
    }

    /// `(property, entries)` of every output pattern under a key set.
    pub fn output_patterns_for(&self, key_set: &str) -> impl Iterator<Item = (&String, &[PatternEntry])> {
        self.output_patterns
            .get(key_set)
            .into_iter()
            .flat_map(|props| props.iter().map(|(p, e)| (p, e.as_slice())))
    }

    /// Output node keys fed by a node key, with the kind of each edge.
    pub fn dependents(&self, node_key: &str) -> impl Iterator<Item = (&str, EdgeKind)> {
        self.input_graph
            .get(node_key)
            .into_iter()
            .flat_map(|outs| outs.iter().map(|(out, kind)| (out.as_str(), *kind)))
    }

    /// Output node keys that a change to `node_key` requests.
    pub fn triggered_by(&self, node_key: &str) -> impl Iterator<Item = &str> {
        self.dependents(node_key)
            .filter(|(_, kind)| *kind == EdgeKind::Input)
            .map(|(out, _)| out)
    }

    /// Every `(from, to, kind)` edge, ordered by source then target key.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, EdgeKind)> {
        self.input_graph.iter().flat_map(|(from, outs)| {
            outs.iter()
                .map(move |(to, kind)| (from.as_str(), to.as_str(), *kind))
        })
    }

    /// The registration that owns an output node key.
    #[must_use]
    pub fn group_of(&self, output_key: &str) -> Option<CallbackIdx> {
        self.output_groups.get(output_key).copied()
    }

    /// Is `id.property` written by some callback?
    #[must_use]
    pub fn is_output(&self, id: &ComponentId, property: &str) -> bool {
        match id {
            ComponentId::Plain(s) => self.plain_owner(s, property).is_some(),
            ComponentId::Dict(d) => self
                .output_patterns(&d.key_set(), property)
                .iter()
                .any(|e| id_matches(&e.pattern, d, None)),
        }
    }
}

fn push_pattern(index: &mut PatternIndex, r: &PatternRef, pattern: &DictPattern, callback: CallbackIdx) {
    let Some(key_set) = r.id.key_set() else {
        return;
    };
    index
        .entry(key_set)
        .or_default()
        .entry(r.property.clone())
        .or_default()
        .push(PatternEntry {
            pattern: pattern.clone(),
            callback,
        });
}

fn lookup_patterns<'a>(index: &'a PatternIndex, key_set: &str, property: &str) -> &'a [PatternEntry] {
    index
        .get(key_set)
        .and_then(|props| props.get(property))
        .map_or(&[], Vec::as_slice)
}
