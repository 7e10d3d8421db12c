#![forbid(unsafe_code)]

//! Callback factory: which callbacks a change or a new subtree requests.
//!
//! [`callbacks_by_input`] answers "what reads `id.prop`?", with pattern
//! inputs anchored on the changed id so only consistent instances fire.
//! [`layout_callbacks`] answers "what should run now that this subtree is
//! rendered?" for startup and for component-valued outputs.
//!
//! Both return [`Candidate`]s in discovery order with duplicates merged by
//! resolved id. Lineage and execution group are attached by the caller.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use plexus_core::paths::{component_id, crawl_layout, path_starts_with};
use plexus_core::pattern::id_matches;
use plexus_core::prop::combine_id_and_prop;
use plexus_core::{Anchor, ComponentId, PathRegistry, PathSegment};
use plexus_graph::{DependencyGraph, ResolvedCallback, resolve_from_outputs};
use serde_json::Value;

use crate::callback::{Callback, ChangeKind, ExecutionGroup, merge_change};

/// A callback that should be requested, before lineage is attached.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub resolved: ResolvedCallback,
    pub changed_prop_ids: BTreeMap<String, ChangeKind>,
    pub initial_call: bool,
}

impl Candidate {
    fn new(resolved: ResolvedCallback) -> Self {
        Self {
            resolved,
            changed_prop_ids: BTreeMap::new(),
            initial_call: false,
        }
    }

    #[must_use]
    pub fn into_callback(self, predecessors: Vec<String>, group: ExecutionGroup) -> Callback {
        let mut cb = Callback::new(self.resolved).with_lineage(predecessors, group);
        cb.changed_prop_ids = self.changed_prop_ids;
        cb.initial_call = self.initial_call;
        cb
    }
}

/// Candidates merged by resolved id, in first-seen order.
#[derive(Debug, Default)]
struct CandidateSet {
    items: Vec<Candidate>,
    index: HashMap<String, usize>,
}

impl CandidateSet {
    fn add(&mut self, candidate: Candidate) {
        let key = candidate.resolved.resolved_id().to_string();
        match self.index.get(&key) {
            Some(&i) => {
                let existing = &mut self.items[i];
                for (prop, kind) in candidate.changed_prop_ids {
                    merge_change(&mut existing.changed_prop_ids, &prop, kind);
                }
                existing.initial_call |= candidate.initial_call;
            }
            None => {
                self.index.insert(key, self.items.len());
                self.items.push(candidate);
            }
        }
    }
}

/// Callbacks that read `id.property`, marked with `change`.
///
/// Only complete instances (every single reference resolvable) are returned.
#[must_use]
pub fn callbacks_by_input(
    graph: &DependencyGraph,
    paths: &PathRegistry,
    id: &ComponentId,
    property: &str,
    change: ChangeKind,
) -> Vec<Candidate> {
    let key = combine_id_and_prop(&id.stringify(), property);
    let mut found = CandidateSet::default();
    let mut push = |resolved: ResolvedCallback| {
        if !resolved.is_complete(paths) {
            return;
        }
        let mut candidate = Candidate::new(resolved);
        candidate.changed_prop_ids.insert(key.clone(), change);
        found.add(candidate);
    };
    match id {
        ComponentId::Plain(s) => {
            for &idx in graph.plain_readers(s, property) {
                let spec = &graph.callbacks()[idx];
                resolve_from_outputs(spec, paths, None).into_iter().for_each(&mut push);
            }
        }
        ComponentId::Dict(d) => {
            for entry in graph.input_patterns(&d.key_set(), property) {
                if !id_matches(&entry.pattern, d, None) {
                    continue;
                }
                let trigger = Anchor::new(d.clone(), entry.pattern.clone());
                let spec = &graph.callbacks()[entry.callback];
                resolve_from_outputs(spec, paths, Some(&trigger))
                    .into_iter()
                    .for_each(&mut push);
            }
        }
    }
    found.items
}

/// How [`layout_callbacks`] selects callbacks.
#[derive(Debug, Clone, Default)]
pub struct LayoutCallbackOptions {
    /// Only callbacks with an output in the chunk (startup).
    pub outputs_only: bool,
    /// Only callbacks whose `ALL`-style inputs listed a component of the
    /// chunk. Used with the pre-removal path registry.
    pub removed_array_inputs_only: bool,
    /// Where the chunk is mounted. Input-triggered callbacks whose outputs
    /// all live inside it are skipped; their outputs are initial-called.
    pub chunk_path: Option<Vec<PathSegment>>,
}

/// Callbacks to request for a newly rendered (or removed) subtree.
///
/// Tree pre-order. Inputs that are outputs of another callback in the result
/// are `Indirect`, all others `Direct`.
#[must_use]
pub fn layout_callbacks(
    graph: &DependencyGraph,
    paths: &PathRegistry,
    chunk: &Value,
    options: &LayoutCallbackOptions,
) -> Vec<Candidate> {
    let mut found = CandidateSet::default();
    crawl_layout(chunk, &mut Vec::new(), &mut |component, _| {
        let Some(id) = component_id(component) else {
            return;
        };
        if options.removed_array_inputs_only {
            add_removed_array_readers(graph, paths, &id, &mut found);
            return;
        }
        add_initial_calls(graph, paths, &id, &mut found);
        if !options.outputs_only {
            add_input_readers(graph, paths, &id, options.chunk_path.as_deref(), &mut found);
        }
    });

    if !options.removed_array_inputs_only {
        mark_changes(paths, &mut found.items);
    }
    found.items
}

fn add_initial_calls(graph: &DependencyGraph, paths: &PathRegistry, id: &ComponentId, found: &mut CandidateSet) {
    let mut add = |resolved: ResolvedCallback| {
        if resolved.spec().prevent_initial_call || !resolved.is_complete(paths) {
            return;
        }
        let mut candidate = Candidate::new(resolved);
        candidate.initial_call = true;
        found.add(candidate);
    };
    match id {
        ComponentId::Plain(s) => {
            let owners: Vec<usize> = graph.plain_output_props(s).map(|(_, idx)| idx).collect();
            for idx in owners {
                add(ResolvedCallback::new(Arc::clone(&graph.callbacks()[idx]), None));
            }
        }
        ComponentId::Dict(d) => {
            for (_, entries) in graph.output_patterns_for(&d.key_set()) {
                for entry in entries {
                    if id_matches(&entry.pattern, d, None) {
                        let spec = Arc::clone(&graph.callbacks()[entry.callback]);
                        add(ResolvedCallback::anchored_at(spec, &entry.pattern, d));
                    }
                }
            }
        }
    }
}

fn input_props(graph: &DependencyGraph, id: &ComponentId) -> Vec<String> {
    match id {
        ComponentId::Plain(s) => graph.plain_input_props(s).cloned().collect(),
        ComponentId::Dict(d) => graph
            .input_patterns_for(&d.key_set())
            .filter(|(_, entries)| entries.iter().any(|e| id_matches(&e.pattern, d, None)))
            .map(|(prop, _)| prop.clone())
            .collect(),
    }
}

fn add_input_readers(
    graph: &DependencyGraph,
    paths: &PathRegistry,
    id: &ComponentId,
    chunk_path: Option<&[PathSegment]>,
    found: &mut CandidateSet,
) {
    for prop in input_props(graph, id) {
        for candidate in callbacks_by_input(graph, paths, id, &prop, ChangeKind::Direct) {
            if let Some(chunk) = chunk_path {
                let outputs = candidate.resolved.outputs(paths);
                let all_inside = outputs
                    .iter()
                    .flatten()
                    .all(|r| path_starts_with(&r.path, chunk));
                if all_inside {
                    continue;
                }
            }
            found.add(Candidate {
                changed_prop_ids: BTreeMap::new(),
                ..candidate
            });
        }
    }
}

fn add_removed_array_readers(graph: &DependencyGraph, paths: &PathRegistry, id: &ComponentId, found: &mut CandidateSet) {
    let ComponentId::Dict(_) = id else {
        return;
    };
    for prop in input_props(graph, id) {
        let key = combine_id_and_prop(&id.stringify(), &prop);
        for candidate in callbacks_by_input(graph, paths, id, &prop, ChangeKind::Direct) {
            let listed = candidate
                .resolved
                .spec()
                .inputs
                .iter()
                .zip(candidate.resolved.inputs(paths))
                .any(|(decl, refs)| decl.is_multi() && refs.iter().any(|r| r.key() == key));
            if listed {
                found.add(candidate);
            }
        }
    }
}

fn mark_changes(paths: &PathRegistry, candidates: &mut [Candidate]) {
    let outputs: Vec<_> = candidates
        .iter()
        .map(|c| c.resolved.output_keys(paths))
        .collect();
    for (i, candidate) in candidates.iter_mut().enumerate() {
        for key in candidate.resolved.input_keys(paths) {
            let produced_elsewhere = outputs
                .iter()
                .enumerate()
                .any(|(j, outs)| j != i && outs.contains(&key));
            let kind = if produced_elsewhere {
                ChangeKind::Indirect
            } else {
                ChangeKind::Direct
            };
            merge_change(&mut candidate.changed_prop_ids, &key, kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::DictId;
    use plexus_graph::Dependency;
    use serde_json::json;

    fn chain_graph() -> DependencyGraph {
        DependencyGraph::build(&[
            Dependency::new(&[(json!("b"), "value")]).input(json!("a"), "value"),
            Dependency::new(&[(json!("c"), "value")]).input(json!("b"), "value"),
            Dependency::new(&[(json!("d"), "value")])
                .input(json!("c"), "value")
                .prevent_initial_call(),
        ])
    }

    fn flat(ids: &[&str]) -> Value {
        let children: Vec<Value> = ids
            .iter()
            .map(|id| json!({"type": "Input", "props": {"id": id, "value": 0}}))
            .collect();
        json!({"type": "Div", "props": {"id": "root", "children": children}})
    }

    #[test]
    fn plain_input_finds_reader() {
        let graph = chain_graph();
        let paths = PathRegistry::from_layout(&flat(&["a", "b", "c", "d"]));
        let found = callbacks_by_input(&graph, &paths, &"a".into(), "value", ChangeKind::Direct);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resolved.resolved_id(), "b.value");
        assert_eq!(found[0].changed_prop_ids["a.value"], ChangeKind::Direct);
    }

    #[test]
    fn match_all_input_spans_only_rows_sharing_the_bound_key() {
        let graph = DependencyGraph::build(&[Dependency::new(&[(json!({"t": "sum", "a": ["MATCH"]}), "children")])
            .input(json!({"a": ["MATCH"], "b": ["ALL"]}), "value")]);
        let layout = json!({"type": "Div", "props": {"children": [
            {"type": "Input", "props": {"id": {"a": 1, "b": 1}, "value": 0}},
            {"type": "Input", "props": {"id": {"a": 1, "b": 2}, "value": 0}},
            {"type": "Input", "props": {"id": {"a": 2, "b": 1}, "value": 0}},
            {"type": "Div", "props": {"id": {"t": "sum", "a": 1}}},
            {"type": "Div", "props": {"id": {"t": "sum", "a": 2}}}
        ]}});
        let paths = PathRegistry::from_layout(&layout);
        let changed: ComponentId = DictId::of([("a", 1), ("b", 1)]).into();

        let found = callbacks_by_input(&graph, &paths, &changed, "value", ChangeKind::Direct);
        assert_eq!(found.len(), 1);
        let inputs: Vec<String> = found[0].resolved.inputs(&paths)[0]
            .iter()
            .map(|r| r.id.stringify())
            .collect();
        assert_eq!(inputs, vec![r#"{"a":1,"b":1}"#.to_string(), r#"{"a":1,"b":2}"#.to_string()]);
        assert_eq!(found[0].resolved.output_keys(&paths).len(), 1);
        assert!(found[0].resolved.output_keys(&paths).contains(r#"{"a":1,"t":"sum"}.children"#));
    }

    #[test]
    fn missing_output_component_yields_nothing() {
        let graph = chain_graph();
        let paths = PathRegistry::from_layout(&flat(&["a"]));
        assert!(callbacks_by_input(&graph, &paths, &"a".into(), "value", ChangeKind::Direct).is_empty());
    }

    #[test]
    fn initial_layout_marks_chained_inputs_indirect() {
        let graph = chain_graph();
        let layout = flat(&["a", "b", "c", "d"]);
        let paths = PathRegistry::from_layout(&layout);
        let options = LayoutCallbackOptions {
            outputs_only: true,
            ..LayoutCallbackOptions::default()
        };
        let found = layout_callbacks(&graph, &paths, &layout, &options);
        let ids: Vec<&str> = found.iter().map(|c| c.resolved.resolved_id()).collect();
        assert_eq!(ids, vec!["b.value", "c.value"], "prevent_initial_call is honoured");
        assert!(found.iter().all(|c| c.initial_call));
        assert_eq!(found[0].changed_prop_ids["a.value"], ChangeKind::Direct);
        assert_eq!(found[1].changed_prop_ids["b.value"], ChangeKind::Indirect);
    }

    #[test]
    fn new_chunk_fires_readers_outside_it() {
        let graph = DependencyGraph::build(&[
            Dependency::new(&[(json!("summary"), "children")])
                .input(json!({"type": "row", "index": ["ALL"]}), "value"),
        ]);
        let layout = json!({"type": "Div", "props": {"id": "root", "children": [
            {"type": "Div", "props": {"id": "summary"}},
            {"type": "Div", "props": {"id": "rows", "children": [
                {"type": "Input", "props": {"id": {"type": "row", "index": 0}, "value": 1}}
            ]}}
        ]}});
        let paths = PathRegistry::from_layout(&layout);
        let chunk_path = vec![
            PathSegment::key("props"),
            PathSegment::key("children"),
            PathSegment::Index(1),
            PathSegment::key("props"),
            PathSegment::key("children"),
        ];
        let chunk = &layout["props"]["children"][1]["props"]["children"];
        let found = layout_callbacks(
            &graph,
            &paths,
            chunk,
            &LayoutCallbackOptions {
                chunk_path: Some(chunk_path),
                ..LayoutCallbackOptions::default()
            },
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resolved.resolved_id(), "summary.children");
        assert!(!found[0].initial_call);
        assert_eq!(
            found[0].changed_prop_ids[r#"{"index":0,"type":"row"}.value"#],
            ChangeKind::Direct
        );
    }

    #[test]
    fn removed_rows_refire_all_readers() {
        let graph = DependencyGraph::build(&[
            Dependency::new(&[(json!("summary"), "children")])
                .input(json!({"type": "row", "index": ["ALL"]}), "value"),
        ]);
        let layout = json!({"type": "Div", "props": {"id": "root", "children": [
            {"type": "Div", "props": {"id": "summary"}},
            {"type": "Input", "props": {"id": {"type": "row", "index": 0}, "value": 1}}
        ]}});
        let old_paths = PathRegistry::from_layout(&layout);
        let removed = &layout["props"]["children"][1];
        let found = layout_callbacks(
            &graph,
            &old_paths,
            removed,
            &LayoutCallbackOptions {
                removed_array_inputs_only: true,
                ..LayoutCallbackOptions::default()
            },
        );
        assert_eq!(found.len(), 1);
        assert!(!found[0].initial_call);
    }
}
