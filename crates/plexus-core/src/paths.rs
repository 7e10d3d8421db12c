#![forbid(unsafe_code)]

//! Path registry: component id to location in the layout tree.
//!
//! The layout is a JSON tree. A *component* is an object carrying a `props`
//! object; its id, when present, lives at `props.id`. Children are reached
//! through any prop holding a component or an array, most commonly
//! `props.children`. A component's [`LayoutPath`] addresses the component
//! object itself, so its props live under `path + ["props"]`.
//!
//! # Invariants
//!
//! 1. After [`PathRegistry::compute_paths`] every id present in the crawled
//!    subtree maps to its current path.
//! 2. Entries whose path lies under the recomputed prefix and which are no
//!    longer present are removed.
//! 3. Entries outside the recomputed prefix keep their previous
//!    `Arc<[PathSegment]>` allocation, so callers holding a path see no churn.
//! 4. Crawling is pre-order: a parent is visited before its descendants and
//!    siblings in array order.
//! 5. Each path holds at most one id and each id at most one path.
//! 6. A recompute touches only the entries under its prefix and the new
//!    subtree; the rest of the registry is never visited or copied.
//!
//! # Failure Modes
//!
//! | Condition                      | Behavior                           |
//! |--------------------------------|------------------------------------|
//! | Malformed `props.id`           | Node is registered without an id   |
//! | Duplicate id in one layout     | Last occurrence in pre-order wins  |
//! | Non-component values           | Ignored; never descended into      |

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use ahash::AHashMap;
use serde::Serialize;
use serde_json::Value;

use crate::id::{ComponentId, DictId};

/// One step into the layout tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    #[must_use]
    pub fn key(name: &str) -> Self {
        Self::Key(name.to_string())
    }
}

/// Location of a component object, shared cheaply with callers holding it.
pub type LayoutPath = Arc<[PathSegment]>;

/// `path` followed by `["props", prop]`: where a prop value lives.
#[must_use]
pub fn prop_path(path: &[PathSegment], prop: &str) -> Vec<PathSegment> {
    let mut out = path.to_vec();
    out.push(PathSegment::key("props"));
    out.push(PathSegment::key(prop));
    out
}

#[must_use]
pub fn path_starts_with(path: &[PathSegment], prefix: &[PathSegment]) -> bool {
    path.len() >= prefix.len() && path[..prefix.len()] == *prefix
}

/// A component object: an object whose `props` member is itself an object.
#[must_use]
pub fn is_component(value: &Value) -> bool {
    value.get("props").is_some_and(Value::is_object)
}

/// True when `value` is or contains a component (arrays are searched).
#[must_use]
pub fn contains_components(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(contains_components),
        other => is_component(other),
    }
}

/// Pre-order walk over every component in `value`.
///
/// `path` is the location of `value`; it is restored before returning.
pub fn crawl_layout<F>(value: &Value, path: &mut Vec<PathSegment>, visit: &mut F)
where
    F: FnMut(&Value, &[PathSegment]),
{
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(PathSegment::Index(i));
                crawl_layout(item, path, visit);
                path.pop();
            }
        }
        Value::Object(_) if is_component(value) => {
            visit(value, path);
            if let Some(Value::Object(props)) = value.get("props") {
                for (name, child) in props {
                    if !(child.is_array() || is_component(child)) {
                        continue;
                    }
                    path.push(PathSegment::key("props"));
                    path.push(PathSegment::key(name));
                    crawl_layout(child, path, visit);
                    path.pop();
                    path.pop();
                }
            }
        }
        _ => {}
    }
}

/// The `props.id` of a component, if present and well formed.
#[must_use]
pub fn component_id(component: &Value) -> Option<ComponentId> {
    let raw = component.get("props")?.get("id")?;
    ComponentId::from_json(raw).ok()
}

/// Mapping from component id to layout path.
///
/// `by_path` is the authoritative table, ordered so every path under a
/// prefix forms one contiguous range. `plain` and `dicts` answer id lookups
/// and `key_sets` holds the per-key-set index that wildcard expansion walks.
#[derive(Debug, Clone, Default)]
pub struct PathRegistry {
    by_path: BTreeMap<LayoutPath, ComponentId>,
    plain: AHashMap<String, LayoutPath>,
    dicts: AHashMap<DictId, LayoutPath>,
    key_sets: AHashMap<String, BTreeMap<LayoutPath, DictId>>,
}

impl PathRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for a whole layout tree.
    #[must_use]
    pub fn from_layout(layout: &Value) -> Self {
        let mut registry = Self::new();
        registry.compute_paths(layout, &[]);
        registry
    }

    /// Recompute the registry for `subtree`, mounted at `starting_path`.
    ///
    /// Work is proportional to the entries previously under `starting_path`
    /// plus the size of `subtree`; the rest of the registry is not visited.
    pub fn compute_paths(&mut self, subtree: &Value, starting_path: &[PathSegment]) {
        self.remove_under(starting_path);
        let mut path = starting_path.to_vec();
        crawl_layout(subtree, &mut path, &mut |component, at| {
            if let Some(id) = component_id(component) {
                self.insert(id, Arc::from(at));
            }
        });
    }

    #[must_use]
    pub fn get_path(&self, id: &ComponentId) -> Option<&LayoutPath> {
        match id {
            ComponentId::Plain(s) => self.plain.get(s),
            ComponentId::Dict(d) => self.dicts.get(d),
        }
    }

    #[must_use]
    pub fn contains(&self, id: &ComponentId) -> bool {
        self.get_path(id).is_some()
    }

    /// Every dict id registered under `key_set` (sorted keys joined by ','),
    /// in layout pre-order.
    pub fn dict_entries(&self, key_set: &str) -> impl Iterator<Item = (&DictId, &LayoutPath)> + '_ {
        self.key_sets
            .get(key_set)
            .into_iter()
            .flat_map(|bucket| bucket.iter().map(|(path, id)| (id, path)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// All registered ids with their paths, in layout pre-order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &LayoutPath)> + '_ {
        self.by_path.iter().map(|(path, id)| (id.clone(), path))
    }

    fn insert(&mut self, id: ComponentId, path: LayoutPath) {
        // Last occurrence wins: drop the id's earlier location first.
        if let Some(previous) = self.get_path(&id).cloned() {
            self.remove_entry(&previous);
        }
        self.remove_entry(&path);
        match &id {
            ComponentId::Plain(s) => {
                self.plain.insert(s.clone(), Arc::clone(&path));
            }
            ComponentId::Dict(d) => {
                self.key_sets
                    .entry(d.key_set())
                    .or_default()
                    .insert(Arc::clone(&path), d.clone());
                self.dicts.insert(d.clone(), Arc::clone(&path));
            }
        }
        self.by_path.insert(path, id);
    }

    fn remove_entry(&mut self, path: &LayoutPath) {
        let Some(id) = self.by_path.remove(path) else {
            return;
        };
        match id {
            ComponentId::Plain(s) => {
                self.plain.remove(&s);
            }
            ComponentId::Dict(d) => {
                self.dicts.remove(&d);
                let key_set = d.key_set();
                if let Some(bucket) = self.key_sets.get_mut(&key_set) {
                    bucket.remove(path);
                    if bucket.is_empty() {
                        self.key_sets.remove(&key_set);
                    }
                }
            }
        }
    }

    fn remove_under(&mut self, prefix: &[PathSegment]) {
        if prefix.is_empty() {
            self.by_path.clear();
            self.plain.clear();
            self.dicts.clear();
            self.key_sets.clear();
            return;
        }
        let doomed: Vec<LayoutPath> = self
            .by_path
            .range::<[PathSegment], _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(path, _)| path)
            .take_while(|path| path_starts_with(path, prefix))
            .cloned()
            .collect();
        for path in &doomed {
            self.remove_entry(path);
        }
    }
}
