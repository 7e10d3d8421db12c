#![forbid(unsafe_code)]

//! Resolution of callback registrations into concrete callback instances.
//!
//! A registration with `MATCH` keys produces one instance per distinct
//! binding of those keys among the outputs currently in the layout. The
//! binding is the instance's [`Anchor`]: a concrete output id together with
//! its pattern. All of the instance's references are resolved relative to
//! that anchor, so `MATCH` inputs bind to the same values and `ALLSMALLER`
//! inputs select strictly smaller ones.
//!
//! The *resolved id* of an instance is the canonical output string followed
//! by the JSON array of its `MATCH` values (empty when there are none). It is
//! the identity used for deduplication and lineage.
//!
//! References are resolved lazily against whatever [`PathRegistry`] the
//! caller passes, so an instance stays valid across layout changes and
//! simply yields fewer ids when components disappear.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use plexus_core::pattern::{DictPattern, id_matches};
use plexus_core::prop::combine_id_and_prop;
use plexus_core::{Anchor, ComponentId, DictId, IdPattern, LayoutPath, PathRegistry, PatternRef, PropertyRef};

use crate::dependency::CallbackSpec;

/// A reference resolved to a concrete component present in the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub id: ComponentId,
    pub property: String,
    pub path: LayoutPath,
}

impl ResolvedRef {
    /// `<id>.<property>` node key.
    #[must_use]
    pub fn key(&self) -> String {
        combine_id_and_prop(&self.id.stringify(), &self.property)
    }

    #[must_use]
    pub fn to_property_ref(&self) -> PropertyRef {
        PropertyRef::new(self.id.clone(), self.property.clone())
    }
}

/// Every component currently in `paths` satisfying `r`, relative to `anchor`.
#[must_use]
pub fn resolve_ref(paths: &PathRegistry, r: &PatternRef, anchor: Option<&Anchor>) -> Vec<ResolvedRef> {
    match &r.id {
        IdPattern::Plain(s) => {
            let id = ComponentId::Plain(s.clone());
            match paths.get_path(&id) {
                Some(path) => vec![ResolvedRef {
                    path: Arc::clone(path),
                    id,
                    property: r.property.clone(),
                }],
                None => Vec::new(),
            }
        }
        IdPattern::Dict(pattern) => {
            let Some(key_set) = r.id.key_set() else {
                return Vec::new();
            };
            paths
                .dict_entries(&key_set)
                .filter(|(id, _)| id_matches(pattern, id, anchor))
                .map(|(id, path)| ResolvedRef {
                    id: ComponentId::Dict(id.clone()),
                    property: r.property.clone(),
                    path: Arc::clone(path),
                })
                .collect()
        }
    }
}

/// One callback instance: a registration plus its `MATCH` binding.
#[derive(Debug, Clone)]
pub struct ResolvedCallback {
    spec: Arc<CallbackSpec>,
    anchor: Option<Anchor>,
    any_vals: String,
    resolved_id: String,
}

impl ResolvedCallback {
    #[must_use]
    pub fn new(spec: Arc<CallbackSpec>, anchor: Option<Anchor>) -> Self {
        let anchor = anchor.filter(|_| !spec.match_keys.is_empty());
        let any_vals = anchor.as_ref().map(Anchor::match_values).unwrap_or_default();
        let resolved_id = format!("{}{}", spec.output, any_vals);
        Self {
            spec,
            anchor,
            any_vals,
            resolved_id,
        }
    }

    /// Instance anchored at one concrete output id.
    #[must_use]
    pub fn anchored_at(spec: Arc<CallbackSpec>, pattern: &DictPattern, id: &DictId) -> Self {
        Self::new(spec, Some(Anchor::new(id.clone(), pattern.clone())))
    }

    #[must_use]
    pub fn spec(&self) -> &Arc<CallbackSpec> {
        &self.spec
    }

    #[must_use]
    pub fn resolved_id(&self) -> &str {
        &self.resolved_id
    }

    #[must_use]
    pub fn any_vals(&self) -> &str {
        &self.any_vals
    }

    #[must_use]
    pub fn anchor(&self) -> Option<&Anchor> {
        self.anchor.as_ref()
    }

    /// One entry per declared output; multi-valued outputs may hold any count.
    #[must_use]
    pub fn outputs(&self, paths: &PathRegistry) -> Vec<Vec<ResolvedRef>> {
        self.resolve_all(paths, &self.spec.outputs)
    }

    #[must_use]
    pub fn inputs(&self, paths: &PathRegistry) -> Vec<Vec<ResolvedRef>> {
        self.resolve_all(paths, &self.spec.inputs)
    }

    #[must_use]
    pub fn state(&self, paths: &PathRegistry) -> Vec<Vec<ResolvedRef>> {
        self.resolve_all(paths, &self.spec.state)
    }

    fn resolve_all(&self, paths: &PathRegistry, refs: &[PatternRef]) -> Vec<Vec<ResolvedRef>> {
        refs.iter()
            .map(|r| resolve_ref(paths, r, self.anchor.as_ref()))
            .collect()
    }

    /// Node keys of every resolved output.
    #[must_use]
    pub fn output_keys(&self, paths: &PathRegistry) -> BTreeSet<String> {
        flat_keys(self.outputs(paths))
    }

    /// Node keys of every resolved input.
    #[must_use]
    pub fn input_keys(&self, paths: &PathRegistry) -> BTreeSet<String> {
        flat_keys(self.inputs(paths))
    }

    /// Does every single-valued reference resolve to a component?
    #[must_use]
    pub fn is_complete(&self, paths: &PathRegistry) -> bool {
        let spec = &self.spec;
        spec.outputs
            .iter()
            .chain(&spec.inputs)
            .chain(&spec.state)
            .filter(|r| !r.is_multi())
            .all(|r| !resolve_ref(paths, r, self.anchor.as_ref()).is_empty())
    }
}

impl PartialEq for ResolvedCallback {
    fn eq(&self, other: &Self) -> bool {
        self.resolved_id == other.resolved_id
    }
}

impl Eq for ResolvedCallback {}

impl fmt::Display for ResolvedCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resolved_id)
    }
}

fn flat_keys(refs: Vec<Vec<ResolvedRef>>) -> BTreeSet<String> {
    refs.into_iter().flatten().map(|r| r.key()).collect()
}

/// Instances of `spec` whose outputs exist in `paths`.
///
/// `trigger` constrains which outputs are considered: when a pattern input
/// fired, it is that input's concrete id and pattern, so only outputs
/// consistent with it produce instances. Instances are anchored on the
/// first single-valued output when there is one, otherwise on every output,
/// deduplicated by their `MATCH` binding.
#[must_use]
pub fn resolve_from_outputs(
    spec: &Arc<CallbackSpec>,
    paths: &PathRegistry,
    trigger: Option<&Anchor>,
) -> Vec<ResolvedCallback> {
    if spec.match_keys.is_empty() {
        let cb = ResolvedCallback::new(Arc::clone(spec), None);
        let has_output = cb.outputs(paths).iter().any(|o| !o.is_empty());
        return if has_output { vec![cb] } else { Vec::new() };
    }

    let anchors: Vec<usize> = match spec.first_single_output {
        Some(i) => vec![i],
        None => (0..spec.outputs.len()).collect(),
    };
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for i in anchors {
        let out = &spec.outputs[i];
        let Some(pattern) = out.id.as_dict() else {
            continue;
        };
        for r in resolve_ref(paths, out, trigger) {
            let ComponentId::Dict(id) = &r.id else {
                continue;
            };
            let cb = ResolvedCallback::anchored_at(Arc::clone(spec), pattern, id);
            if seen.insert(cb.resolved_id.clone()) {
                found.push(cb);
            }
        }
    }
    found
}
