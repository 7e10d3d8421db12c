#![forbid(unsafe_code)]

//! Callback instances as they move through the state store.
//!
//! A [`Callback`] wraps a [`ResolvedCallback`] with the runtime facts of one
//! request: which props triggered it, which callbacks led to it, which
//! execution group it belongs to, and once executed, its result and meta.
//!
//! Bucket membership is by [`InstanceId`]. Attaching a result or meta
//! produces a new value with the same instance id.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use plexus_core::PathRegistry;
use plexus_graph::{CallbackSpec, ResolvedCallback};

use crate::executor::ExecutionResult;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Identity of one callback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Requests caused by the same event share a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionGroup(pub u64);

/// How a triggering prop changed.
///
/// `Indirect` props are outputs of another callback in the same group that
/// has not run yet; they may turn out unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    Indirect,
    Direct,
}

/// Declared vs. actually written outputs of a completed callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionMeta {
    pub all_props: BTreeSet<String>,
    pub updated_props: BTreeSet<String>,
}

impl ExecutionMeta {
    /// Props that were declared but left untouched.
    pub fn dropped_props(&self) -> impl Iterator<Item = &String> {
        self.all_props.difference(&self.updated_props)
    }
}

/// A callback request moving through the lifecycle buckets.
#[derive(Debug, Clone)]
pub struct Callback {
    id: InstanceId,
    pub resolved: Arc<ResolvedCallback>,
    pub changed_prop_ids: BTreeMap<String, ChangeKind>,
    /// Resolved ids of the callbacks whose outputs led here, oldest first.
    pub predecessors: Vec<String>,
    pub execution_group: Option<ExecutionGroup>,
    pub initial_call: bool,
    pub execution_result: Option<ExecutionResult>,
    pub execution_meta: Option<ExecutionMeta>,
}

impl Callback {
    #[must_use]
    pub fn new(resolved: ResolvedCallback) -> Self {
        Self {
            id: InstanceId::next(),
            resolved: Arc::new(resolved),
            changed_prop_ids: BTreeMap::new(),
            predecessors: Vec::new(),
            execution_group: None,
            initial_call: false,
            execution_result: None,
            execution_meta: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    #[must_use]
    pub fn spec(&self) -> &Arc<CallbackSpec> {
        self.resolved.spec()
    }

    #[must_use]
    pub fn resolved_id(&self) -> &str {
        self.resolved.resolved_id()
    }

    #[must_use]
    pub fn with_lineage(mut self, predecessors: Vec<String>, group: ExecutionGroup) -> Self {
        self.predecessors = predecessors;
        self.execution_group = Some(group);
        self
    }

    #[must_use]
    pub fn with_result(&self, result: ExecutionResult) -> Self {
        Self {
            execution_result: Some(result),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_meta(&self, meta: ExecutionMeta) -> Self {
        Self {
            execution_meta: Some(meta),
            ..self.clone()
        }
    }

    /// Lineage handed to callbacks this one triggers.
    #[must_use]
    pub fn successor_lineage(&self) -> Vec<String> {
        let mut lineage = self.predecessors.clone();
        lineage.push(self.resolved_id().to_string());
        lineage
    }

    /// Did this callback's own output lead back to it?
    #[must_use]
    pub fn is_circular(&self) -> bool {
        let me = self.resolved_id();
        self.predecessors.iter().any(|p| p == me)
    }

    /// Same resolved id, lineage and group: a duplicate request.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.resolved_id() == other.resolved_id()
            && self.predecessors == other.predecessors
            && self.execution_group == other.execution_group
    }

    /// Fold another request of the same resolved id into this one.
    pub fn absorb(&mut self, other: &Self) {
        for (key, kind) in &other.changed_prop_ids {
            merge_change(&mut self.changed_prop_ids, key, *kind);
        }
        self.initial_call |= other.initial_call;
    }

    #[must_use]
    pub fn output_keys(&self, paths: &PathRegistry) -> BTreeSet<String> {
        self.resolved.output_keys(paths)
    }

    #[must_use]
    pub fn input_keys(&self, paths: &PathRegistry) -> BTreeSet<String> {
        self.resolved.input_keys(paths)
    }
}

/// Insert `kind` for `key`, keeping the stronger of the two.
pub fn merge_change(map: &mut BTreeMap<String, ChangeKind>, key: &str, kind: ChangeKind) {
    map.entry(key.to_string())
        .and_modify(|k| *k = (*k).max(kind))
        .or_insert(kind);
}
