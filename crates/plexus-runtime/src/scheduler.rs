#![forbid(unsafe_code)]

//! Scheduler: the observer loop that drives callbacks through the store.
//!
//! Each call to [`Scheduler::run`] makes passes over the observers in
//! [`Observer::ORDER`] until none of them sees a new version of its input
//! buckets.
//!
//! | Observer   | Moves                                             |
//! |------------|---------------------------------------------------|
//! | complete   | `executed → stored`, writes outputs, requests more |
//! | stored     | prunes `requested` against stored records          |
//! | promote    | `requested → prioritized/blocked`, unblocks        |
//! | dispatch   | `prioritized → executing`, up to `max_concurrent`  |
//! | watch      | `executing → watched/executed`                     |
//!
//! [`Scheduler::poll`] settles in-flight executions into `executed`.
//!
//! # Invariants
//!
//! 1. A callback is only prioritized when no other pending callback produces
//!    one of its inputs.
//! 2. Outputs of `prioritized ∪ executing ∪ watched` never overlap.
//! 3. At most one live instance per resolved id: a newer request supersedes
//!    an older non-equivalent one and its result is discarded.
//! 4. A completed callback never re-triggers itself through its own writes.
//!
//! # Failure Modes
//!
//! | Condition                                | Behavior                         |
//! |------------------------------------------|----------------------------------|
//! | Callback among its own predecessors       | Dropped, front-end error logged  |
//! | Chain longer than `max_chain_depth`       | Dropped, front-end error logged  |
//! | Requested callbacks wait on each other    | All dropped as circular          |
//! | Output component no longer in the layout  | Write skipped                    |
//! | Backend error                             | Logged, callback still stored    |
//! | Observers never settle                    | Loop stops, warning emitted      |

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use ahash::AHashMap;
use plexus_core::paths::{contains_components, prop_path};
use plexus_core::prop::combine_id_and_prop;
use plexus_core::{ComponentId, LayoutStore, PathRegistry, PathSegment, UpdateSource};
use plexus_graph::DependencyGraph;
use serde_json::{Map, Value};
use tracing::{debug, debug_span, field, trace, warn};
use web_time::Instant;

use crate::callback::{Callback, ChangeKind, ExecutionGroup, ExecutionMeta, InstanceId};
use crate::config::EngineConfig;
use crate::error::{ErrorKind, ExecutionError};
use crate::error_log::ErrorLog;
use crate::executor::{CallbackData, CallbackRequest, Execution, ExecutionBackend, PendingExecution};
use crate::factory::{Candidate, LayoutCallbackOptions, callbacks_by_input, layout_callbacks};
use crate::metrics;
use crate::observer::{Observer, ObserverSet};
use crate::persistence::PersistenceAdapter;
use crate::store::{Bucket, CallbackAction, CallbackState, CallbackStore};

/// Buckets whose outputs count as pending for readiness.
const PENDING: [Bucket; 5] = [
    Bucket::Prioritized,
    Bucket::Blocked,
    Bucket::Executing,
    Bucket::Watched,
    Bucket::Executed,
];

/// Buckets whose outputs are claimed for blocking.
const CLAIMING: [Bucket; 3] = [Bucket::Prioritized, Bucket::Executing, Bucket::Watched];

/// Everything an observer pass may read or write besides the store.
pub struct SchedulerContext<'a> {
    pub graph: &'a DependencyGraph,
    pub paths: &'a mut PathRegistry,
    pub layout: &'a mut dyn LayoutStore,
    pub backend: &'a dyn ExecutionBackend,
    pub persistence: &'a mut dyn PersistenceAdapter,
    pub errors: &'a mut ErrorLog,
    pub config: &'a EngineConfig,
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Default)]
pub struct Scheduler {
    store: CallbackStore,
    observers: ObserverSet,
    in_flight: AHashMap<InstanceId, PendingExecution>,
    next_group: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &CallbackState {
        self.store.state()
    }

    #[must_use]
    pub fn store(&self) -> &CallbackStore {
        &self.store
    }

    /// A fresh execution group.
    pub fn next_group(&mut self) -> ExecutionGroup {
        self.next_group += 1;
        ExecutionGroup(self.next_group)
    }

    /// Add callbacks to `requested`.
    pub fn request(&mut self, callbacks: Vec<Callback>) {
        self.store.dispatch(CallbackAction::Add(Bucket::Requested, callbacks));
    }

    /// Executions handed to a backend whose result has not been collected.
    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.store.state().is_idle() && self.in_flight.is_empty()
    }

    /// Output keys claimed by accepted but unfinished callbacks.
    #[must_use]
    pub fn pending_outputs(&self, paths: &PathRegistry) -> BTreeSet<String> {
        self.store
            .state()
            .iter_buckets(&Bucket::IN_FLIGHT)
            .flat_map(|(_, cb)| cb.output_keys(paths))
            .collect()
    }

    /// Forget every callback, discarding in-flight results.
    pub fn reset(&mut self) {
        for _ in self.in_flight.drain() {
            metrics::record_discarded();
        }
        self.store.clear();
        self.observers.reset();
    }

    /// Move settled executions from `watched` to `executed`.
    ///
    /// Returns how many settled.
    pub fn poll(&mut self) -> usize {
        let mut settled = Vec::new();
        for cb in &self.store.state().watched {
            let Some(pending) = self.in_flight.get(&cb.id()) else {
                continue;
            };
            if let Some(result) = pending.try_take() {
                settled.push(cb.with_result(result));
            }
        }
        for cb in &settled {
            self.in_flight.remove(&cb.id());
        }
        let n = settled.len();
        self.store
            .dispatch(CallbackAction::transition(Bucket::Watched, Bucket::Executed, settled));
        n
    }

    /// Run observers until nothing changes. Returns the number of passes
    /// that did work.
    pub fn run(&mut self, ctx: &mut SchedulerContext<'_>) -> usize {
        let max = ctx.config.max_observer_passes;
        for pass in 0..max {
            let mut ran = false;
            for observer in Observer::ORDER {
                let version = self.store.version_of(observer.inputs());
                if !self.observers.should_run(observer, version) {
                    continue;
                }
                ran = true;
                trace!(target: "plexus.scheduler", pass, observer = observer.name(), "observer run");
                match observer {
                    Observer::Completion => self.complete(ctx),
                    Observer::Stored => self.prune_stored(),
                    Observer::Promotion => self.promote(ctx),
                    Observer::Dispatch => self.dispatch(ctx),
                    Observer::Watch => self.watch(),
                }
            }
            if !ran {
                self.drop_orphaned_handles();
                return pass;
            }
        }
        warn!(
            target: "plexus.scheduler",
            passes = max,
            "observer loop did not settle"
        );
        self.drop_orphaned_handles();
        max
    }

    fn drop_handle(&mut self, id: InstanceId) {
        if let Some(pending) = self.in_flight.remove(&id) {
            metrics::record_discarded();
            debug!(
                target: "plexus.scheduler",
                task = pending.task.0,
                "discarding superseded execution"
            );
        }
    }

    fn drop_orphaned_handles(&mut self) {
        let live: HashSet<InstanceId> = self
            .store
            .state()
            .iter_buckets(&[Bucket::Executing, Bucket::Watched])
            .map(|(_, cb)| cb.id())
            .collect();
        let orphaned: Vec<InstanceId> = self
            .in_flight
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        for id in orphaned {
            self.drop_handle(id);
        }
    }

    // ========================================================================
    // Completion
    // ========================================================================

    fn complete(&mut self, ctx: &mut SchedulerContext<'_>) {
        let executed = self.store.state().executed.clone();
        if executed.is_empty() {
            return;
        }
        let span = debug_span!(
            target: "plexus.scheduler",
            "scheduler.complete",
            callbacks = executed.len(),
            failed = field::Empty,
            requested = field::Empty,
            duration_us = field::Empty,
        )
        .entered();
        let start = Instant::now();

        let mut stored = Vec::with_capacity(executed.len());
        let mut requested = Vec::new();
        let mut failed = 0usize;
        for cb in &executed {
            let all_props = cb.output_keys(ctx.paths);
            let updated_props = match &cb.execution_result {
                Some(Ok(data)) => {
                    if cb.spec().clientside_function.is_none() {
                        ctx.errors.set_backend_connected(true);
                    }
                    let (updated, triggered) = self.apply_response(cb, data, ctx);
                    requested.extend(triggered);
                    updated
                }
                Some(Err(error)) => {
                    failed += 1;
                    metrics::record_failed();
                    if error.is_connectivity() {
                        ctx.errors.set_backend_connected(false);
                    }
                    ctx.errors
                        .report(error.kind(), error.to_string(), Some(cb.resolved_id()));
                    BTreeSet::new()
                }
                None => {
                    ctx.errors.report(
                        ErrorKind::FrontEnd,
                        "callback completed without a result",
                        Some(cb.resolved_id()),
                    );
                    BTreeSet::new()
                }
            };
            stored.push(cb.with_meta(ExecutionMeta {
                all_props,
                updated_props,
            }));
        }

        let n = executed.len() as u64;
        metrics::record_completed(n);
        span.record("failed", failed);
        span.record("requested", requested.len());
        self.store.dispatch(CallbackAction::Aggregate(vec![
            CallbackAction::Remove(Bucket::Executed, executed.iter().map(Callback::id).collect()),
            CallbackAction::AddCompleted(n),
            CallbackAction::Add(Bucket::Stored, stored),
            CallbackAction::Add(Bucket::Requested, requested),
        ]));
        span.record("duration_us", start.elapsed().as_micros() as u64);
    }

    /// Write a successful result. Returns the keys actually changed and the
    /// callbacks those changes request.
    fn apply_response(
        &mut self,
        cb: &Callback,
        data: &CallbackData,
        ctx: &mut SchedulerContext<'_>,
    ) -> (BTreeSet<String>, Vec<Callback>) {
        let mut declared: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for r in cb.resolved.outputs(ctx.paths).into_iter().flatten() {
            declared.entry(r.id.stringify()).or_default().insert(r.property);
        }

        let mut updated = BTreeSet::new();
        let mut candidates: Vec<Candidate> = Vec::new();
        for (id_text, props) in data {
            let Some(allowed) = declared.get(id_text) else {
                warn!(
                    target: "plexus.scheduler",
                    callback = cb.resolved_id(),
                    id = %id_text,
                    "response names an undeclared output component"
                );
                continue;
            };
            let id = match ComponentId::parse(id_text) {
                Ok(id) => id,
                Err(e) => {
                    warn!(target: "plexus.scheduler", id = %id_text, error = %e, "unparseable output id");
                    continue;
                }
            };
            let mut filtered = Map::new();
            for (prop, value) in props {
                if allowed.contains(prop) {
                    filtered.insert(prop.clone(), value.clone());
                } else {
                    warn!(
                        target: "plexus.scheduler",
                        callback = cb.resolved_id(),
                        prop = %combine_id_and_prop(id_text, prop),
                        "response writes an undeclared output"
                    );
                }
            }
            let Some(path) = ctx.paths.get_path(&id).cloned() else {
                debug!(target: "plexus.scheduler", id = %id_text, "output component left the layout");
                continue;
            };
            let current = ctx.layout.read(&path).cloned().unwrap_or_default();
            let filtered = ctx.persistence.prune_persistence(&id, &current, filtered);
            let filtered = ctx.persistence.apply_persistence(&id, filtered);
            let changed = write_changed(ctx.layout, &path, &current, filtered, UpdateSource::Response);

            for (prop, value) in &changed {
                updated.insert(combine_id_and_prop(id_text, prop));
                candidates.extend(rerender_callbacks(
                    ctx.graph,
                    ctx.paths,
                    &path,
                    prop,
                    current.get(prop),
                    value,
                ));
                candidates.extend(
                    callbacks_by_input(ctx.graph, ctx.paths, &id, prop, ChangeKind::Direct)
                        .into_iter()
                        .filter(|c| c.resolved.resolved_id() != cb.resolved_id()),
                );
            }
        }

        if candidates.is_empty() {
            return (updated, Vec::new());
        }
        let group = self.next_group();
        let lineage = cb.successor_lineage();
        let triggered = candidates
            .into_iter()
            .map(|c| c.into_callback(lineage.clone(), group))
            .collect();
        (updated, triggered)
    }

    // ========================================================================
    // Stored
    // ========================================================================

    fn prune_stored(&mut self) {
        let state = self.store.state();
        if state.stored.is_empty() {
            return;
        }
        let stored_ids: Vec<InstanceId> = state.stored.iter().map(Callback::id).collect();
        let mut requested = state.requested.clone();
        let mut modified: HashSet<InstanceId> = HashSet::new();
        let mut pruned: HashSet<InstanceId> = HashSet::new();

        for record in &state.stored {
            let (Some(meta), Some(group)) = (&record.execution_meta, record.execution_group) else {
                continue;
            };
            let dropped: BTreeSet<&String> = meta.dropped_props().collect();
            if dropped.is_empty() {
                continue;
            }
            for cb in requested.iter_mut() {
                if cb.execution_group != Some(group) {
                    continue;
                }
                let before = cb.changed_prop_ids.len();
                cb.changed_prop_ids
                    .retain(|key, kind| !(*kind == ChangeKind::Indirect && dropped.contains(key)));
                if cb.changed_prop_ids.len() == before {
                    continue;
                }
                if cb.changed_prop_ids.is_empty() {
                    pruned.insert(cb.id());
                } else {
                    modified.insert(cb.id());
                }
            }
        }

        let _span = debug_span!(
            target: "plexus.scheduler",
            "scheduler.stored",
            records = stored_ids.len(),
            pruned = pruned.len(),
        )
        .entered();
        let removed: Vec<InstanceId> = pruned.iter().chain(modified.iter()).copied().collect();
        let re_added: Vec<Callback> = requested
            .into_iter()
            .filter(|cb| modified.contains(&cb.id()) && !pruned.contains(&cb.id()))
            .collect();
        self.store.dispatch(CallbackAction::Aggregate(vec![
            CallbackAction::Remove(Bucket::Stored, stored_ids),
            CallbackAction::Remove(Bucket::Requested, removed),
            CallbackAction::Add(Bucket::Requested, re_added),
        ]));
    }

    // ========================================================================
    // Promotion
    // ========================================================================

    fn promote(&mut self, ctx: &mut SchedulerContext<'_>) {
        let state = self.store.state();
        if state.requested.is_empty() && state.blocked.is_empty() {
            return;
        }
        let span = debug_span!(
            target: "plexus.scheduler",
            "scheduler.promote",
            requested = state.requested.len(),
            prioritized = field::Empty,
            blocked = field::Empty,
            dropped = field::Empty,
        )
        .entered();
        let paths: &PathRegistry = ctx.paths;

        let mut remove_requested: Vec<InstanceId> = Vec::new();
        let mut remove_other: BTreeMap<Bucket, Vec<InstanceId>> = BTreeMap::new();
        let mut dropped = 0usize;

        // Circular, runaway and dangling requests.
        let mut live: Vec<Callback> = Vec::new();
        for cb in &state.requested {
            if cb.is_circular() {
                ctx.errors.report_circular(
                    cb.resolved_id(),
                    &format!("{} is among its own predecessors", cb.resolved_id()),
                );
                metrics::record_circular();
            } else if cb.predecessors.len() > ctx.config.max_chain_depth {
                ctx.errors.report_circular(
                    cb.resolved_id(),
                    &format!(
                        "chain of {} callbacks exceeds max_chain_depth {}",
                        cb.predecessors.len(),
                        ctx.config.max_chain_depth
                    ),
                );
                metrics::record_circular();
            } else if !cb.resolved.is_complete(paths) {
                debug!(
                    target: "plexus.scheduler",
                    callback = cb.resolved_id(),
                    "dropping request that references removed components"
                );
            } else {
                live.push(cb.clone());
                continue;
            }
            remove_requested.push(cb.id());
            dropped += 1;
        }

        // Duplicates within requested.
        let mut merged: Vec<Callback> = Vec::new();
        let mut modified: HashSet<InstanceId> = HashSet::new();
        let mut position: HashMap<String, usize> = HashMap::new();
        for cb in live {
            match position.get(cb.resolved_id()) {
                Some(&i) => {
                    merged[i].absorb(&cb);
                    modified.insert(merged[i].id());
                    remove_requested.push(cb.id());
                }
                None => {
                    position.insert(cb.resolved_id().to_string(), merged.len());
                    merged.push(cb);
                }
            }
        }

        // Against instances already accepted.
        let mut superseded: HashSet<InstanceId> = HashSet::new();
        let mut survivors: Vec<Callback> = Vec::new();
        for cb in merged {
            let existing: Vec<(Bucket, &Callback)> = state
                .iter_buckets(&Bucket::IN_FLIGHT)
                .filter(|(_, other)| other.resolved_id() == cb.resolved_id())
                .collect();
            if existing.iter().any(|(_, other)| other.is_equivalent(&cb)) {
                debug!(
                    target: "plexus.scheduler",
                    callback = cb.resolved_id(),
                    "equivalent request already accepted"
                );
                modified.remove(&cb.id());
                remove_requested.push(cb.id());
                continue;
            }
            for (bucket, old) in existing {
                superseded.insert(old.id());
                remove_other.entry(bucket).or_default().push(old.id());
            }
            survivors.push(cb);
        }

        // Readiness: wait while another pending callback produces an input.
        let mut producers: HashMap<String, Vec<InstanceId>> = HashMap::new();
        for cb in &survivors {
            for key in cb.output_keys(paths) {
                producers.entry(key).or_default().push(cb.id());
            }
        }
        for (_, cb) in state.iter_buckets(&PENDING) {
            if superseded.contains(&cb.id()) {
                continue;
            }
            for key in cb.output_keys(paths) {
                producers.entry(key).or_default().push(cb.id());
            }
        }
        let mut ready: Vec<Callback> = Vec::new();
        let mut waiting: Vec<Callback> = Vec::new();
        for cb in survivors {
            let waits = cb.input_keys(paths).iter().any(|key| {
                producers
                    .get(key)
                    .is_some_and(|ids| ids.iter().any(|id| *id != cb.id()))
            });
            if waits {
                waiting.push(cb);
            } else {
                ready.push(cb);
            }
        }
        let nothing_running = state
            .iter_buckets(&PENDING)
            .all(|(_, cb)| superseded.contains(&cb.id()));
        if ready.is_empty() && !waiting.is_empty() && nothing_running {
            for cb in waiting.drain(..) {
                ctx.errors.report_circular(
                    cb.resolved_id(),
                    &format!("{} waits on callbacks that wait on it", cb.resolved_id()),
                );
                metrics::record_circular();
                modified.remove(&cb.id());
                remove_requested.push(cb.id());
                dropped += 1;
            }
        }

        // Blocking: output overlap with claimed outputs.
        let mut claimed: HashSet<String> = state
            .iter_buckets(&CLAIMING)
            .filter(|(_, cb)| !superseded.contains(&cb.id()))
            .flat_map(|(_, cb)| cb.output_keys(paths))
            .collect();
        let mut prioritized: Vec<Callback> = Vec::new();
        let mut blocked: Vec<Callback> = Vec::new();
        for cb in &state.blocked {
            if superseded.contains(&cb.id()) {
                continue;
            }
            if !cb.resolved.is_complete(paths) {
                remove_other.entry(Bucket::Blocked).or_default().push(cb.id());
                dropped += 1;
                continue;
            }
            let outputs = cb.output_keys(paths);
            if outputs.iter().all(|key| !claimed.contains(key)) {
                claimed.extend(outputs);
                remove_other.entry(Bucket::Blocked).or_default().push(cb.id());
                prioritized.push(cb.clone());
            }
        }
        for cb in ready {
            modified.remove(&cb.id());
            remove_requested.push(cb.id());
            let outputs = cb.output_keys(paths);
            if outputs.iter().any(|key| claimed.contains(key)) {
                blocked.push(cb);
            } else {
                claimed.extend(outputs);
                prioritized.push(cb);
            }
        }
        let mut re_added: Vec<Callback> = Vec::new();
        for cb in waiting {
            if modified.contains(&cb.id()) {
                remove_requested.push(cb.id());
                re_added.push(cb);
            }
        }

        span.record("prioritized", prioritized.len());
        span.record("blocked", blocked.len());
        span.record("dropped", dropped);

        let mut actions = vec![CallbackAction::Remove(Bucket::Requested, remove_requested)];
        actions.extend(
            remove_other
                .into_iter()
                .map(|(bucket, ids)| CallbackAction::Remove(bucket, ids)),
        );
        actions.push(CallbackAction::Add(Bucket::Requested, re_added));
        actions.push(CallbackAction::Add(Bucket::Blocked, blocked));
        actions.push(CallbackAction::Add(Bucket::Prioritized, prioritized));
        for id in superseded {
            self.drop_handle(id);
        }
        self.store.dispatch(CallbackAction::Aggregate(actions));
    }

    // ========================================================================
    // Dispatch and watch
    // ========================================================================

    fn dispatch(&mut self, ctx: &mut SchedulerContext<'_>) {
        let state = self.store.state();
        if state.prioritized.is_empty() {
            return;
        }
        let busy = state.executing.len() + state.watched.len();
        let available = ctx.config.max_concurrent.saturating_sub(busy);
        if available == 0 {
            debug!(target: "plexus.scheduler", busy, "concurrency limit reached");
            return;
        }
        let picked: Vec<Callback> = state.prioritized.iter().take(available).cloned().collect();
        let _span = debug_span!(
            target: "plexus.scheduler",
            "scheduler.dispatch",
            callbacks = picked.len(),
            busy,
        )
        .entered();

        let picked_ids: Vec<InstanceId> = picked.iter().map(Callback::id).collect();
        let mut executing = Vec::with_capacity(picked.len());
        for cb in picked {
            if !cb.resolved.is_complete(ctx.paths) {
                debug!(
                    target: "plexus.scheduler",
                    callback = cb.resolved_id(),
                    "dropping prioritized callback that references removed components"
                );
                continue;
            }
            let request = CallbackRequest::fill(&cb, ctx.paths, &*ctx.layout);
            metrics::record_dispatched();
            debug!(
                target: "plexus.scheduler",
                callback = cb.resolved_id(),
                instance = cb.id().raw(),
                "dispatching callback"
            );
            match ctx.backend.execute(&cb, request) {
                Execution::Ready(result) => executing.push(cb.with_result(result)),
                Execution::Pending(pending) => {
                    self.in_flight.insert(cb.id(), pending);
                    executing.push(cb);
                }
            }
        }
        self.store.dispatch(CallbackAction::Aggregate(vec![
            CallbackAction::Remove(Bucket::Prioritized, picked_ids),
            CallbackAction::Add(Bucket::Executing, executing),
        ]));
    }

    fn watch(&mut self) {
        let executing = self.store.state().executing.clone();
        if executing.is_empty() {
            return;
        }
        let ids: Vec<InstanceId> = executing.iter().map(Callback::id).collect();
        let mut watched = Vec::new();
        let mut executed = Vec::new();
        for cb in executing {
            if cb.execution_result.is_some() {
                executed.push(cb);
            } else if self.in_flight.contains_key(&cb.id()) {
                watched.push(cb);
            } else {
                executed.push(cb.with_result(Err(ExecutionError::Disconnected)));
            }
        }
        let _span = debug_span!(
            target: "plexus.scheduler",
            "scheduler.watch",
            watched = watched.len(),
            executed = executed.len(),
        )
        .entered();
        self.store.dispatch(CallbackAction::Aggregate(vec![
            CallbackAction::Remove(Bucket::Executing, ids),
            CallbackAction::Add(Bucket::Watched, watched),
            CallbackAction::Add(Bucket::Executed, executed),
        ]));
    }
}

// ============================================================================
// Shared write helpers
// ============================================================================

/// Write the props of `props` that differ from `current`. Returns them.
pub(crate) fn write_changed(
    layout: &mut dyn LayoutStore,
    path: &[PathSegment],
    current: &Map<String, Value>,
    props: Map<String, Value>,
    source: UpdateSource,
) -> Map<String, Value> {
    let changed: Map<String, Value> = props
        .into_iter()
        .filter(|(key, value)| current.get(key) != Some(value))
        .collect();
    if !changed.is_empty() {
        layout.write(path, changed.clone(), source);
    }
    changed
}

/// Callbacks caused by replacing a component-valued prop, updating `paths`
/// for the new subtree.
pub(crate) fn rerender_callbacks(
    graph: &DependencyGraph,
    paths: &mut PathRegistry,
    path: &[PathSegment],
    prop: &str,
    old: Option<&Value>,
    new: &Value,
) -> Vec<Candidate> {
    let old = old.filter(|v| contains_components(v));
    if old.is_none() && !contains_components(new) {
        return Vec::new();
    }
    let chunk_path = prop_path(path, prop);
    let mut found = Vec::new();
    if let Some(old) = old {
        found.extend(layout_callbacks(
            graph,
            paths,
            old,
            &LayoutCallbackOptions {
                removed_array_inputs_only: true,
                ..LayoutCallbackOptions::default()
            },
        ));
    }
    paths.compute_paths(new, &chunk_path);
    found.extend(layout_callbacks(
        graph,
        paths,
        new,
        &LayoutCallbackOptions {
            chunk_path: Some(chunk_path),
            ..LayoutCallbackOptions::default()
        },
    ));
    found
}
