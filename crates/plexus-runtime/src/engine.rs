#![forbid(unsafe_code)]

//! The engine: graph, layout, registry and scheduler behind one handle.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──► Started ──start()/hydrate()──► Hydrated ──reload()──► Hydrated
//! ```
//!
//! Before hydration user writes fail with [`EngineError::NotHydrated`] and
//! are not buffered. Hydration builds the graph, registers the layout and
//! requests every initial callback.
//!
//! Everything runs on the caller's thread. [`Engine::pump`] collects
//! settled remote executions and runs the observers to a fixed point;
//! [`Engine::run_until_idle`] pumps until nothing is pending.

use std::collections::BTreeSet;
use std::time::Duration;

use plexus_core::prop::combine_id_and_prop;
use plexus_core::{ComponentId, JsonLayout, LayoutStore, PathRegistry, UpdateSource};
use plexus_graph::{Dependency, DependencyGraph};
use serde_json::{Map, Value};
use tracing::{debug, info, info_span};
use web_time::Instant;

use crate::callback::ChangeKind;
use crate::config::EngineConfig;
use crate::error::{EngineError, ErrorKind};
use crate::error_log::ErrorLog;
use crate::executor::ExecutionBackend;
use crate::factory::{Candidate, LayoutCallbackOptions, callbacks_by_input, layout_callbacks};
use crate::history::{InteractionHistory, UserEdit};
use crate::persistence::{NoPersistence, PersistenceAdapter};
use crate::scheduler::{Scheduler, SchedulerContext, rerender_callbacks, write_changed};
use crate::store::CallbackState;
use crate::transport::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Started,
    Hydrated,
}

pub struct Engine {
    config: EngineConfig,
    lifecycle: Lifecycle,
    graph: DependencyGraph,
    paths: PathRegistry,
    layout: Box<dyn LayoutStore>,
    backend: Box<dyn ExecutionBackend>,
    persistence: Box<dyn PersistenceAdapter>,
    errors: ErrorLog,
    history: InteractionHistory,
    scheduler: Scheduler,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("lifecycle", &self.lifecycle)
            .field("callbacks", &self.graph.len())
            .field("components", &self.paths.len())
            .field("errors", &self.errors.len())
            .field("idle", &self.scheduler.is_idle())
            .finish()
    }
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig, backend: impl ExecutionBackend + 'static) -> Self {
        let history = InteractionHistory::new(config.history_depth);
        Self {
            config,
            lifecycle: Lifecycle::Started,
            graph: DependencyGraph::default(),
            paths: PathRegistry::new(),
            layout: Box::new(JsonLayout::new(Value::Null)),
            backend: Box::new(backend),
            persistence: Box::new(NoPersistence),
            errors: ErrorLog::new(),
            history,
            scheduler: Scheduler::new(),
        }
    }

    /// Use a custom layout store. Its contents are replaced on hydration.
    #[must_use]
    pub fn with_layout_store(mut self, layout: impl LayoutStore + 'static) -> Self {
        self.layout = Box::new(layout);
        self
    }

    #[must_use]
    pub fn with_persistence(mut self, persistence: impl PersistenceAdapter + 'static) -> Self {
        self.persistence = Box::new(persistence);
        self
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Fetch dependencies and layout, then hydrate.
    pub fn start(&mut self, transport: &dyn HttpTransport) -> Result<(), EngineError> {
        let deps_url = self.config.dependencies_url();
        let layout_url = self.config.layout_url();
        let deps_body = fetch(transport, &deps_url)?;
        let layout_body = fetch(transport, &layout_url)?;
        let deps: Vec<Dependency> = serde_json::from_str(&deps_body)?;
        let layout: Value = serde_json::from_str(&layout_body)?;
        self.hydrate(&deps, layout);
        Ok(())
    }

    /// Install a graph and layout and run the initial callbacks.
    pub fn hydrate(&mut self, deps: &[Dependency], layout: Value) {
        let _span = info_span!(target: "plexus.engine", "engine.hydrate", dependencies = deps.len()).entered();
        self.scheduler.reset();
        self.graph = DependencyGraph::build(deps);
        for diagnostic in self.graph.diagnostics() {
            self.errors.report(ErrorKind::FrontEnd, diagnostic.to_string(), None);
        }
        self.paths = PathRegistry::from_layout(&layout);
        self.layout.replace(layout);
        self.lifecycle = Lifecycle::Hydrated;
        info!(
            target: "plexus.engine",
            callbacks = self.graph.len(),
            components = self.paths.len(),
            "hydrated"
        );

        let initial = layout_callbacks(
            &self.graph,
            &self.paths,
            self.layout.root(),
            &LayoutCallbackOptions {
                outputs_only: true,
                ..LayoutCallbackOptions::default()
            },
        );
        self.request(initial);
        self.run();
    }

    /// Replace graph and layout, keeping config and interaction history.
    pub fn reload(&mut self, deps: &[Dependency], layout: Value) {
        info!(target: "plexus.engine", "reloading");
        self.hydrate(deps, layout);
    }

    // ========================================================================
    // User writes
    // ========================================================================

    /// Apply a user write to `id` and run the callbacks it triggers.
    pub fn set_props(&mut self, id: &ComponentId, props: Map<String, Value>) -> Result<(), EngineError> {
        self.write_user(id, props, true)
    }

    /// Revert the newest recorded user write. Returns false if none.
    ///
    /// The edit leaves the undo stack only once its write succeeds.
    pub fn undo(&mut self) -> Result<bool, EngineError> {
        let Some(edit) = self.history.peek_undo() else {
            return Ok(false);
        };
        self.write_user(&edit.id, edit.after, false)?;
        self.history.undo();
        Ok(true)
    }

    /// Reapply the newest undone user write. Returns false if none.
    pub fn redo(&mut self) -> Result<bool, EngineError> {
        let Some(edit) = self.history.peek_redo() else {
            return Ok(false);
        };
        self.write_user(&edit.id, edit.after, false)?;
        self.history.redo();
        Ok(true)
    }

    fn write_user(&mut self, id: &ComponentId, props: Map<String, Value>, record: bool) -> Result<(), EngineError> {
        if self.lifecycle != Lifecycle::Hydrated {
            return Err(EngineError::NotHydrated);
        }
        let path = self
            .paths
            .get_path(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownComponent(id.stringify()))?;
        let props = self.persistence.apply_persistence(id, props);
        let current = self.layout.read(&path).cloned().unwrap_or_default();
        let changed = write_changed(self.layout.as_mut(), &path, &current, props, UpdateSource::User);
        if changed.is_empty() {
            debug!(target: "plexus.engine", id = %id, "user write changed nothing");
            return Ok(());
        }
        if record {
            let before = changed
                .keys()
                .map(|k| (k.clone(), current.get(k).cloned().unwrap_or(Value::Null)))
                .collect();
            self.history.record(UserEdit {
                id: id.clone(),
                before,
                after: changed.clone(),
            });
        }

        let mut candidates = Vec::new();
        for (prop, value) in &changed {
            candidates.extend(rerender_callbacks(
                &self.graph,
                &mut self.paths,
                &path,
                prop,
                current.get(prop),
                value,
            ));
            candidates.extend(callbacks_by_input(&self.graph, &self.paths, id, prop, ChangeKind::Direct));
        }
        self.request(candidates);
        self.run();
        Ok(())
    }

    fn request(&mut self, candidates: Vec<Candidate>) {
        if candidates.is_empty() {
            return;
        }
        let group = self.scheduler.next_group();
        let callbacks = candidates
            .into_iter()
            .map(|c| c.into_callback(Vec::new(), group))
            .collect();
        self.scheduler.request(callbacks);
    }

    // ========================================================================
    // Driving
    // ========================================================================

    fn run(&mut self) -> usize {
        let mut ctx = SchedulerContext {
            graph: &self.graph,
            paths: &mut self.paths,
            layout: self.layout.as_mut(),
            backend: self.backend.as_ref(),
            persistence: self.persistence.as_mut(),
            errors: &mut self.errors,
            config: &self.config,
        };
        self.scheduler.run(&mut ctx)
    }

    /// Collect settled executions and run observers. Returns whether
    /// anything moved.
    pub fn pump(&mut self) -> bool {
        let settled = self.scheduler.poll();
        let passes = self.run();
        settled > 0 || passes > 0
    }

    /// Pump until idle or until `timeout` elapses. Returns whether idle.
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            self.pump();
            if self.is_idle() {
                return true;
            }
            if start.elapsed() >= timeout {
                debug!(
                    target: "plexus.engine",
                    in_flight = self.scheduler.in_flight_len(),
                    "not idle before timeout"
                );
                return false;
            }
            std::thread::sleep(self.config.poll_interval());
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    #[must_use]
    pub fn state(&self) -> &CallbackState {
        self.scheduler.state()
    }

    #[must_use]
    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    #[must_use]
    pub fn paths(&self) -> &PathRegistry {
        &self.paths
    }

    #[must_use]
    pub fn layout(&self) -> &dyn LayoutStore {
        self.layout.as_ref()
    }

    #[must_use]
    pub fn history(&self) -> &InteractionHistory {
        &self.history
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Property keys that accepted callbacks are about to write.
    #[must_use]
    pub fn pending_outputs(&self) -> BTreeSet<String> {
        self.scheduler.pending_outputs(&self.paths)
    }

    /// Whether `id.prop` is about to be written.
    #[must_use]
    pub fn is_loading(&self, id: &ComponentId, prop: &str) -> bool {
        self.pending_outputs()
            .contains(&combine_id_and_prop(&id.stringify(), prop))
    }

    /// Current value of `id.prop`.
    #[must_use]
    pub fn read_prop(&self, id: &ComponentId, prop: &str) -> Option<&Value> {
        let path = self.paths.get_path(id)?;
        self.layout.read_prop(path, prop)
    }
}

fn fetch(transport: &dyn HttpTransport, url: &str) -> Result<String, EngineError> {
    let response = transport.get(url)?;
    if !response.is_success() {
        return Err(EngineError::Startup {
            url: url.to_string(),
            status: response.status,
        });
    }
    Ok(response.body)
}
