#![forbid(unsafe_code)]

//! Execution seam: turning a callback into a request and handing it to a
//! backend.
//!
//! A backend either answers synchronously ([`Execution::Ready`]) or hands
//! back a [`PendingExecution`]: a task id plus the receiving end of a
//! one-shot channel. The scheduler owns pending handles and polls them with
//! `try_recv`; dropping a handle is how an execution is cancelled. The
//! worker's late send then fails silently.
//!
//! # Request shape
//!
//! [`CallbackRequest`] serializes to the update endpoint's body:
//!
//! ```json
//! {"output": "..a.x...b.y..",
//!  "outputs": [{"id": "a", "property": "x"}, {"id": "b", "property": "y"}],
//!  "inputs": [{"id": "c", "property": "value", "value": 3}],
//!  "state": [],
//!  "changedPropIds": ["c.value"]}
//! ```
//!
//! `outputs` is a single object for single-output callbacks; any `ALL` or
//! `ALLSMALLER` reference becomes a list.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};

use plexus_core::{ComponentId, LayoutStore, PathRegistry};
use plexus_graph::ResolvedRef;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::callback::Callback;
use crate::clientside::ClientsideRegistry;
use crate::error::ExecutionError;
use crate::remote::RemoteBackend;

/// `{stringified id: {prop: value}}` as written back to the layout.
pub type CallbackData = BTreeMap<String, Map<String, Value>>;

pub type ExecutionResult = Result<CallbackData, ExecutionError>;

// ============================================================================
// Request
// ============================================================================

/// One value or a list of values, for single vs. wildcard references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Slot<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Slot<T> {
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        match self {
            Self::One(v) => std::slice::from_ref(v).iter(),
            Self::Many(vs) => vs.iter(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTarget {
    pub id: ComponentId,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputValue {
    pub id: ComponentId,
    pub property: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Output shape: a single slot for single-output callbacks, else a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outputs {
    Single(Slot<OutputTarget>),
    Multi(Vec<Slot<OutputTarget>>),
}

impl Outputs {
    #[must_use]
    pub fn slots(&self) -> Vec<&Slot<OutputTarget>> {
        match self {
            Self::Single(s) => vec![s],
            Self::Multi(v) => v.iter().collect(),
        }
    }
}

/// Payload handed to a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackRequest {
    pub output: String,
    pub outputs: Outputs,
    pub inputs: Vec<Slot<InputValue>>,
    pub state: Vec<Slot<InputValue>>,
    pub changed_prop_ids: Vec<String>,
}

impl CallbackRequest {
    /// Gather current input and state values for `cb` from the layout.
    #[must_use]
    pub fn fill(cb: &Callback, paths: &PathRegistry, layout: &dyn LayoutStore) -> Self {
        let spec = cb.spec();
        let resolved = &cb.resolved;

        let mut output_slots: Vec<Slot<OutputTarget>> = spec
            .outputs
            .iter()
            .zip(resolved.outputs(paths))
            .map(|(decl, refs)| {
                let targets = refs.into_iter().map(|r| OutputTarget {
                    id: r.id,
                    property: r.property,
                });
                slot(decl.is_multi(), targets)
            })
            .collect();
        let outputs = if spec.multi_output || output_slots.is_empty() {
            Outputs::Multi(output_slots)
        } else {
            Outputs::Single(output_slots.remove(0))
        };

        let values = |decls: &[plexus_core::PatternRef], refs: Vec<Vec<ResolvedRef>>| {
            decls
                .iter()
                .zip(refs)
                .map(|(decl, refs)| {
                    let items = refs.into_iter().map(|r| InputValue {
                        value: layout.read_prop(&r.path, &r.property).cloned(),
                        id: r.id,
                        property: r.property,
                    });
                    slot(decl.is_multi(), items)
                })
                .collect::<Vec<_>>()
        };

        Self {
            output: spec.output.clone(),
            outputs,
            inputs: values(&spec.inputs, resolved.inputs(paths)),
            state: values(&spec.state, resolved.state(paths)),
            changed_prop_ids: cb.changed_prop_ids.keys().cloned().collect(),
        }
    }
}

fn slot<T>(multi: bool, mut items: impl Iterator<Item = T>) -> Slot<T> {
    if multi {
        Slot::Many(items.collect())
    } else {
        match items.next() {
            Some(v) => Slot::One(v),
            None => Slot::Many(Vec::new()),
        }
    }
}

// ============================================================================
// Execution handles
// ============================================================================

static NEXT_TASK: AtomicU64 = AtomicU64::new(1);

/// Identity of an in-flight execution, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

impl TaskId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_TASK.fetch_add(1, Ordering::Relaxed))
    }
}

/// Receiving end of an execution running elsewhere.
#[derive(Debug)]
pub struct PendingExecution {
    pub task: TaskId,
    receiver: Receiver<ExecutionResult>,
}

impl PendingExecution {
    #[must_use]
    pub fn new(receiver: Receiver<ExecutionResult>) -> Self {
        Self {
            task: TaskId::next(),
            receiver,
        }
    }

    /// Non-blocking check. A dropped sender settles as `Disconnected`.
    pub fn try_take(&self) -> Option<ExecutionResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ExecutionError::Disconnected)),
        }
    }
}

/// What a backend hands back.
#[derive(Debug)]
pub enum Execution {
    Ready(ExecutionResult),
    Pending(PendingExecution),
}

/// Executes callbacks.
pub trait ExecutionBackend {
    fn execute(&self, callback: &Callback, request: CallbackRequest) -> Execution;
}

/// Routes clientside callbacks to the registry and the rest to the server.
#[derive(Default)]
pub struct BackendRouter {
    clientside: ClientsideRegistry,
    remote: Option<RemoteBackend>,
}

impl BackendRouter {
    #[must_use]
    pub fn new(clientside: ClientsideRegistry, remote: Option<RemoteBackend>) -> Self {
        Self { clientside, remote }
    }

    #[must_use]
    pub fn clientside(&self) -> &ClientsideRegistry {
        &self.clientside
    }

    pub fn clientside_mut(&mut self) -> &mut ClientsideRegistry {
        &mut self.clientside
    }
}

impl ExecutionBackend for BackendRouter {
    fn execute(&self, callback: &Callback, request: CallbackRequest) -> Execution {
        if let Some(function) = &callback.spec().clientside_function {
            return Execution::Ready(self.clientside.execute(function, &request));
        }
        match &self.remote {
            Some(remote) => remote.execute(callback, request),
            None => Execution::Ready(Err(ExecutionError::NoRemoteBackend)),
        }
    }
}
