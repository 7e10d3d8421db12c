#![forbid(unsafe_code)]

//! Clientside backend: callbacks implemented as in-process functions.
//!
//! Functions are registered under `namespace.function_name` and receive the
//! filled request. They return one [`OutputValue`] per declared output, or
//! [`ClientsideError::PreventUpdate`] to leave every output untouched.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::executor::{CallbackData, CallbackRequest, ExecutionResult, InputValue, Outputs, Slot};
use crate::error::ExecutionError;
use plexus_graph::ClientsideFunction;

/// Value returned for one declared output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    Value(Value),
    /// Leave this output as it is.
    NoUpdate,
    /// One entry per id matched by an `ALL` output.
    Many(Vec<OutputValue>),
}

impl From<Value> for OutputValue {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientsideError {
    #[error("update prevented")]
    PreventUpdate,
    #[error("{0}")]
    Failed(String),
}

/// Arguments handed to a clientside function.
#[derive(Debug, Clone)]
pub struct ClientsideContext<'a> {
    pub request: &'a CallbackRequest,
}

impl ClientsideContext<'_> {
    /// Value of the `n`th input; lists for wildcard inputs, null when absent.
    #[must_use]
    pub fn input(&self, n: usize) -> Value {
        self.request.inputs.get(n).map_or(Value::Null, slot_value)
    }

    /// Value of the `n`th state entry.
    #[must_use]
    pub fn state(&self, n: usize) -> Value {
        self.request.state.get(n).map_or(Value::Null, slot_value)
    }

    /// Keys of the props that triggered this run.
    #[must_use]
    pub fn triggered(&self) -> &[String] {
        &self.request.changed_prop_ids
    }
}

fn slot_value(slot: &Slot<InputValue>) -> Value {
    let value = |v: &InputValue| v.value.clone().unwrap_or(Value::Null);
    match slot {
        Slot::One(v) => value(v),
        Slot::Many(vs) => Value::Array(vs.iter().map(value).collect()),
    }
}

pub type ClientsideFn =
    Box<dyn Fn(&ClientsideContext<'_>) -> Result<Vec<OutputValue>, ClientsideError>>;

/// Registered clientside functions.
#[derive(Default)]
pub struct ClientsideRegistry {
    functions: HashMap<(String, String), ClientsideFn>,
}

impl fmt::Debug for ClientsideRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .functions
            .keys()
            .map(|(ns, name)| format!("{ns}.{name}"))
            .collect();
        names.sort();
        f.debug_struct("ClientsideRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl ClientsideRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, namespace: &str, function_name: &str, f: F)
    where
        F: Fn(&ClientsideContext<'_>) -> Result<Vec<OutputValue>, ClientsideError> + 'static,
    {
        self.functions
            .insert((namespace.to_string(), function_name.to_string()), Box::new(f));
    }

    #[must_use]
    pub fn contains(&self, namespace: &str, function_name: &str) -> bool {
        self.functions
            .contains_key(&(namespace.to_string(), function_name.to_string()))
    }

    /// Run a registered function synchronously.
    pub fn execute(&self, function: &ClientsideFunction, request: &CallbackRequest) -> ExecutionResult {
        let key = (function.namespace.clone(), function.function_name.clone());
        let Some(f) = self.functions.get(&key) else {
            return Err(ExecutionError::UnknownClientside {
                namespace: function.namespace.clone(),
                function_name: function.function_name.clone(),
            });
        };
        match f(&ClientsideContext { request }) {
            Ok(values) => outputs_to_data(&request.outputs, values),
            Err(ClientsideError::PreventUpdate) => {
                debug!(
                    target: "plexus.backend",
                    output = %request.output,
                    "clientside update prevented"
                );
                Ok(CallbackData::new())
            }
            Err(ClientsideError::Failed(message)) => Err(ExecutionError::Clientside(message)),
        }
    }
}

/// Map returned values onto the declared output shape.
pub fn outputs_to_data(outputs: &Outputs, values: Vec<OutputValue>) -> ExecutionResult {
    let slots = outputs.slots();
    if slots.len() != values.len() {
        return Err(ExecutionError::OutputArity {
            expected: slots.len(),
            got: values.len(),
        });
    }
    let mut data = CallbackData::new();
    let mut put = |id: String, property: &str, value: Value| {
        data.entry(id)
            .or_insert_with(Map::new)
            .insert(property.to_string(), value);
    };
    for (slot, value) in slots.into_iter().zip(values) {
        match (slot, value) {
            (_, OutputValue::NoUpdate) => {}
            (Slot::One(target), OutputValue::Value(v)) => {
                put(target.id.stringify(), &target.property, v);
            }
            (Slot::Many(targets), OutputValue::Many(items)) => {
                if targets.len() != items.len() {
                    return Err(ExecutionError::OutputArity {
                        expected: targets.len(),
                        got: items.len(),
                    });
                }
                for (target, item) in targets.iter().zip(items) {
                    match item {
                        OutputValue::Value(v) => put(target.id.stringify(), &target.property, v),
                        OutputValue::NoUpdate => {}
                        OutputValue::Many(_) => {
                            return Err(ExecutionError::Clientside(format!(
                                "nested list returned for {}.{}",
                                target.id, target.property
                            )));
                        }
                    }
                }
            }
            (Slot::Many(targets), OutputValue::Value(Value::Array(items))) => {
                if targets.len() != items.len() {
                    return Err(ExecutionError::OutputArity {
                        expected: targets.len(),
                        got: items.len(),
                    });
                }
                for (target, v) in targets.iter().zip(items) {
                    put(target.id.stringify(), &target.property, v);
                }
            }
            (Slot::Many(_), OutputValue::Value(_)) | (Slot::One(_), OutputValue::Many(_)) => {
                return Err(ExecutionError::Clientside(
                    "returned value does not match the output shape".into(),
                ));
            }
        }
    }
    Ok(data)
}
