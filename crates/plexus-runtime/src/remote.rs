#![forbid(unsafe_code)]

//! Remote backend: POSTs the request to the update endpoint on a worker
//! thread and reports through a one-shot channel.
//!
//! # Failure Modes
//!
//! | Condition                    | Result                                   |
//! |------------------------------|------------------------------------------|
//! | HTTP 204                     | `Ok` with empty data (update prevented)  |
//! | other 2xx                    | body parsed as `{"response": {...}}`     |
//! | non-2xx                      | `ExecutionError::Server`                 |
//! | unparseable 2xx body         | `ExecutionError::InvalidResponse`        |
//! | transport failure            | `ExecutionError::Connection`             |
//! | worker could not be spawned  | `ExecutionError::Connection`, immediate  |
//!
//! No timeout is applied; a hung request keeps its slot until the scheduler
//! drops the handle.

use std::sync::Arc;
use std::sync::mpsc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::callback::Callback;
use crate::error::ExecutionError;
use crate::executor::{CallbackData, CallbackRequest, Execution, ExecutionResult, PendingExecution};
use crate::transport::{HttpResponse, HttpTransport};

const MAX_ERROR_BODY: usize = 512;

#[derive(Deserialize)]
struct UpdateResponse {
    #[serde(default)]
    response: CallbackData,
}

/// Interpret an update endpoint response.
pub fn parse_update_response(response: &HttpResponse) -> ExecutionResult {
    if response.status == 204 {
        return Ok(CallbackData::new());
    }
    if !response.is_success() {
        let mut message = response.body.clone();
        if message.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        return Err(ExecutionError::Server {
            status: response.status,
            message,
        });
    }
    serde_json::from_str::<UpdateResponse>(&response.body)
        .map(|r| r.response)
        .map_err(|e| ExecutionError::InvalidResponse(e.to_string()))
}

/// Server-side execution over an [`HttpTransport`].
#[derive(Clone)]
pub struct RemoteBackend {
    transport: Arc<dyn HttpTransport>,
    url: String,
}

impl std::fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBackend").field("url", &self.url).finish()
    }
}

impl RemoteBackend {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn execute(&self, callback: &Callback, request: CallbackRequest) -> Execution {
        let body = match serde_json::to_string(&request) {
            Ok(body) => body,
            Err(e) => return Execution::Ready(Err(ExecutionError::InvalidResponse(e.to_string()))),
        };
        let (tx, rx) = mpsc::channel();
        let pending = PendingExecution::new(rx);
        let task = pending.task;
        let transport = Arc::clone(&self.transport);
        let url = self.url.clone();
        let resolved_id = callback.resolved_id().to_string();

        let spawned = std::thread::Builder::new()
            .name(format!("plexus-remote-{}", task.0))
            .spawn(move || {
                let result = match transport.post_json(&url, &body) {
                    Ok(response) => parse_update_response(&response),
                    Err(e) => Err(ExecutionError::Connection(e.to_string())),
                };
                debug!(
                    target: "plexus.backend",
                    task = task.0,
                    callback = %resolved_id,
                    ok = result.is_ok(),
                    "remote execution settled"
                );
                if tx.send(result).is_err() {
                    debug!(target: "plexus.backend", task = task.0, "result receiver dropped");
                }
            });
        match spawned {
            Ok(_) => Execution::Pending(pending),
            Err(e) => {
                warn!(target: "plexus.backend", error = %e, "failed to spawn remote worker");
                Execution::Ready(Err(ExecutionError::Connection(e.to_string())))
            }
        }
    }
}
