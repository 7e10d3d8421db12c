#![forbid(unsafe_code)]

//! plexus runtime
//!
//! Schedules the callbacks of a [`DependencyGraph`](plexus_graph::DependencyGraph)
//! against a live layout: which callbacks a change requests, in what order
//! they may run, where they run, and how their outputs flow back.
//!
//! # Key Components
//!
//! - [`Engine`] - owns graph, layout, path registry and scheduler
//! - [`Scheduler`] - observer loop over the callback state store
//! - [`CallbackStore`] - lifecycle buckets and their reducer
//! - [`ExecutionBackend`] - where callbacks run; [`BackendRouter`] splits
//!   clientside functions from the remote server
//! - [`ErrorLog`] - front-end and back-end error reports
//!
//! # How it fits in the system
//! `plexus-core` supplies ids, patterns and the path registry,
//! `plexus-graph` the validated graph and instance resolution. This crate
//! turns both into behavior. Nothing here blocks except
//! [`Engine::run_until_idle`] and [`Engine::start`].

pub mod callback;
pub mod clientside;
pub mod config;
pub mod engine;
pub mod error;
pub mod error_log;
pub mod executor;
pub mod factory;
pub mod history;
pub mod metrics;
pub mod observer;
pub mod persistence;
pub mod remote;
pub mod scheduler;
pub mod store;
pub mod transport;

pub use callback::{Callback, ChangeKind, ExecutionGroup, ExecutionMeta, InstanceId};
pub use clientside::{ClientsideContext, ClientsideError, ClientsideRegistry, OutputValue};
pub use config::EngineConfig;
pub use engine::{Engine, Lifecycle};
pub use error::{ConfigError, EngineError, ErrorKind, ExecutionError, TransportError};
pub use error_log::{ErrorLog, ErrorReport};
pub use executor::{
    BackendRouter, CallbackData, CallbackRequest, Execution, ExecutionBackend, ExecutionResult,
    PendingExecution,
};
pub use history::{InteractionHistory, UserEdit};
pub use persistence::{NoPersistence, PersistenceAdapter};
pub use remote::RemoteBackend;
pub use scheduler::{Scheduler, SchedulerContext};
pub use store::{Bucket, CallbackAction, CallbackState, CallbackStore, reduce};
#[cfg(feature = "http")]
pub use transport::ReqwestTransport;
pub use transport::{HttpResponse, HttpTransport};
