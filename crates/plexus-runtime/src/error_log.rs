#![forbid(unsafe_code)]

//! Front-end and back-end error reports, plus backend connectivity.
//!
//! Every execution failure, circular dependency and configuration diagnostic
//! ends up here with a timestamp. A transport failure clears
//! `backend_connected`; the next successful remote response sets it again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::ErrorKind;

/// One reported error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    /// Resolved id of the callback involved, when there is one.
    pub callback: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Accumulated error reports.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorLog {
    front_end: Vec<ErrorReport>,
    back_end: Vec<ErrorReport>,
    backend_connected: bool,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self {
            front_end: Vec::new(),
            back_end: Vec::new(),
            backend_connected: true,
        }
    }
}

impl ErrorLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, kind: ErrorKind, message: impl Into<String>, callback: Option<&str>) {
        let report = ErrorReport {
            kind,
            message: message.into(),
            callback: callback.map(str::to_string),
            timestamp: Utc::now(),
        };
        warn!(
            target: "plexus.engine",
            kind = ?report.kind,
            callback = report.callback.as_deref().unwrap_or(""),
            detail = %report.message,
            "error reported"
        );
        match kind {
            ErrorKind::FrontEnd => self.front_end.push(report),
            ErrorKind::BackEnd => self.back_end.push(report),
        }
    }

    /// A dependency cycle or runaway chain; always a front-end error.
    pub fn report_circular(&mut self, resolved_id: &str, detail: &str) {
        error!(
            target: "plexus.scheduler",
            callback = resolved_id,
            detail,
            "circular dependency"
        );
        self.report(
            ErrorKind::FrontEnd,
            format!("circular dependency: {detail}"),
            Some(resolved_id),
        );
    }

    #[must_use]
    pub fn front_end(&self) -> &[ErrorReport] {
        &self.front_end
    }

    #[must_use]
    pub fn back_end(&self) -> &[ErrorReport] {
        &self.back_end
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.front_end.len() + self.back_end.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn backend_connected(&self) -> bool {
        self.backend_connected
    }

    pub fn set_backend_connected(&mut self, connected: bool) {
        if self.backend_connected != connected {
            warn!(target: "plexus.backend", connected, "backend connectivity changed");
        }
        self.backend_connected = connected;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_are_split_by_kind() {
        let mut log = ErrorLog::new();
        log.report(ErrorKind::FrontEnd, "clientside boom", Some("a.value"));
        log.report(ErrorKind::BackEnd, "500", None);
        log.report_circular("b.value", "b.value requested itself");
        assert_eq!(log.front_end().len(), 2);
        assert_eq!(log.back_end().len(), 1);
        assert_eq!(log.front_end()[0].callback.as_deref(), Some("a.value"));
        assert!(log.front_end()[1].message.starts_with("circular dependency"));
    }

    #[test]
    fn connectivity_defaults_to_connected() {
        let mut log = ErrorLog::new();
        assert!(log.backend_connected());
        log.set_backend_connected(false);
        assert!(!log.backend_connected());
        log.clear();
        assert!(log.backend_connected());
        assert!(log.is_empty());
    }
}
