#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! [`EngineConfig`] can be loaded from TOML or JSON; every field has a default
//! so partial files are fine.
//!
//! ```toml
//! # plexus.toml
//! requests_pathname_prefix = "/app/"
//! max_concurrent = 4
//! ```
//!
//! ```rust,ignore
//! let config = EngineConfig::from_toml_file("plexus.toml")?;
//! let config = EngineConfig::from_json_str(json)?;
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for the engine and its backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// URL prefix every endpoint is appended to. Must end with '/'.
    pub requests_pathname_prefix: String,
    pub update_endpoint: String,
    pub dependencies_endpoint: String,
    pub layout_endpoint: String,
    /// Upper bound on callbacks executing or awaiting a result at once.
    pub max_concurrent: usize,
    /// Longest predecessor chain before a callback is treated as runaway.
    pub max_chain_depth: usize,
    /// Observer passes per pump before the loop gives up for this pump.
    pub max_observer_passes: usize,
    /// Sleep between polls in `run_until_idle`.
    pub poll_interval_ms: u64,
    /// Undo entries kept for user writes.
    pub history_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            requests_pathname_prefix: "/".into(),
            update_endpoint: "_dash-update-component".into(),
            dependencies_endpoint: "_dash-dependencies".into(),
            layout_endpoint: "_dash-layout".into(),
            max_concurrent: 12,
            max_chain_depth: 256,
            max_observer_passes: 10_000,
            poll_interval_ms: 1,
            history_depth: 100,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a TOML file on disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Returns a list of problems; empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.requests_pathname_prefix.ends_with('/') {
            errors.push(format!(
                "requests_pathname_prefix must end with '/', got {:?}",
                self.requests_pathname_prefix
            ));
        }
        for (name, value) in [
            ("update_endpoint", &self.update_endpoint),
            ("dependencies_endpoint", &self.dependencies_endpoint),
            ("layout_endpoint", &self.layout_endpoint),
        ] {
            if value.is_empty() {
                errors.push(format!("{name} must not be empty"));
            }
        }
        if self.max_concurrent == 0 {
            errors.push("max_concurrent must be > 0".into());
        }
        if self.max_chain_depth == 0 {
            errors.push("max_chain_depth must be > 0".into());
        }
        if self.max_observer_passes == 0 {
            errors.push("max_observer_passes must be > 0".into());
        }
        errors
    }

    /// `validate()` as a `Result`.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    #[must_use]
    pub fn update_url(&self) -> String {
        format!("{}{}", self.requests_pathname_prefix, self.update_endpoint)
    }

    #[must_use]
    pub fn dependencies_url(&self) -> String {
        format!("{}{}", self.requests_pathname_prefix, self.dependencies_endpoint)
    }

    #[must_use]
    pub fn layout_url(&self) -> String {
        format!("{}{}", self.requests_pathname_prefix, self.layout_endpoint)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.update_url(), "/_dash-update-component");
        assert_eq!(config.max_concurrent, 12);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
requests_pathname_prefix = "/app/"
max_concurrent = 3
"#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.layout_url(), "/app/_dash-layout");
        assert_eq!(config.history_depth, 100);
    }

    #[test]
    fn json_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_chain_depth": 8, "poll_interval_ms": 5}}"#).unwrap();
        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_chain_depth, 8);
        assert_eq!(config.poll_interval(), Duration::from_millis(5));
    }

    #[test]
    fn toml_file_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::from_toml_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn validate_reports_every_problem() {
        let config = EngineConfig {
            requests_pathname_prefix: "/app".into(),
            max_concurrent: 0,
            update_endpoint: String::new(),
            ..EngineConfig::default()
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 3);
        assert!(matches!(
            config.validated(),
            Err(ConfigError::Validation(list)) if list.len() == 3
        ));
    }

    #[test]
    fn bad_toml_is_reported() {
        assert!(matches!(
            EngineConfig::from_toml_str("max_concurrent = \"many\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
