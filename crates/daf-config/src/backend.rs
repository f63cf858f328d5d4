//! Per-backend configuration.
//!
//! Each tracker backend gets its own file under `backends/` holding
//! connection details and the cached field catalog.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::fields::FieldCatalog;
use crate::paths;
use crate::settings::AuthType;

fn default_closed_states() -> Vec<String> {
    ["Done", "Closed", "Resolved", "Review", "Release Pending"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Configuration for one tracker backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Tracker endpoint URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Authentication mode override for this backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<AuthType>,

    /// Default project code for this backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Issue states considered closed; opening a session on an issue in
    /// one of these proposes a transition back to in-progress.
    #[serde(default = "default_closed_states")]
    pub closed_states: Vec<String>,

    /// Cached field catalog; refreshed explicitly.
    #[serde(default)]
    pub field_catalog: FieldCatalog,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth_type: None,
            project: None,
            closed_states: default_closed_states(),
            field_catalog: FieldCatalog::new(),
        }
    }
}

impl BackendConfig {
    /// Loads the configuration for a backend, defaulting when absent.
    pub fn load(root: &Path, backend: &str) -> Result<Self> {
        let path = paths::backend_file(root, backend);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::InvalidConfig { path, source })
    }

    /// Saves the configuration for a backend.
    pub fn save(&self, root: &Path, backend: &str) -> Result<()> {
        let path = paths::backend_file(root, backend);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json + "\n").map_err(|source| ConfigError::WriteError {
            path,
            source,
        })
    }

    /// Returns true if the given tracker state counts as closed.
    ///
    /// Comparison ignores case so workflow spelling differences don't
    /// defeat the reopen prompt.
    pub fn is_closed_state(&self, state: &str) -> bool {
        self.closed_states
            .iter()
            .any(|s| s.eq_ignore_ascii_case(state))
    }
}
