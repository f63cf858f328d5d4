//! Error taxonomy for tracker operations.
//!
//! Remote failures are always typed; no method returns a silent `None`
//! or `false` for an error the caller might need to act on.

use std::collections::BTreeMap;
use thiserror::Error;

fn format_field_errors(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{}: {}", field, message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur while talking to the tracker.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// 401/403 from the tracker, or a missing credential.
    #[error("tracker authentication failed: {message}")]
    Auth {
        /// HTTP status, when the failure came from the wire.
        status: Option<u16>,
        message: String,
    },

    /// 404 for a named resource.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// 400 with field-level messages.
    #[error("validation failed: {}", format_field_errors(field_errors))]
    Validation {
        field_errors: BTreeMap<String, String>,
    },

    /// Any other 4xx/5xx.
    #[error("tracker API error {status}: {}", messages.join("; "))]
    Api {
        status: u16,
        messages: Vec<String>,
        /// Raw body excerpt for diagnostics.
        body: String,
    },

    /// Network or TLS failure before an HTTP status was obtained.
    #[error("connection to tracker failed: {0}")]
    Connection(#[from] reqwest::Error),

    /// Local misconfiguration (bad URL, unknown backend).
    #[error("tracker configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    /// Convenience constructor for a missing credential.
    pub fn missing_credential(what: &str) -> Self {
        Self::Auth {
            status: None,
            message: format!("missing credential: {}", what),
        }
    }

    /// Convenience constructor for a single-field validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field_errors: BTreeMap::from([(field.into(), message.into())]),
        }
    }
}

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
