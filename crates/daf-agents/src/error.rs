//! Error types for agent operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while launching or observing an agent.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The agent binary is not installed or not on PATH.
    #[error("agent binary '{command}' not found for {agent}")]
    MissingBinary { agent: String, command: String },

    /// The agent process could not be spawned.
    #[error("failed to launch {agent}: {source}")]
    Launch {
        agent: String,
        #[source]
        source: std::io::Error,
    },

    /// No conversation file appeared within the capture deadline.
    #[error("agent conversation was not captured within {seconds}s")]
    CaptureTimeout { seconds: u64 },

    /// The selected agent writes no parseable conversation files.
    #[error("conversation capture is not supported by {0}")]
    CaptureUnsupported(String),

    /// Filesystem failure while observing conversation files.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unknown agent name in configuration.
    #[error("unknown agent '{0}'")]
    UnknownAgent(String),
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
