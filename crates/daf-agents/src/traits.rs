//! Core trait for agent adapters.
//!
//! The `AgentAdapter` trait defines the interface every AI coding tool
//! integration implements. Adapters only describe how to invoke the
//! tool and where its conversation files live; spawning and signal
//! handling are shared in the process module.

use std::path::{Path, PathBuf};

use daf_models::AgentSessionId;

/// Information about an agent adapter.
#[derive(Debug, Clone)]
pub struct AgentInfo {
    /// Unique identifier for this adapter type.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Command used to launch the agent.
    pub command: String,
}

/// Trait for agent adapters.
///
/// Each adapter knows how to:
/// - build the launch and resume command lines for its tool
/// - locate the tool's conversation files, when it writes any
pub trait AgentAdapter: Send + Sync {
    /// Returns information about this adapter.
    fn info(&self) -> &AgentInfo;

    /// Command line to launch a fresh conversation in `work_dir`.
    ///
    /// `prompt` is the assembled initial prompt, when the tool accepts
    /// one on its command line.
    fn launch_command(&self, work_dir: &Path, prompt: Option<&str>) -> (String, Vec<String>);

    /// Command line to resume a known conversation in `work_dir`.
    fn resume_command(
        &self,
        work_dir: &Path,
        agent_session_id: &AgentSessionId,
    ) -> (String, Vec<String>);

    /// Whether this agent writes conversation files the capture
    /// mechanism can observe.
    fn supports_capture(&self) -> bool {
        false
    }

    /// Directory where this agent stores conversation files for
    /// `work_dir`, when capture is supported.
    fn conversation_dir(&self, _work_dir: &Path) -> Option<PathBuf> {
        None
    }

    /// Path of the conversation file for a known agent session id.
    fn conversation_file(&self, work_dir: &Path, id: &AgentSessionId) -> Option<PathBuf> {
        self.conversation_dir(work_dir)
            .map(|dir| dir.join(format!("{}.jsonl", id)))
    }

    /// Encodes an absolute work directory into the flat filename
    /// component the agent uses for its per-project storage.
    fn encode_work_dir(&self, work_dir: &Path) -> String {
        work_dir
            .to_string_lossy()
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == '.' || c == ':' { '-' } else { c })
            .collect()
    }

    /// Whether the agent binary is installed.
    fn is_available(&self) -> bool {
        which::which(&self.info().command).is_ok()
    }
}
