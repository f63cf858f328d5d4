//! Claude Code adapter.
//!
//! The only capture-capable adapter: the tool writes one line-delimited
//! JSON conversation file per conversation, named by a stable UUID,
//! under a per-project directory derived from the work directory path.

use std::path::{Path, PathBuf};

use daf_models::AgentSessionId;

use crate::traits::{AgentAdapter, AgentInfo};

/// Adapter for the Claude Code CLI.
pub struct ClaudeAdapter {
    info: AgentInfo,
    storage_root: PathBuf,
}

impl ClaudeAdapter {
    /// Creates the adapter with the default per-user storage root.
    pub fn new() -> Self {
        let storage_root = dirs::home_dir()
            .map(|home| home.join(".claude").join("projects"))
            .unwrap_or_else(|| PathBuf::from(".claude/projects"));
        Self::with_storage_root(storage_root)
    }

    /// Creates the adapter with an explicit storage root (used by tests
    /// and by temp-directory conversation relocation).
    pub fn with_storage_root(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            info: AgentInfo {
                id: "claude".to_string(),
                name: "Claude Code".to_string(),
                command: "claude".to_string(),
            },
            storage_root: storage_root.into(),
        }
    }

    /// The agent's per-user conversation storage root.
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentAdapter for ClaudeAdapter {
    fn info(&self) -> &AgentInfo {
        &self.info
    }

    fn launch_command(&self, _work_dir: &Path, prompt: Option<&str>) -> (String, Vec<String>) {
        let mut args = Vec::new();
        if let Some(prompt) = prompt {
            args.push(prompt.to_string());
        }
        (self.info.command.clone(), args)
    }

    fn resume_command(
        &self,
        _work_dir: &Path,
        agent_session_id: &AgentSessionId,
    ) -> (String, Vec<String>) {
        (
            self.info.command.clone(),
            vec!["--resume".to_string(), agent_session_id.to_string()],
        )
    }

    fn supports_capture(&self) -> bool {
        true
    }

    fn conversation_dir(&self, work_dir: &Path) -> Option<PathBuf> {
        Some(self.storage_root.join(self.encode_work_dir(work_dir)))
    }
}

/// Counts the messages in a line-delimited conversation file.
///
/// The count is observational; the conversation file stays canonical.
/// A missing or unreadable file counts as zero.
pub fn count_messages(conversation_file: &Path) -> u64 {
    std::fs::read_to_string(conversation_file)
        .map(|content| content.lines().filter(|line| !line.trim().is_empty()).count() as u64)
        .unwrap_or(0)
}
