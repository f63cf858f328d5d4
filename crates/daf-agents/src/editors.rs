//! Editor-hosted agent adapters.
//!
//! VS Code + Copilot, Cursor, and Windsurf all launch by opening the
//! work directory in the editor. None of them expose parseable
//! conversation files, so `supports_capture` stays false and the
//! session manager synthesizes a local identifier instead.

use std::path::Path;

use daf_models::AgentSessionId;

use crate::traits::{AgentAdapter, AgentInfo};

/// Adapter for editor-hosted agents.
pub struct EditorAdapter {
    info: AgentInfo,
}

impl EditorAdapter {
    /// VS Code with Copilot.
    pub fn vscode() -> Self {
        Self {
            info: AgentInfo {
                id: "vscode".to_string(),
                name: "VS Code + Copilot".to_string(),
                command: "code".to_string(),
            },
        }
    }

    /// Cursor.
    pub fn cursor() -> Self {
        Self {
            info: AgentInfo {
                id: "cursor".to_string(),
                name: "Cursor".to_string(),
                command: "cursor".to_string(),
            },
        }
    }

    /// Windsurf.
    pub fn windsurf() -> Self {
        Self {
            info: AgentInfo {
                id: "windsurf".to_string(),
                name: "Windsurf".to_string(),
                command: "windsurf".to_string(),
            },
        }
    }
}

impl AgentAdapter for EditorAdapter {
    fn info(&self) -> &AgentInfo {
        &self.info
    }

    fn launch_command(&self, work_dir: &Path, _prompt: Option<&str>) -> (String, Vec<String>) {
        // Editors take no prompt argument; the prompt is surfaced to the
        // user through the session notes instead
        (
            self.info.command.clone(),
            vec![work_dir.to_string_lossy().to_string()],
        )
    }

    fn resume_command(
        &self,
        work_dir: &Path,
        _agent_session_id: &AgentSessionId,
    ) -> (String, Vec<String>) {
        // Editors have no resume concept; reopening the directory is it
        self.launch_command(work_dir, None)
    }
}
