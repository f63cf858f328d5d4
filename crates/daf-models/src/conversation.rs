//! Conversation types.
//!
//! A `Conversation` is the per-repository subordinate of a session. It
//! always holds exactly one active `ConversationContext`; archival moves
//! the active context into the archive and mints a fresh one whose
//! history chains back through the archived agent session ids.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AgentSessionId;

/// The agent-bound state of one conversation, active or archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Identifier the agent assigned to this conversation, once captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<AgentSessionId>,

    /// Absolute path of the project directory the agent runs in.
    pub project_path: PathBuf,

    /// Git branch the conversation works on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Branch the work branch was cut from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,

    /// Remote URL of the repository, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,

    /// When the context was created.
    pub created_at: DateTime<Utc>,

    /// When the context was last active.
    pub last_active_at: DateTime<Utc>,

    /// Observed message count from the agent conversation file.
    ///
    /// Refreshed opportunistically; the conversation file is canonical.
    #[serde(default)]
    pub message_count: u64,

    /// PR/MR URLs created during this context.
    #[serde(default)]
    pub merge_request_urls: Vec<String>,

    /// True once the context has been archived.
    #[serde(default)]
    pub archived: bool,

    /// Summary computed at archival time, when a summarizer is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Agent session ids of prior contexts, oldest first.
    #[serde(default)]
    pub history: Vec<AgentSessionId>,
}

impl ConversationContext {
    /// Creates a fresh context for the given project directory.
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            agent_session_id: None,
            project_path: project_path.into(),
            branch: None,
            base_branch: None,
            remote_url: None,
            created_at: now,
            last_active_at: now,
            message_count: 0,
            merge_request_urls: Vec::new(),
            archived: false,
            summary: None,
            history: Vec::new(),
        }
    }

    /// Binds the captured agent session id.
    ///
    /// The id is bound once and then immutable; returns false if a
    /// different id was already bound.
    pub fn bind_agent_session(&mut self, id: AgentSessionId) -> bool {
        match &self.agent_session_id {
            None => {
                self.agent_session_id = Some(id);
                self.last_active_at = Utc::now();
                true
            }
            Some(existing) => *existing == id,
        }
    }

    /// Updates the last-active timestamp.
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }
}

/// One conversation per repository a session touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// The single non-archived context.
    pub active: ConversationContext,

    /// Prior contexts, oldest first.
    #[serde(default)]
    pub archived: Vec<ConversationContext>,

    /// Repository name (usually the directory name).
    pub repo_name: String,

    /// Path relative to the workspace root, when inside one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,

    /// Throwaway work directory for ticket-creation sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl Conversation {
    /// Creates a conversation with a fresh active context.
    pub fn new(repo_name: impl Into<String>, context: ConversationContext) -> Self {
        Self {
            active: context,
            archived: Vec::new(),
            repo_name: repo_name.into(),
            relative_path: None,
            temp_dir: None,
        }
    }

    /// Archives the active context and mints a new one.
    ///
    /// The new context inherits the project path and branch information;
    /// its history is the archived context's history plus that context's
    /// agent session id (when bound).
    pub fn archive_active(&mut self, summary: Option<String>) {
        let mut old = std::mem::replace(
            &mut self.active,
            ConversationContext::new(PathBuf::new()),
        );
        old.archived = true;
        old.summary = summary;

        let mut history = old.history.clone();
        if let Some(id) = &old.agent_session_id {
            history.push(id.clone());
        }

        let mut fresh = ConversationContext::new(old.project_path.clone());
        fresh.branch = old.branch.clone();
        fresh.base_branch = old.base_branch.clone();
        fresh.remote_url = old.remote_url.clone();
        fresh.history = history;

        self.archived.push(old);
        self.active = fresh;
    }

    /// Iterates over all contexts, active first.
    pub fn contexts(&self) -> impl Iterator<Item = &ConversationContext> {
        std::iter::once(&self.active).chain(self.archived.iter())
    }

    /// Iterates over every bound agent session id in this conversation.
    pub fn agent_session_ids(&self) -> impl Iterator<Item = &AgentSessionId> {
        self.contexts().filter_map(|c| c.agent_session_id.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation::new("repo", ConversationContext::new("/work/repo"))
    }

    #[test]
    fn test_bind_agent_session_once() {
        let mut ctx = ConversationContext::new("/work/repo");
        assert!(ctx.bind_agent_session(AgentSessionId::new("a1")));
        // Re-binding the same id is a no-op, a different id is refused
        assert!(ctx.bind_agent_session(AgentSessionId::new("a1")));
        assert!(!ctx.bind_agent_session(AgentSessionId::new("a2")));
        assert_eq!(ctx.agent_session_id, Some(AgentSessionId::new("a1")));
    }

    #[test]
    fn test_archive_active_chains_history() {
        let mut conv = conversation();
        conv.active.bind_agent_session(AgentSessionId::new("a1"));
        conv.active.branch = Some("feat/x".to_string());

        conv.archive_active(Some("did things".to_string()));

        assert_eq!(conv.archived.len(), 1);
        assert!(conv.archived[0].archived);
        assert_eq!(conv.archived[0].summary.as_deref(), Some("did things"));
        assert!(!conv.active.archived);
        assert!(conv.active.agent_session_id.is_none());
        assert_eq!(conv.active.branch.as_deref(), Some("feat/x"));
        assert_eq!(conv.active.history, vec![AgentSessionId::new("a1")]);
    }

    #[test]
    fn test_archive_twice_extends_history() {
        let mut conv = conversation();
        conv.active.bind_agent_session(AgentSessionId::new("a1"));
        conv.archive_active(None);
        conv.active.bind_agent_session(AgentSessionId::new("a2"));
        conv.archive_active(None);

        assert_eq!(conv.archived.len(), 2);
        assert_eq!(
            conv.active.history,
            vec![AgentSessionId::new("a1"), AgentSessionId::new("a2")]
        );
    }

    #[test]
    fn test_archive_unbound_context_adds_no_history() {
        let mut conv = conversation();
        conv.archive_active(None);
        assert!(conv.active.history.is_empty());
    }

    #[test]
    fn test_agent_session_ids_covers_archive() {
        let mut conv = conversation();
        conv.active.bind_agent_session(AgentSessionId::new("a1"));
        conv.archive_active(None);
        conv.active.bind_agent_session(AgentSessionId::new("a2"));

        let ids: Vec<_> = conv.agent_session_ids().map(|i| i.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a1"]);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut conv = conversation();
        conv.active.bind_agent_session(AgentSessionId::new("a1"));
        conv.temp_dir = Some(PathBuf::from("/tmp/daf-xyz"));

        let json = serde_json::to_string(&conv).unwrap();
        let back: Conversation = serde_json::from_str(&json).unwrap();

        assert_eq!(back.repo_name, conv.repo_name);
        assert_eq!(back.active.agent_session_id, conv.active.agent_session_id);
        assert_eq!(back.temp_dir, conv.temp_dir);
    }
}
