//! Session types.
//!
//! A `Session` is the top-level unit of work, usually tied to one tracker
//! issue. It owns a map of per-repository conversations, an ordered list
//! of work intervals, and the time-tracking state machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::Conversation;
use crate::ids::IssueKey;
use crate::CURRENT_SCHEMA_VERSION;

/// Status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session exists but no work interval has been opened yet.
    #[default]
    Created,
    /// Session has at least one work interval and is not paused.
    InProgress,
    /// Work is suspended.
    Paused,
    /// Session is finished. Terminal.
    Complete,
}

impl SessionStatus {
    /// Returns true for terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// What kind of work a session represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Regular development work in a repository.
    #[default]
    Development,
    /// Drafting a tracker issue in a throwaway directory.
    TicketCreation,
    /// Read-only investigation; notes and time tracking only.
    Investigation,
}

impl SessionType {
    /// Development sessions must always carry at least one conversation.
    pub fn requires_conversation(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Whether git branch/commit/PR steps apply to this session type.
    pub fn uses_git(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Time-tracking state within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeTrackingState {
    /// No open work interval.
    #[default]
    Paused,
    /// Exactly one open work interval.
    Running,
}

/// One contiguous stretch of active work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSession {
    /// When the interval opened.
    pub started_at: DateTime<Utc>,

    /// When the interval closed; open while `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// OS user who owned the interval.
    pub user: String,
}

impl WorkSession {
    /// Opens a new interval starting now.
    pub fn open(user: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            ended_at: None,
            user: user.into(),
        }
    }

    /// Returns true while the interval has no end.
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Duration of the interval; open intervals are measured against `now`.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.ended_at.unwrap_or(now) - self.started_at
    }
}

/// Minimal per-session entry stored in the index file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// Unique session name.
    pub name: String,

    /// Bound tracker issue, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_key: Option<IssueKey>,

    /// Session status.
    pub status: SessionStatus,

    /// Session type.
    pub session_type: SessionType,

    /// One-line goal.
    pub goal: String,

    /// When the session was last active.
    pub last_active_at: DateTime<Utc>,
}

/// The persistent work record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Persisted schema version; see the persistence crate's migrators.
    pub schema_version: u32,

    /// Unique name across the store.
    pub name: String,

    /// Bound tracker issue, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_key: Option<IssueKey>,

    /// What the session sets out to do.
    pub goal: String,

    /// Current status.
    pub status: SessionStatus,

    /// What kind of work this is.
    pub session_type: SessionType,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the session was last active.
    pub last_active_at: DateTime<Utc>,

    /// Ordered work intervals.
    #[serde(default)]
    pub work_sessions: Vec<WorkSession>,

    /// Time-tracking state; `Running` implies one open interval.
    #[serde(default)]
    pub time_state: TimeTrackingState,

    /// Conversations keyed by working-directory identifier.
    #[serde(default)]
    pub conversations: BTreeMap<String, Conversation>,

    /// Key into `conversations` for the currently active directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_working_directory: Option<String>,

    /// Workspace root this session's repositories live under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,

    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Template the session was created from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Session-local configuration overrides (lowest-precedence layer).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub config_overrides: serde_json::Map<String, serde_json::Value>,
}

impl Session {
    /// Creates a new session with no conversations.
    pub fn new(name: impl Into<String>, goal: impl Into<String>, session_type: SessionType) -> Self {
        let now = Utc::now();
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            name: name.into(),
            issue_key: None,
            goal: goal.into(),
            status: SessionStatus::Created,
            session_type,
            created_at: now,
            last_active_at: now,
            work_sessions: Vec::new(),
            time_state: TimeTrackingState::Paused,
            conversations: BTreeMap::new(),
            active_working_directory: None,
            workspace: None,
            tags: Vec::new(),
            template: None,
            config_overrides: serde_json::Map::new(),
        }
    }

    /// Updates the last-active timestamp.
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    /// Adds a conversation and makes its directory the active one.
    pub fn add_conversation(&mut self, work_dir: impl Into<String>, conversation: Conversation) {
        let key = work_dir.into();
        self.conversations.insert(key.clone(), conversation);
        self.active_working_directory = Some(key);
        self.touch();
    }

    /// Returns the conversation for the active working directory.
    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_working_directory
            .as_ref()
            .and_then(|dir| self.conversations.get(dir))
    }

    /// Mutable access to the conversation for the active working directory.
    pub fn active_conversation_mut(&mut self) -> Option<&mut Conversation> {
        let dir = self.active_working_directory.clone()?;
        self.conversations.get_mut(&dir)
    }

    /// Opens a work interval and flips the status machine forward.
    ///
    /// A no-op when an interval is already open.
    pub fn start_work(&mut self, user: impl Into<String>) {
        if self.time_state == TimeTrackingState::Running {
            return;
        }
        self.work_sessions.push(WorkSession::open(user));
        self.time_state = TimeTrackingState::Running;
        if self.status == SessionStatus::Created || self.status == SessionStatus::Paused {
            self.status = SessionStatus::InProgress;
        }
        self.touch();
    }

    /// Closes the open work interval, if any.
    pub fn close_open_work_session(&mut self, now: DateTime<Utc>) {
        if let Some(open) = self.work_sessions.iter_mut().find(|w| w.is_open()) {
            open.ended_at = Some(now);
        }
        self.time_state = TimeTrackingState::Paused;
        self.touch();
    }

    /// Total tracked time: closed intervals plus the open one against `now`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        self.work_sessions
            .iter()
            .fold(Duration::zero(), |acc, w| acc + w.duration(now))
    }

    /// Builds the minimal index entry for this session.
    pub fn descriptor(&self) -> SessionDescriptor {
        SessionDescriptor {
            name: self.name.clone(),
            issue_key: self.issue_key.clone(),
            status: self.status,
            session_type: self.session_type,
            goal: self.goal.clone(),
            last_active_at: self.last_active_at,
        }
    }

    /// Checks the session-local invariants; returns one message per
    /// violation, empty when the session is consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        // Sessions minted by sync have no conversation until first open
        if self.conversations.is_empty()
            && self.session_type.requires_conversation()
            && self.status != SessionStatus::Created
        {
            violations.push(format!(
                "development session '{}' has no conversations",
                self.name
            ));
        }

        if let Some(dir) = &self.active_working_directory {
            if !self.conversations.contains_key(dir) {
                violations.push(format!(
                    "active working directory '{}' has no conversation entry",
                    dir
                ));
            }
        }

        for (dir, conv) in &self.conversations {
            if conv.active.archived {
                violations.push(format!("conversation '{}' has an archived active context", dir));
            }
            if let Some(stale) = conv.archived.iter().find(|c| !c.archived) {
                violations.push(format!(
                    "conversation '{}' holds an unarchived context in its archive ({})",
                    dir,
                    stale
                        .agent_session_id
                        .as_ref()
                        .map(|i| i.as_str())
                        .unwrap_or("unbound")
                ));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for conv in self.conversations.values() {
            for id in conv.agent_session_ids() {
                if !seen.insert(id.as_str()) {
                    violations.push(format!("duplicate agent session id '{}'", id));
                }
            }
        }

        let open = self.work_sessions.iter().filter(|w| w.is_open()).count();
        if open > 1 {
            violations.push(format!("{} work intervals are open at once", open));
        }
        if open == 1 && self.time_state != TimeTrackingState::Running {
            violations.push("open work interval while time tracking is paused".to_string());
        }
        if open == 0 && self.time_state == TimeTrackingState::Running {
            violations.push("time tracking running with no open work interval".to_string());
        }
        if self.status == SessionStatus::Complete && open > 0 {
            violations.push("complete session has an open work interval".to_string());
        }

        violations
    }
}
