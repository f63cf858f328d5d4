//! Safety guard.
//!
//! A mutating command run from within a spawned agent risks nested
//! sessions, concurrent index updates, and corruption of the very
//! conversation file the agent is writing. Detection relies exclusively
//! on the `INSIDE_AGENT=1` environment contract set by the agent
//! spawner; no parent-process probing.

use daf_agents::INSIDE_AGENT_ENV;

use crate::error::{CoreError, Result};

/// Every operation the command surface can invoke, classified for the
/// guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    // Mutating
    New,
    Open,
    Complete,
    Delete,
    Link,
    Unlink,
    NoteAdd,
    Pause,
    Resume,
    Sync,
    Investigate,
    JiraNew,
    Export,
    Import,
    Backup,
    Restore,
    Maintenance,
    // Read-only
    List,
    Info,
    Status,
    Active,
    NotesView,
    Time,
    ConfigShow,
    JiraView,
    JiraCreate,
    JiraUpdate,
    JiraFields,
}

impl Operation {
    /// True for operations that write to the session store.
    ///
    /// `JiraCreate`/`JiraUpdate` only touch the remote tracker, never
    /// the local store, so they stay allowed inside an agent (the
    /// ticket-creation flow depends on that).
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::New
                | Self::Open
                | Self::Complete
                | Self::Delete
                | Self::Link
                | Self::Unlink
                | Self::NoteAdd
                | Self::Pause
                | Self::Resume
                | Self::Sync
                | Self::Investigate
                | Self::JiraNew
                | Self::Export
                | Self::Import
                | Self::Backup
                | Self::Restore
                | Self::Maintenance
        )
    }

    /// Operation name used in refusal messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Open => "open",
            Self::Complete => "complete",
            Self::Delete => "delete",
            Self::Link => "link",
            Self::Unlink => "unlink",
            Self::NoteAdd => "note add",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Sync => "sync",
            Self::Investigate => "investigate",
            Self::JiraNew => "jira new",
            Self::Export => "export",
            Self::Import => "import",
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Maintenance => "maintenance",
            Self::List => "list",
            Self::Info => "info",
            Self::Status => "status",
            Self::Active => "active",
            Self::NotesView => "notes",
            Self::Time => "time",
            Self::ConfigShow => "config show",
            Self::JiraView => "jira view",
            Self::JiraCreate => "jira create",
            Self::JiraUpdate => "jira update",
            Self::JiraFields => "jira fields",
        }
    }
}

/// Refuses mutating operations inside a spawned agent.
#[derive(Debug, Clone, Copy)]
pub struct SafetyGuard {
    inside_agent: bool,
}

impl SafetyGuard {
    /// Builds the guard from the process environment.
    pub fn from_env() -> Self {
        Self {
            inside_agent: std::env::var(INSIDE_AGENT_ENV).is_ok_and(|v| v == "1"),
        }
    }

    /// Builds a guard with an explicit detection result (tests).
    pub fn new(inside_agent: bool) -> Self {
        Self { inside_agent }
    }

    /// True when running inside a spawned agent.
    pub fn inside_agent(&self) -> bool {
        self.inside_agent
    }

    /// Checks an operation at its entry point.
    ///
    /// # Errors
    /// `SafetyRefused` for mutating operations inside an agent; the
    /// message names the triggering variable.
    pub fn ensure_allowed(&self, operation: Operation) -> Result<()> {
        if self.inside_agent && operation.is_mutating() {
            return Err(CoreError::SafetyRefused(format!(
                "'{}' is a mutating command and cannot run inside agent ({}=1 is set); \
                 exit the agent first",
                operation.name(),
                INSIDE_AGENT_ENV
            )));
        }
        Ok(())
    }
}
