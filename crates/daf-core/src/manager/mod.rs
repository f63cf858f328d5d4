//! The session manager.
//!
//! `SessionManager` composes the store, tracker, agent registry, and
//! configuration, and is the only writer of durable session state.
//! Mutations acquire the store lock, mutate in memory, write
//! atomically, and release; remote calls run outside the lock with a
//! second locked step for remote-derived fields.

mod lifecycle;
mod tracker_ops;
#[cfg(test)]
mod tests;

pub use lifecycle::{CompleteOptions, CompleteReport, NewSessionParams};
pub use tracker_ops::SyncReport;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, warn};

use daf_agents::{
    run_interactive, spawn_capture, AgentRegistry, CaptureConfig, CaptureOutcome, SESSION_ID_ENV,
};
use daf_config::{paths, BackendConfig, Settings};
use daf_models::{AgentSessionId, Note, Session, SessionDescriptor};
use daf_persistence::{SessionStore, StoreLock};
use daf_tracker::{IssueTracker, MOCK_MODE_ENV};

use crate::error::{CoreError, Result};
use crate::guard::SafetyGuard;
use crate::interact::Interactor;
use crate::prompt::{self, PromptInputs};
use crate::summarize::{summarizer_for, ConversationSummarizer};
use crate::time::TimeTracker;

/// Orchestrates sessions across store, tracker, and agents.
pub struct SessionManager {
    store: SessionStore,
    root: PathBuf,
    settings: Settings,
    backend: BackendConfig,
    tracker: Arc<dyn IssueTracker>,
    agents: AgentRegistry,
    guard: SafetyGuard,
    interactor: Box<dyn Interactor>,
    summarizer: Box<dyn ConversationSummarizer>,
    capture_config: CaptureConfig,
    launch_agents: bool,
}

impl SessionManager {
    /// Builds a manager rooted at the given store directory.
    ///
    /// Agent spawning is suppressed automatically under
    /// `DAF_MOCK_MODE=1`; capture still runs so tests can exercise it.
    pub fn new(
        root: impl Into<PathBuf>,
        settings: Settings,
        backend: BackendConfig,
        tracker: Arc<dyn IssueTracker>,
        interactor: Box<dyn Interactor>,
    ) -> Self {
        let root = root.into();
        let launch_agents = !std::env::var(MOCK_MODE_ENV).is_ok_and(|v| v == "1");
        let summarizer = summarizer_for(settings.summary_mode);
        Self {
            store: SessionStore::new(&root),
            root,
            settings,
            backend,
            tracker,
            agents: AgentRegistry::new(),
            guard: SafetyGuard::from_env(),
            interactor,
            summarizer,
            capture_config: CaptureConfig::default(),
            launch_agents,
        }
    }

    /// Replaces the safety guard (tests).
    pub fn with_guard(mut self, guard: SafetyGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Replaces the agent registry (tests inject adapters with
    /// redirected storage roots).
    pub fn with_agents(mut self, agents: AgentRegistry) -> Self {
        self.agents = agents;
        self
    }

    /// Replaces the capture configuration.
    pub fn with_capture_config(mut self, config: CaptureConfig) -> Self {
        self.capture_config = config;
        self
    }

    /// Replaces the summarizer.
    pub fn with_summarizer(mut self, summarizer: Box<dyn ConversationSummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Never spawn a real agent process (tests).
    pub fn suppress_agent_launch(mut self) -> Self {
        self.launch_agents = false;
        self
    }

    /// The store this manager writes to.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// The resolved settings in effect.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The cached tracker field catalog.
    pub fn field_catalog(&self) -> &daf_config::FieldCatalog {
        &self.backend.field_catalog
    }

    // ---- read-only operations -------------------------------------------

    /// Lists all sessions, most recently active first.
    pub fn list(&self) -> Result<Vec<SessionDescriptor>> {
        let report = self.store.load_all()?;
        for broken in &report.broken {
            warn!(
                session = %broken.name,
                quarantined = %broken.quarantined_to.display(),
                "skipping corrupt session"
            );
        }
        let mut descriptors: Vec<SessionDescriptor> =
            report.sessions.iter().map(Session::descriptor).collect();
        descriptors.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        Ok(descriptors)
    }

    /// Loads a session with its notes.
    pub fn info(&self, name_or_key: &str) -> Result<(Session, Vec<Note>)> {
        let session = self.resolve_session(name_or_key)?;
        let notes = self.store.read_notes(&session.name)?;
        Ok((session, notes))
    }

    /// Notes log of a session.
    pub fn notes(&self, name_or_key: &str) -> Result<Vec<Note>> {
        let session = self.resolve_session(name_or_key)?;
        Ok(self.store.read_notes(&session.name)?)
    }

    /// Total tracked time of a session.
    pub fn elapsed(&self, name_or_key: &str) -> Result<Duration> {
        let session = self.resolve_session(name_or_key)?;
        Ok(TimeTracker::elapsed(&session))
    }

    /// Name of the session this process runs inside, when spawned by an
    /// agent launch.
    pub fn active_session_name() -> Option<String> {
        std::env::var(SESSION_ID_ENV).ok().filter(|v| !v.is_empty())
    }

    /// Resolves a session reference: exact name first, then bound issue
    /// key, then unique name prefix (latest-active wins).
    pub fn resolve_session(&self, name_or_key: &str) -> Result<Session> {
        if self.store.exists(name_or_key) {
            return Ok(self.store.load(name_or_key)?);
        }

        let report = self.store.load_all()?;
        if let Some(session) = report
            .sessions
            .iter()
            .find(|s| s.issue_key.as_ref().is_some_and(|k| k.as_str() == name_or_key))
        {
            return Ok(session.clone());
        }

        report
            .sessions
            .into_iter()
            .filter(|s| s.name.starts_with(name_or_key))
            .max_by_key(|s| s.last_active_at)
            .ok_or_else(|| CoreError::NotFound(name_or_key.to_string()))
    }

    // ---- shared plumbing -------------------------------------------------

    /// Validates invariants and writes the session under the store lock.
    pub(crate) fn persist(&self, session: &Session) -> Result<()> {
        let violations = session.invariant_violations();
        if !violations.is_empty() {
            return Err(CoreError::Corruption(violations.join("; ")));
        }
        let _lock = StoreLock::acquire(self.store.root())?;
        self.store.save(session)?;
        Ok(())
    }

    /// Assembles the initial prompt for a session.
    fn build_prompt(&self, session: &Session) -> String {
        let context_files = paths::context_files(&self.root);
        let ticket = session
            .issue_key
            .as_ref()
            .and_then(|key| self.tracker.get_ticket_detailed(key).ok());
        let adapter_reads_files = self
            .agents
            .get(&self.settings.agent)
            .map(|a| a.supports_capture())
            .unwrap_or(false);
        prompt::assemble(&PromptInputs {
            context_files: &context_files,
            ticket: ticket.as_ref(),
            goal: &session.goal,
            session_type: session.session_type,
            agent_reads_files: adapter_reads_files,
        })
    }

    /// Launches or resumes the agent for the session's active
    /// conversation, binding the captured conversation id afterwards.
    ///
    /// When the active context already has an id the agent is resumed
    /// and capture is skipped. Otherwise capture watches the agent's
    /// conversation directory; on timeout the user is asked for the id
    /// (which fails `NeedsInteractive` in JSON mode).
    pub(crate) fn run_agent_flow(&self, session: &mut Session) -> Result<()> {
        let Some(conversation) = session.active_conversation() else {
            return Ok(());
        };
        let adapter = self.agents.get(&self.settings.agent)?;
        let work_dir = conversation.active.project_path.clone();
        let known_id = conversation.active.agent_session_id.clone();

        let outcome = if let Some(id) = known_id {
            let (command, args) = adapter.resume_command(&work_dir, &id);
            self.spawn_agent(session, &command, &args, &work_dir)?
        } else {
            let prompt = self.build_prompt(session);
            let capture = if adapter.supports_capture() {
                adapter.conversation_dir(&work_dir).map(|dir| {
                    let existing = daf_agents::capture::snapshot(&dir);
                    spawn_capture(dir, existing, self.capture_config)
                })
            } else {
                None
            };

            let (command, args) = adapter.launch_command(&work_dir, Some(prompt.as_str()));
            let outcome = self.spawn_agent(session, &command, &args, &work_dir)?;

            let id = match capture {
                Some(handle) => match handle.wait() {
                    CaptureOutcome::Captured(id) => id,
                    CaptureOutcome::TimedOut => {
                        let entered = self.interactor.input(
                            "the agent conversation id was not captured; enter it manually",
                        )?;
                        AgentSessionId::new(entered.trim())
                    }
                },
                None => AgentSessionId::synthesized(),
            };

            let context = &mut session
                .active_conversation_mut()
                .ok_or_else(|| CoreError::Corruption("active conversation vanished".to_string()))?
                .active;
            if !context.bind_agent_session(id.clone()) {
                return Err(CoreError::Corruption(format!(
                    "conversation already bound to a different agent session than {}",
                    id
                )));
            }
            outcome
        };

        self.refresh_message_count(session);

        if let Some(outcome) = outcome {
            // The agent ran and exited; the work interval closes with it
            TimeTracker::stop(session);
            self.persist(session)?;
            if outcome.interrupted {
                return Err(CoreError::Interrupted);
            }
        } else {
            self.persist(session)?;
        }
        Ok(())
    }

    /// Spawns the agent unless launches are suppressed.
    fn spawn_agent(
        &self,
        session: &Session,
        command: &str,
        args: &[String],
        work_dir: &std::path::Path,
    ) -> Result<Option<daf_agents::SpawnOutcome>> {
        if !self.launch_agents {
            debug!(session = %session.name, "agent launch suppressed");
            return Ok(None);
        }
        let outcome = run_interactive(
            &self.settings.agent,
            command,
            args,
            work_dir,
            &session.name,
            &[],
        )?;
        Ok(Some(outcome))
    }

    /// Refreshes the observed message count from the conversation file.
    fn refresh_message_count(&self, session: &mut Session) {
        let Ok(adapter) = self.agents.get(&self.settings.agent) else {
            return;
        };
        if !adapter.supports_capture() {
            return;
        }
        let Some(conversation) = session.active_conversation_mut() else {
            return;
        };
        let (path, id) = (
            conversation.active.project_path.clone(),
            conversation.active.agent_session_id.clone(),
        );
        if let Some(id) = id {
            if let Some(file) = adapter.conversation_file(&path, &id) {
                conversation.active.message_count = daf_agents::claude::count_messages(&file);
            }
        }
    }

    /// Archives the active context of the active conversation, storing a
    /// summary of the outgoing conversation when one can be produced.
    pub(crate) fn archive_active_context(&self, session: &mut Session) -> Result<()> {
        let adapter = self.agents.get(&self.settings.agent)?;
        let Some(conversation) = session.active_conversation_mut() else {
            return Err(CoreError::Invalid {
                what: "conversation".to_string(),
                message: "session has no active conversation to archive".to_string(),
            });
        };

        let summary = conversation.active.agent_session_id.as_ref().and_then(|id| {
            adapter
                .conversation_file(&conversation.active.project_path, id)
                .and_then(|file| self.summarizer.summarize(&file))
        });
        conversation.archive_active(summary);
        Ok(())
    }

    /// Directories of every session, used to warn about collisions.
    pub(crate) fn known_work_dirs(&self) -> Result<HashSet<String>> {
        let report = self.store.load_all()?;
        Ok(report
            .sessions
            .iter()
            .flat_map(|s| s.conversations.keys().cloned())
            .collect())
    }
}
