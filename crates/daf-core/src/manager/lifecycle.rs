//! Session lifecycle operations: new, open, complete, pause, resume,
//! delete, investigate, and ticket-creation sessions.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use daf_config::{FailurePolicy, PromptChoice, TransitionPolicy};
use daf_models::{
    Conversation, ConversationContext, IssueKey, Session, SessionStatus, SessionType,
};
use daf_persistence::StoreLock;

use crate::error::{CoreError, Result};
use crate::git;
use crate::guard::Operation;
use crate::manager::SessionManager;
use crate::time::TimeTracker;

/// Inputs for creating a session.
pub struct NewSessionParams {
    /// Session name; derived from the goal when absent.
    pub name: Option<String>,
    /// What the session sets out to do.
    pub goal: String,
    /// Repository directory to work in.
    pub work_dir: PathBuf,
    /// Branch to create or switch to.
    pub branch: Option<String>,
    /// Workspace root the repository lives under.
    pub workspace: Option<String>,
    /// Template reference.
    pub template: Option<String>,
}

/// Options for completing a session.
#[derive(Default)]
pub struct CompleteOptions {
    /// Commit outstanding changes before completing.
    pub commit: bool,
    /// Commit message override.
    pub commit_message: Option<String>,
    /// PR/MR URL to record on the conversation.
    pub pr_url: Option<String>,
    /// Tracker comment override; a summary is generated when absent.
    pub comment: Option<String>,
    /// Skip the tracker transition step entirely.
    pub skip_transition: bool,
}

/// What `complete` did, including best-effort failures.
#[derive(Debug)]
pub struct CompleteReport {
    /// The completed session.
    pub session: Session,
    /// Warnings from best-effort remote steps.
    pub warnings: Vec<String>,
}

impl SessionManager {
    /// Creates a session, its first conversation, and launches the
    /// agent.
    ///
    /// # Errors
    /// `Conflict` when the name is taken, `InvalidPath` when the work
    /// directory does not exist, `BranchConflict` when branch
    /// resolution is abandoned.
    pub fn new_session(&self, params: NewSessionParams) -> Result<Session> {
        self.guard.ensure_allowed(Operation::New)?;

        if params.goal.trim().is_empty() {
            return Err(CoreError::Invalid {
                what: "goal".to_string(),
                message: "a goal is required".to_string(),
            });
        }
        let name = match params.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => slugify(&params.goal),
        };
        if !params.work_dir.is_dir() {
            return Err(CoreError::InvalidPath(params.work_dir));
        }
        let work_dir = params.work_dir;
        let work_key = work_dir.to_string_lossy().to_string();

        // Branch work happens before the lock; it can prompt
        let branch = self.resolve_branch(&work_dir, params.branch.as_deref())?;
        let base_branch = if git::is_repo(&work_dir) {
            git::current_branch(&work_dir).ok().filter(|b| Some(b) != branch.as_ref())
        } else {
            None
        };

        let mut session = {
            let _lock = StoreLock::acquire(self.store().root())?;
            if self.store().exists(&name) {
                return Err(CoreError::Conflict(name));
            }
            if self.known_work_dirs()?.contains(&work_key) {
                warn!(work_dir = %work_key, "another session already uses this directory");
            }

            let mut context = ConversationContext::new(&work_dir);
            context.branch = branch.clone();
            context.base_branch = base_branch;
            context.remote_url = git::remote_url(&work_dir);

            let repo_name = work_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| work_key.clone());

            let mut session = Session::new(&name, &params.goal, SessionType::Development);
            session.workspace = params.workspace;
            session.template = params.template;
            session.add_conversation(&work_key, Conversation::new(repo_name, context));
            TimeTracker::start(&mut session);

            self.store().save(&session)?;
            info!(session = %name, "created session");
            session
        };

        self.run_agent_flow(&mut session)?;
        Ok(session)
    }

    /// Opens an existing session (or resumes its agent conversation).
    pub fn open(
        &self,
        name_or_key: &str,
        work_dir: Option<PathBuf>,
        new_conversation: bool,
    ) -> Result<Session> {
        self.guard.ensure_allowed(Operation::Open)?;
        let mut session = self.resolve_session(name_or_key)?;

        self.propose_reopen_if_closed(&session)?;
        self.ensure_work_dir(&mut session, work_dir)?;
        if session.session_type == SessionType::TicketCreation {
            self.recreate_temp_dir(&mut session)?;
        }
        if new_conversation {
            self.archive_active_context(&mut session)?;
        }
        self.check_branch_freshness(&session)?;

        TimeTracker::start(&mut session);
        self.persist(&session)?;

        self.run_agent_flow(&mut session)?;
        Ok(session)
    }

    /// Completes a session: optional commit, best-effort tracker
    /// mirroring, close the work interval, mark complete.
    pub fn complete(&self, name_or_key: &str, options: CompleteOptions) -> Result<CompleteReport> {
        self.guard.ensure_allowed(Operation::Complete)?;
        let mut session = self.resolve_session(name_or_key)?;
        let mut warnings = Vec::new();

        if session.session_type.uses_git() {
            self.finish_git_work(&mut session, &options)?;
        }

        if let Some(key) = session.issue_key.clone() {
            let elapsed = TimeTracker::elapsed(&session);
            let comment = options.comment.clone().unwrap_or_else(|| {
                format!(
                    "Completed session '{}': {} (tracked {}m)",
                    session.name,
                    session.goal,
                    elapsed.num_minutes()
                )
            });
            let visibility = self.settings().comment_visibility.clone();
            if let Err(e) = self.tracker.add_comment(&key, &comment, visibility.as_ref()) {
                self.handle_remote_failure("comment", e, &mut warnings)?;
            }

            if !options.skip_transition {
                let policy = self.settings().on_complete.clone();
                if let Err(e) = self.apply_transition(&key, &policy) {
                    match e {
                        CoreError::Tracker(tracker_error) => {
                            if policy.on_fail == FailurePolicy::Block {
                                return Err(CoreError::Tracker(tracker_error));
                            }
                            let warning =
                                format!("issue transition failed: {}", tracker_error);
                            warn!("{}", warning);
                            warnings.push(warning);
                        }
                        other => return Err(other),
                    }
                }
            }
        }

        TimeTracker::stop(&mut session);
        session.status = SessionStatus::Complete;
        self.persist(&session)?;
        info!(session = %session.name, "completed session");

        Ok(CompleteReport { session, warnings })
    }

    /// Pauses time tracking; returns false when nothing was running.
    pub fn pause(&self, name_or_key: &str) -> Result<bool> {
        self.guard.ensure_allowed(Operation::Pause)?;
        let mut session = self.resolve_session(name_or_key)?;
        let paused = TimeTracker::pause(&mut session);
        if paused && session.status == SessionStatus::InProgress {
            session.status = SessionStatus::Paused;
        }
        self.persist(&session)?;
        Ok(paused)
    }

    /// Resumes time tracking on a paused session.
    pub fn resume(&self, name_or_key: &str) -> Result<Session> {
        self.guard.ensure_allowed(Operation::Resume)?;
        let mut session = self.resolve_session(name_or_key)?;
        if session.status == SessionStatus::Complete {
            return Err(CoreError::Invalid {
                what: "session".to_string(),
                message: format!("'{}' is complete; open a new session instead", session.name),
            });
        }
        TimeTracker::resume(&mut session);
        self.persist(&session)?;
        Ok(session)
    }

    /// Deletes a session and its store directory.
    pub fn delete(&self, name_or_key: &str, force: bool) -> Result<()> {
        self.guard.ensure_allowed(Operation::Delete)?;
        let session = self.resolve_session(name_or_key)?;
        if !force {
            let confirmed = self
                .interactor
                .confirm(&format!("delete session '{}'?", session.name))?;
            if !confirmed {
                return Err(CoreError::Cancelled);
            }
        }
        let _lock = StoreLock::acquire(self.store().root())?;
        self.store().delete(&session.name)?;
        info!(session = %session.name, "deleted session");
        Ok(())
    }

    /// Creates an investigation session: notes and time tracking, no
    /// git, no conversations required.
    pub fn investigate(&self, name: &str, goal: &str) -> Result<Session> {
        self.guard.ensure_allowed(Operation::Investigate)?;
        let _lock = StoreLock::acquire(self.store().root())?;
        if self.store().exists(name) {
            return Err(CoreError::Conflict(name.to_string()));
        }
        let mut session = Session::new(name, goal, SessionType::Investigation);
        TimeTracker::start(&mut session);
        self.store().save(&session)?;
        info!(session = %name, "created investigation session");
        Ok(session)
    }

    /// Creates a ticket-creation session in a throwaway directory and
    /// launches the agent with a read-only analysis prompt.
    pub fn jira_new(&self, kind: &str, parent: Option<&IssueKey>, goal: &str) -> Result<Session> {
        self.guard.ensure_allowed(Operation::JiraNew)?;

        let temp_dir = std::env::temp_dir().join(format!("daf-creation-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&temp_dir)
            .map_err(|_| CoreError::InvalidPath(temp_dir.clone()))?;

        let name = format!("creation-{}", Utc::now().format("%Y%m%d%H%M%S"));
        let mut session = {
            let _lock = StoreLock::acquire(self.store().root())?;
            if self.store().exists(&name) {
                return Err(CoreError::Conflict(name));
            }
            let context = ConversationContext::new(&temp_dir);
            let mut conversation = Conversation::new(format!("{}-draft", kind), context);
            conversation.temp_dir = Some(temp_dir.clone());

            let mut session = Session::new(&name, goal, SessionType::TicketCreation);
            if let Some(parent) = parent {
                session.tags.push(format!("parent:{}", parent));
            }
            session.add_conversation(temp_dir.to_string_lossy().to_string(), conversation);
            TimeTracker::start(&mut session);
            self.store().save(&session)?;
            info!(session = %session.name, "created ticket-creation session");
            session
        };

        self.run_agent_flow(&mut session)?;
        Ok(session)
    }

    /// Renames a ticket-creation session once its issue key is known.
    pub fn bind_created_issue(&self, name_or_key: &str, key: &IssueKey) -> Result<Session> {
        let mut session = self.resolve_session(name_or_key)?;
        let new_name = format!("creation-{}", key);

        let _lock = StoreLock::acquire(self.store().root())?;
        if session.name != new_name && self.store().exists(&new_name) {
            return Err(CoreError::Conflict(new_name));
        }
        let old_name = session.name.clone();
        session.issue_key = Some(key.clone());
        session.name = new_name;
        if old_name != session.name {
            self.store().rename(&old_name, &session.name)?;
        }
        self.store().save(&session)?;
        Ok(session)
    }

    // ---- helpers ---------------------------------------------------------

    /// Resolves the branch for a new session, walking the four-option
    /// menu on a collision (suffix / reuse / rename / skip).
    fn resolve_branch(&self, work_dir: &Path, requested: Option<&str>) -> Result<Option<String>> {
        let Some(requested) = requested else {
            return Ok(None);
        };
        if !git::is_repo(work_dir) {
            return Ok(None);
        }

        if !git::branch_exists(work_dir, requested) {
            git::create_branch(work_dir, requested)?;
            return Ok(Some(requested.to_string()));
        }

        let choice = match self.settings().prompts.create_branch {
            PromptChoice::Always => 0, // suffix without asking
            PromptChoice::Never => 3,  // skip without asking
            PromptChoice::Ask => self.interactor.choose(
                &format!("branch '{}' already exists", requested),
                &[
                    "create with a numeric suffix",
                    "reuse the existing branch",
                    "enter a different name",
                    "skip branch creation",
                ],
            )?,
        };

        match choice {
            0 => {
                let mut n = 2;
                let suffixed = loop {
                    let candidate = format!("{}-{}", requested, n);
                    if !git::branch_exists(work_dir, &candidate) {
                        break candidate;
                    }
                    n += 1;
                };
                git::create_branch(work_dir, &suffixed)?;
                Ok(Some(suffixed))
            }
            1 => {
                git::switch_branch(work_dir, requested)?;
                Ok(Some(requested.to_string()))
            }
            2 => {
                let renamed = self.interactor.input("new branch name")?;
                let renamed = renamed.trim();
                if renamed.is_empty() || git::branch_exists(work_dir, renamed) {
                    return Err(CoreError::BranchConflict(format!(
                        "'{}' is empty or already taken",
                        renamed
                    )));
                }
                git::create_branch(work_dir, renamed)?;
                Ok(Some(renamed.to_string()))
            }
            _ => Ok(None),
        }
    }

    /// Proposes reopening an issue found in a closed tracker state.
    fn propose_reopen_if_closed(&self, session: &Session) -> Result<()> {
        let Some(key) = &session.issue_key else {
            return Ok(());
        };
        let ticket = match self.tracker.get_ticket(key) {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(issue = %key, error = %e, "could not check issue state");
                return Ok(());
            }
        };
        if !self.backend.is_closed_state(&ticket.status) {
            return Ok(());
        }

        let reopen = match self.settings().prompts.reopen_closed {
            PromptChoice::Always => true,
            PromptChoice::Never => false,
            PromptChoice::Ask => self.interactor.confirm(&format!(
                "issue {} is in closed state '{}'; move it back to in-progress?",
                key, ticket.status
            ))?,
        };
        if !reopen {
            return Ok(());
        }

        let policy = self.settings().on_open.clone();
        if let Err(e) = self.apply_transition(key, &policy) {
            match e {
                CoreError::Tracker(tracker_error) if policy.on_fail == FailurePolicy::Warn => {
                    warn!(issue = %key, error = %tracker_error, "reopen transition failed");
                }
                other => return Err(other),
            }
        }
        Ok(())
    }

    /// Applies a transition policy: either the configured target or an
    /// interactive pick from the currently available transitions.
    pub(crate) fn apply_transition(&self, key: &IssueKey, policy: &TransitionPolicy) -> Result<()> {
        let target = if policy.prompt {
            let transitions = self.tracker.available_transitions(key)?;
            if transitions.is_empty() {
                return Ok(());
            }
            let names: Vec<&str> = transitions.iter().map(|t| t.to_state.as_str()).collect();
            let index = self
                .interactor
                .choose(&format!("transition {} to", key), &names)?;
            transitions[index].to_state.clone()
        } else {
            match &policy.to {
                Some(target) => target.clone(),
                None => "In Progress".to_string(),
            }
        };
        self.tracker.transition(key, &target)?;
        debug!(issue = %key, target = %target, "transitioned issue");
        Ok(())
    }

    /// Demotes a best-effort remote failure to a warning, or aborts
    /// under `on_fail=block`.
    fn handle_remote_failure(
        &self,
        what: &str,
        error: daf_tracker::TrackerError,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        if self.settings().on_complete.on_fail == FailurePolicy::Block {
            return Err(CoreError::Tracker(error));
        }
        let warning = format!("tracker {} failed: {}", what, error);
        warn!("{}", warning);
        warnings.push(warning);
        Ok(())
    }

    /// Makes sure the session has a usable active work directory.
    fn ensure_work_dir(&self, session: &mut Session, work_dir: Option<PathBuf>) -> Result<()> {
        if let Some(dir) = work_dir {
            let key = dir.to_string_lossy().to_string();
            if session.conversations.contains_key(&key) {
                session.active_working_directory = Some(key);
            } else {
                if !dir.is_dir() {
                    return Err(CoreError::InvalidPath(dir));
                }
                let mut context = ConversationContext::new(&dir);
                if git::is_repo(&dir) {
                    context.branch = git::current_branch(&dir).ok();
                    context.remote_url = git::remote_url(&dir);
                }
                let repo_name = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| key.clone());
                session.add_conversation(key, Conversation::new(repo_name, context));
            }
        }

        // Sessions minted by sync have no conversation yet
        let Some(conversation) = session.active_conversation() else {
            if session.session_type.requires_conversation() {
                return Err(CoreError::Invalid {
                    what: "session".to_string(),
                    message: format!(
                        "'{}' has no working directory yet; pass one to open",
                        session.name
                    ),
                });
            }
            return Ok(());
        };

        let path = conversation.active.project_path.clone();
        if path.is_dir() || session.session_type == SessionType::TicketCreation {
            return Ok(());
        }

        // The recorded directory is gone; ask for a replacement (fails
        // NeedsInteractive in JSON mode)
        let replacement = self.interactor.input(&format!(
            "work directory {} no longer exists; enter a replacement",
            path.display()
        ));
        let replacement = match replacement {
            Ok(replacement) => PathBuf::from(replacement.trim()),
            Err(CoreError::NeedsInteractive(_)) => return Err(CoreError::InvalidPath(path)),
            Err(other) => return Err(other),
        };
        if !replacement.is_dir() {
            return Err(CoreError::InvalidPath(replacement));
        }

        let old_key = session
            .active_working_directory
            .clone()
            .unwrap_or_default();
        let mut conversation = session
            .conversations
            .remove(&old_key)
            .ok_or_else(|| CoreError::Corruption("active conversation vanished".to_string()))?;
        conversation.active.project_path = replacement.clone();
        session.add_conversation(replacement.to_string_lossy().to_string(), conversation);
        Ok(())
    }

    /// Rebuilds the throwaway directory of a ticket-creation session,
    /// relocating the agent conversation file under the new encoded
    /// path so the stored agent session id keeps working.
    fn recreate_temp_dir(&self, session: &mut Session) -> Result<()> {
        let adapter = self.agents.get(&self.settings.agent)?;
        let Some(conversation) = session.active_conversation_mut() else {
            return Ok(());
        };
        let Some(old_temp) = conversation.temp_dir.clone() else {
            return Ok(());
        };
        if old_temp.is_dir() && conversation.active.project_path == old_temp {
            return Ok(());
        }

        // Save the conversation file before the old directory's encoded
        // path stops being used
        let saved = conversation.active.agent_session_id.as_ref().and_then(|id| {
            let old_file = adapter.conversation_file(&old_temp, id)?;
            let content = std::fs::read(&old_file).ok()?;
            Some((id.clone(), content))
        });

        let new_temp = std::env::temp_dir().join(format!("daf-creation-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&new_temp)
            .map_err(|_| CoreError::InvalidPath(new_temp.clone()))?;

        if let Some((id, content)) = saved {
            if let Some(new_file) = adapter.conversation_file(&new_temp, &id) {
                if let Some(parent) = new_file.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = std::fs::write(&new_file, content) {
                    warn!(error = %e, "could not relocate conversation file");
                }
            }
        }

        conversation.active.project_path = new_temp.clone();
        conversation.temp_dir = Some(new_temp.clone());
        let old_key = session.active_working_directory.clone().unwrap_or_default();
        if let Some(conversation) = session.conversations.remove(&old_key) {
            session.add_conversation(new_temp.to_string_lossy().to_string(), conversation);
        }
        let _ = std::fs::remove_dir_all(&old_temp);
        Ok(())
    }

    /// Warns or merges when the session branch is behind its base.
    fn check_branch_freshness(&self, session: &Session) -> Result<()> {
        if !session.session_type.uses_git() {
            return Ok(());
        }
        let Some(conversation) = session.active_conversation() else {
            return Ok(());
        };
        let work_dir = &conversation.active.project_path;
        let Some(base) = conversation.active.base_branch.as_deref() else {
            return Ok(());
        };
        if !git::is_repo(work_dir) {
            return Ok(());
        }
        let behind = match git::behind_base(work_dir, base) {
            Ok(behind) => behind,
            Err(e) => {
                debug!(error = %e, "could not compare against base branch");
                return Ok(());
            }
        };
        if behind == 0 {
            return Ok(());
        }

        let merge = self.interactor.confirm(&format!(
            "branch is {} commit(s) behind {}; merge it in before starting?",
            behind, base
        ))?;
        if !merge {
            return Ok(());
        }
        match git::merge_base(work_dir, base)? {
            git::MergeOutcome::Clean => Ok(()),
            git::MergeOutcome::Conflicts(paths) => Err(CoreError::Invalid {
                what: "merge".to_string(),
                message: format!(
                    "merging {} conflicts in: {}",
                    base,
                    paths.join(", ")
                ),
            }),
        }
    }

    /// Checks out the session branch and commits outstanding work.
    fn finish_git_work(&self, session: &mut Session, options: &CompleteOptions) -> Result<()> {
        let session_name = session.name.clone();
        let Some(conversation) = session.active_conversation_mut() else {
            return Ok(());
        };
        let work_dir = conversation.active.project_path.clone();
        if !git::is_repo(&work_dir) {
            return Ok(());
        }

        if let Some(branch) = conversation.active.branch.clone() {
            let current = git::current_branch(&work_dir)?;
            if current != branch {
                if git::is_clean(&work_dir)? {
                    git::switch_branch(&work_dir, &branch)?;
                } else {
                    return Err(CoreError::Invalid {
                        what: "branch".to_string(),
                        message: format!(
                            "worktree is on '{}' with uncommitted changes; commit or stash, \
                             then switch to '{}' and re-run complete",
                            current, branch
                        ),
                    });
                }
            }
        }

        if options.commit {
            let message = options
                .commit_message
                .clone()
                .unwrap_or_else(|| format!("Complete session '{}'", session_name));
            if git::commit_all(&work_dir, &message)? {
                debug!(session = %session_name, "committed outstanding changes");
            }
        }

        if let Some(pr_url) = &options.pr_url {
            conversation.active.merge_request_urls.push(pr_url.clone());
        }
        Ok(())
    }
}

/// Derives a session name from a goal.
fn slugify(goal: &str) -> String {
    let mut slug = String::new();
    for c in goal.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
        if slug.len() >= 40 {
            break;
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod slug_tests {
    use super::slugify;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Fix the Flux Capacitor!"), "fix-the-flux-capacitor");
        assert_eq!(slugify("a  b"), "a-b");
        assert!(slugify(&"very long goal ".repeat(10)).len() <= 40);
    }
}
