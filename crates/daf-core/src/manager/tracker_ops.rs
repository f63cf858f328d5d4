//! Tracker-facing operations: link, unlink, notes, sync, and the
//! issue passthroughs used by the `jira` command group.

use std::collections::BTreeMap;

use tracing::{info, warn};

use daf_config::{FieldCatalog, FieldSpec};
use daf_models::{IssueKey, Note, Session, SessionType};
use daf_persistence::StoreLock;
use daf_tracker::{IssueFields, SyncFilter, TicketDetails};

use crate::error::{CoreError, Result};
use crate::guard::Operation;
use crate::manager::SessionManager;
use crate::time;

/// What `sync` did.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Sessions created for previously-unknown issues.
    pub created: Vec<String>,
    /// Sessions whose tracker-derived fields were pulled forward.
    pub updated: Vec<String>,
}

impl SessionManager {
    /// Binds a session to a tracker issue.
    ///
    /// The issue must exist; a broken key is a fatal error, not a
    /// warning. Replacing an existing binding prompts unless `force`.
    pub fn link(&self, name_or_key: &str, key: &IssueKey, force: bool) -> Result<Session> {
        self.guard.ensure_allowed(Operation::Link)?;
        let mut session = self.resolve_session(name_or_key)?;

        // Fatal on any tracker error: linking to an unverifiable issue
        // would poison later operations
        self.tracker.get_ticket(key)?;

        if let Some(existing) = &session.issue_key {
            if existing != key && !force {
                let replace = self.interactor.confirm(&format!(
                    "session '{}' is linked to {}; replace with {}?",
                    session.name, existing, key
                ))?;
                if !replace {
                    return Err(CoreError::Cancelled);
                }
            }
        }

        session.issue_key = Some(key.clone());
        session.touch();
        self.persist(&session)?;
        info!(session = %session.name, issue = %key, "linked session");
        Ok(session)
    }

    /// Releases a session's tracker binding, leaving local-only fields
    /// (notes, work intervals, branch) untouched.
    pub fn unlink(&self, name_or_key: &str, force: bool) -> Result<Session> {
        self.guard.ensure_allowed(Operation::Unlink)?;
        let mut session = self.resolve_session(name_or_key)?;

        let Some(existing) = session.issue_key.clone() else {
            return Ok(session);
        };
        if !force {
            let confirmed = self.interactor.confirm(&format!(
                "unlink session '{}' from {}?",
                session.name, existing
            ))?;
            if !confirmed {
                return Err(CoreError::Cancelled);
            }
        }

        session.issue_key = None;
        session.touch();
        self.persist(&session)?;
        info!(session = %session.name, issue = %existing, "unlinked session");
        Ok(session)
    }

    /// Appends a note to the local log and optionally mirrors it to the
    /// tracker.
    ///
    /// The local note is authoritative: a failed push keeps the note
    /// and only emits a warning.
    pub fn note_add(&self, name_or_key: &str, text: &str, push: bool) -> Result<Note> {
        self.guard.ensure_allowed(Operation::NoteAdd)?;
        let session = self.resolve_session(name_or_key)?;
        let mut note = Note::new(time::current_user(), text);

        {
            let _lock = StoreLock::acquire(self.store().root())?;
            self.store().append_note(&session.name, &note)?;
        }

        if push {
            match &session.issue_key {
                Some(key) => {
                    let visibility = self.settings().comment_visibility.clone();
                    match self.tracker.add_comment(key, text, visibility.as_ref()) {
                        Ok(()) => {
                            note.pushed_to_tracker = true;
                            self.mark_last_note_pushed(&session.name)?;
                        }
                        Err(e) => {
                            warn!(issue = %key, error = %e, "note kept locally; tracker push failed");
                        }
                    }
                }
                None => {
                    warn!(session = %session.name, "note kept locally; session has no issue link");
                }
            }
        }

        Ok(note)
    }

    /// Flags the most recent unpushed note as mirrored.
    fn mark_last_note_pushed(&self, session_name: &str) -> Result<()> {
        let _lock = StoreLock::acquire(self.store().root())?;
        let mut notes = self.store().read_notes(session_name)?;
        if let Some(note) = notes.iter_mut().rev().find(|n| !n.pushed_to_tracker) {
            note.pushed_to_tracker = true;
        }
        self.store().write_notes(session_name, &notes)?;
        Ok(())
    }

    /// Creates or updates one session per issue matching the filter.
    ///
    /// Idempotent: a second run with unchanged remote state writes
    /// nothing. Tracker-derived fields are pulled forward; local-only
    /// fields (notes, work intervals, branches) are never overwritten.
    pub fn sync(&self, mut filter: SyncFilter) -> Result<SyncReport> {
        self.guard.ensure_allowed(Operation::Sync)?;
        if filter.project.is_none() {
            filter.project = self.settings().project.clone();
        }

        let tickets = self.tracker.list_tickets(&filter)?;
        let mut report = SyncReport::default();

        let _lock = StoreLock::acquire(self.store().root())?;
        for ticket in tickets {
            let name = ticket.key.to_string();
            if self.store().exists(&name) {
                let mut session = self.store().load(&name)?;
                let mut changed = false;
                if session.goal != ticket.summary {
                    session.goal = ticket.summary.clone();
                    changed = true;
                }
                if session.issue_key.as_ref() != Some(&ticket.key) {
                    session.issue_key = Some(ticket.key.clone());
                    changed = true;
                }
                if changed {
                    self.store().save(&session)?;
                    report.updated.push(name);
                }
            } else {
                let mut session = Session::new(&name, &ticket.summary, SessionType::Development);
                session.issue_key = Some(ticket.key.clone());
                self.store().save(&session)?;
                report.created.push(name);
            }
        }

        info!(
            created = report.created.len(),
            updated = report.updated.len(),
            "synchronized sessions from tracker"
        );
        Ok(report)
    }

    /// Fetches an issue (read-only, allowed inside an agent).
    pub fn jira_view(&self, key: &IssueKey) -> Result<TicketDetails> {
        self.guard.ensure_allowed(Operation::JiraView)?;
        Ok(self.tracker.get_ticket_detailed(key)?)
    }

    /// Creates a tracker issue (touches only the remote, allowed inside
    /// an agent; the ticket-creation flow depends on that).
    pub fn jira_create(
        &self,
        project: Option<&str>,
        kind: &str,
        fields: &IssueFields,
    ) -> Result<IssueKey> {
        self.guard.ensure_allowed(Operation::JiraCreate)?;
        let project = project
            .map(String::from)
            .or_else(|| self.settings().project.clone())
            .ok_or_else(|| CoreError::Invalid {
                what: "project".to_string(),
                message: "no tracker project configured; pass one explicitly".to_string(),
            })?;
        Ok(self.tracker.create_issue(&project, kind, fields)?)
    }

    /// Updates fields on a tracker issue.
    pub fn jira_update(&self, key: &IssueKey, fields: &IssueFields) -> Result<()> {
        self.guard.ensure_allowed(Operation::JiraUpdate)?;
        Ok(self.tracker.update_issue(key, fields)?)
    }

    /// Refreshes the cached field catalog from the tracker.
    ///
    /// Returns the number of cataloged fields.
    pub fn refresh_fields(&self, kind: &str) -> Result<usize> {
        self.guard.ensure_allowed(Operation::JiraFields)?;
        let project = self.settings().project.clone().ok_or_else(|| CoreError::Invalid {
            what: "project".to_string(),
            message: "no tracker project configured".to_string(),
        })?;

        let specs = self.tracker.get_creatable_fields(&project, kind)?;
        let mut fields = BTreeMap::new();
        for spec in specs {
            fields.insert(alias_for(&spec), spec);
        }
        let count = fields.len();

        let mut backend = self.backend.clone();
        let mut catalog = FieldCatalog::new();
        catalog.replace(fields);
        backend.field_catalog = catalog;
        backend.save(&self.root, self.tracker.name())?;
        info!(count, "refreshed tracker field catalog");
        Ok(count)
    }
}

/// Derives a config alias from a field's display name.
fn alias_for(spec: &FieldSpec) -> String {
    let mut alias = String::new();
    for c in spec.display_name.chars() {
        if c.is_ascii_alphanumeric() {
            alias.push(c.to_ascii_lowercase());
        } else if !alias.ends_with('_') && !alias.is_empty() {
            alias.push('_');
        }
    }
    let alias = alias.trim_end_matches('_').to_string();
    if alias.is_empty() {
        spec.id.clone()
    } else {
        alias
    }
}
