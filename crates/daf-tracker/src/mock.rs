//! In-memory mock tracker.
//!
//! Serves the full `IssueTracker` interface from an in-memory map. Used
//! by tests and selected process-wide with `DAF_MOCK_MODE=1`. Failures
//! can be scripted per operation so callers' degradation paths can be
//! exercised without a network.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use daf_config::{CommentVisibility, FieldSpec};
use daf_models::IssueKey;

use crate::error::{Result, TrackerError};
use crate::traits::IssueTracker;
use crate::types::{IssueFields, SyncFilter, Ticket, TicketDetails, Transition};

/// Statuses the mock offers transitions between.
const WORKFLOW: &[&str] = &["To Do", "In Progress", "Done"];

/// A scripted failure for one mock operation.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    /// Fail with `Api` and this status.
    Api(u16),
    /// Fail with a single-field `Validation`.
    Validation(String, String),
    /// Fail with `Auth`.
    Auth,
    /// Fail with `Connection`-like unavailability, modeled as `Api(503)`.
    Unavailable,
}

impl ScriptedFailure {
    fn into_error(self) -> TrackerError {
        match self {
            Self::Api(status) => TrackerError::Api {
                status,
                messages: vec!["scripted failure".to_string()],
                body: String::new(),
            },
            Self::Validation(field, message) => TrackerError::validation(field, message),
            Self::Auth => TrackerError::Auth {
                status: Some(401),
                message: "scripted auth failure".to_string(),
            },
            Self::Unavailable => TrackerError::Api {
                status: 503,
                messages: vec!["tracker unavailable".to_string()],
                body: String::new(),
            },
        }
    }
}

/// One issue held by the mock.
#[derive(Debug, Clone)]
pub struct MockIssue {
    pub key: IssueKey,
    pub summary: String,
    pub status: String,
    pub kind: String,
    pub description: Option<String>,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
    pub parent: Option<IssueKey>,
    pub custom_fields: BTreeMap<String, Value>,
}

impl MockIssue {
    /// Creates an issue in the default `To Do` state.
    pub fn new(key: &str, summary: &str, kind: &str) -> Self {
        Self {
            key: key.parse().expect("mock issue key must be valid"),
            summary: summary.to_string(),
            status: "To Do".to_string(),
            kind: kind.to_string(),
            description: None,
            assignee: None,
            labels: Vec::new(),
            parent: None,
            custom_fields: BTreeMap::new(),
        }
    }

    /// Sets the workflow status.
    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    /// Sets the parent issue.
    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = parent.parse().ok();
        self
    }
}

#[derive(Default)]
struct MockState {
    issues: BTreeMap<String, MockIssue>,
    next_id: u32,
    required_fields: Vec<String>,
    creatable_fields: Vec<FieldSpec>,
    fail_transition: Option<ScriptedFailure>,
    fail_comment: Option<ScriptedFailure>,
    comments: Vec<(String, String, Option<CommentVisibility>)>,
    transitions_log: Vec<(String, String)>,
    links: Vec<(String, String, String)>,
    attachments: Vec<(String, PathBuf)>,
}

/// The mock tracker.
#[derive(Default)]
pub struct MockTracker {
    state: Mutex<MockState>,
}

impl MockTracker {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seeds an issue.
    pub fn add_issue(&self, issue: MockIssue) {
        self.state().issues.insert(issue.key.to_string(), issue);
    }

    /// Requires a field on create; missing it yields `Validation`.
    pub fn require_field(&self, field_id: &str) {
        self.state().required_fields.push(field_id.to_string());
    }

    /// Configures the catalog returned by `get_creatable_fields`.
    pub fn set_creatable_fields(&self, fields: Vec<FieldSpec>) {
        self.state().creatable_fields = fields;
    }

    /// Scripts the next (and every later) `transition` call to fail.
    pub fn fail_transition_with(&self, failure: ScriptedFailure) {
        self.state().fail_transition = Some(failure);
    }

    /// Scripts the next (and every later) `add_comment` call to fail.
    pub fn fail_comment_with(&self, failure: ScriptedFailure) {
        self.state().fail_comment = Some(failure);
    }

    /// Comments recorded so far as (issue key, text) pairs.
    pub fn recorded_comments(&self) -> Vec<(String, String)> {
        self.state()
            .comments
            .iter()
            .map(|(key, text, _)| (key.clone(), text.clone()))
            .collect()
    }

    /// Transitions recorded so far as (issue key, target state) pairs.
    pub fn recorded_transitions(&self) -> Vec<(String, String)> {
        self.state().transitions_log.clone()
    }

    /// Links recorded so far as (key, link type, other key) triples.
    pub fn recorded_links(&self) -> Vec<(String, String, String)> {
        self.state().links.clone()
    }

    fn ticket_from(issue: &MockIssue) -> Ticket {
        Ticket {
            key: issue.key.clone(),
            summary: issue.summary.clone(),
            status: issue.status.clone(),
            kind: issue.kind.clone(),
            assignee: issue.assignee.clone(),
            url: None,
        }
    }

    fn not_found(key: &IssueKey) -> TrackerError {
        TrackerError::NotFound {
            kind: "issue".to_string(),
            id: key.to_string(),
        }
    }
}

impl IssueTracker for MockTracker {
    fn name(&self) -> &str {
        "mock"
    }

    fn get_ticket(&self, key: &IssueKey) -> Result<Ticket> {
        let state = self.state();
        state
            .issues
            .get(key.as_str())
            .map(Self::ticket_from)
            .ok_or_else(|| Self::not_found(key))
    }

    fn get_ticket_detailed(&self, key: &IssueKey) -> Result<TicketDetails> {
        let state = self.state();
        let issue = state.issues.get(key.as_str()).ok_or_else(|| Self::not_found(key))?;
        Ok(TicketDetails {
            ticket: Self::ticket_from(issue),
            description: issue.description.clone(),
            labels: issue.labels.clone(),
            components: Vec::new(),
            parent: issue.parent.clone(),
            priority: None,
            custom_fields: issue.custom_fields.clone(),
        })
    }

    fn list_tickets(&self, filter: &SyncFilter) -> Result<Vec<Ticket>> {
        let state = self.state();
        Ok(state
            .issues
            .values()
            .filter(|issue| {
                (filter.kinds.is_empty() || filter.kinds.contains(&issue.kind))
                    && filter
                        .parent
                        .as_ref()
                        .is_none_or(|parent| issue.parent.as_ref() == Some(parent))
                    && filter
                        .assignee
                        .as_ref()
                        .is_none_or(|assignee| issue.assignee.as_deref() == Some(assignee))
                    && filter.custom.iter().all(|(field, value)| {
                        issue.custom_fields.get(field).and_then(Value::as_str) == Some(value)
                    })
            })
            .map(Self::ticket_from)
            .collect())
    }

    fn create_issue(&self, project: &str, kind: &str, fields: &IssueFields) -> Result<IssueKey> {
        let mut state = self.state();

        let mut field_errors = BTreeMap::new();
        for required in &state.required_fields {
            if !fields.iter().any(|(id, _)| id == required) {
                field_errors.insert(required.clone(), "required".to_string());
            }
        }
        if !field_errors.is_empty() {
            return Err(TrackerError::Validation { field_errors });
        }

        state.next_id += 1;
        let key: IssueKey = format!("{}-{}", project, state.next_id)
            .parse()
            .map_err(|e| TrackerError::Config(format!("bad project code: {}", e)))?;

        let mut issue = MockIssue::new(key.as_str(), "", kind);
        for (id, value) in fields.iter() {
            match id.as_str() {
                "summary" => issue.summary = value.as_str().unwrap_or_default().to_string(),
                "description" => {
                    issue.description = value.as_str().map(String::from);
                }
                "labels" => {
                    issue.labels = value
                        .as_array()
                        .map(|labels| {
                            labels.iter().filter_map(Value::as_str).map(String::from).collect()
                        })
                        .unwrap_or_default();
                }
                "assignee" => issue.assignee = value.as_str().map(String::from),
                _ => {
                    issue.custom_fields.insert(id.clone(), value.clone());
                }
            }
        }

        debug!(key = %key, "mock created issue");
        state.issues.insert(key.to_string(), issue);
        Ok(key)
    }

    fn update_issue(&self, key: &IssueKey, fields: &IssueFields) -> Result<()> {
        let mut state = self.state();
        let issue = state
            .issues
            .get_mut(key.as_str())
            .ok_or_else(|| Self::not_found(key))?;
        for (id, value) in fields.iter() {
            match id.as_str() {
                "summary" => issue.summary = value.as_str().unwrap_or_default().to_string(),
                "description" => issue.description = value.as_str().map(String::from),
                "assignee" => issue.assignee = value.as_str().map(String::from),
                _ => {
                    issue.custom_fields.insert(id.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    fn transition(&self, key: &IssueKey, target_state: &str) -> Result<()> {
        let mut state = self.state();
        if let Some(failure) = state.fail_transition.clone() {
            return Err(failure.into_error());
        }
        let issue = state
            .issues
            .get_mut(key.as_str())
            .ok_or_else(|| Self::not_found(key))?;
        issue.status = target_state.to_string();
        let record = (key.to_string(), target_state.to_string());
        state.transitions_log.push(record);
        Ok(())
    }

    fn available_transitions(&self, key: &IssueKey) -> Result<Vec<Transition>> {
        let state = self.state();
        let issue = state.issues.get(key.as_str()).ok_or_else(|| Self::not_found(key))?;
        Ok(WORKFLOW
            .iter()
            .filter(|status| !status.eq_ignore_ascii_case(&issue.status))
            .enumerate()
            .map(|(i, status)| Transition {
                id: (i + 1).to_string(),
                name: format!("Move to {}", status),
                to_state: status.to_string(),
            })
            .collect())
    }

    fn add_comment(
        &self,
        key: &IssueKey,
        text: &str,
        visibility: Option<&CommentVisibility>,
    ) -> Result<()> {
        let mut state = self.state();
        if let Some(failure) = state.fail_comment.clone() {
            return Err(failure.into_error());
        }
        if !state.issues.contains_key(key.as_str()) {
            return Err(Self::not_found(key));
        }
        state
            .comments
            .push((key.to_string(), text.to_string(), visibility.cloned()));
        Ok(())
    }

    fn attach_file(&self, key: &IssueKey, path: &Path) -> Result<()> {
        let mut state = self.state();
        if !state.issues.contains_key(key.as_str()) {
            return Err(Self::not_found(key));
        }
        state.attachments.push((key.to_string(), path.to_path_buf()));
        Ok(())
    }

    fn link_issues(&self, key: &IssueKey, link_type: &str, other: &IssueKey) -> Result<()> {
        let mut state = self.state();
        if !state.issues.contains_key(key.as_str()) {
            return Err(Self::not_found(key));
        }
        state
            .links
            .push((key.to_string(), link_type.to_string(), other.to_string()));
        Ok(())
    }

    fn get_editable_fields(&self, key: &IssueKey) -> Result<Vec<FieldSpec>> {
        let state = self.state();
        if !state.issues.contains_key(key.as_str()) {
            return Err(Self::not_found(key));
        }
        Ok(state.creatable_fields.clone())
    }

    fn get_creatable_fields(&self, _project: &str, _kind: &str) -> Result<Vec<FieldSpec>> {
        Ok(self.state().creatable_fields.clone())
    }
}
