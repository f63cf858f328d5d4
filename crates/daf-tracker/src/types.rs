//! Wire-independent tracker types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use daf_config::fields::{is_custom_field_id, is_system_field_id};
use daf_models::IssueKey;

use crate::error::{Result, TrackerError};

/// Minimal issue view returned by list/get operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Issue key.
    pub key: IssueKey,
    /// One-line summary.
    pub summary: String,
    /// Current workflow state name.
    pub status: String,
    /// Issue type name (Story, Bug, ...).
    pub kind: String,
    /// Assignee display name, when assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Browse URL, when the backend knows its endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Full issue view with description and field values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDetails {
    /// The summary view.
    #[serde(flatten)]
    pub ticket: Ticket,
    /// Issue description body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Labels.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Component names.
    #[serde(default)]
    pub components: Vec<String>,
    /// Parent issue, for sub-tasks and epic children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<IssueKey>,
    /// Priority name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Raw custom field values keyed by field id.
    #[serde(default)]
    pub custom_fields: BTreeMap<String, Value>,
}

/// One workflow transition available on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Tracker-side transition id.
    pub id: String,
    /// Transition name shown to users.
    pub name: String,
    /// Name of the state the transition leads to.
    pub to_state: String,
}

/// Field values for issue create/update, partitioned into system and
/// custom categories.
///
/// The two categories are disjoint by construction: inserting a custom
/// field id into the system category (or vice versa) is a caller error
/// surfaced as `Validation` before any request is made.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueFields {
    /// Standard fields (summary, description, labels, ...).
    #[serde(default)]
    pub system: BTreeMap<String, Value>,
    /// Custom fields keyed by opaque id.
    #[serde(default)]
    pub custom: BTreeMap<String, Value>,
}

impl IssueFields {
    /// Creates an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a system field, rejecting custom-field ids.
    pub fn set_system(&mut self, id: impl Into<String>, value: Value) -> Result<()> {
        let id = id.into();
        if !is_system_field_id(&id) {
            return Err(TrackerError::validation(
                id.clone(),
                "not a system field; use the custom category",
            ));
        }
        self.system.insert(id, value);
        Ok(())
    }

    /// Sets a custom field, rejecting system-field ids.
    pub fn set_custom(&mut self, id: impl Into<String>, value: Value) -> Result<()> {
        let id = id.into();
        if !is_custom_field_id(&id) {
            return Err(TrackerError::validation(
                id.clone(),
                "not a custom field id; use the system category",
            ));
        }
        self.custom.insert(id, value);
        Ok(())
    }

    /// Convenience setter for the summary field.
    pub fn summary(mut self, text: impl Into<String>) -> Self {
        self.system.insert("summary".to_string(), Value::String(text.into()));
        self
    }

    /// Convenience setter for the description field.
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.system
            .insert("description".to_string(), Value::String(text.into()));
        self
    }

    /// Iterates over every field id/value pair, system first.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.system.iter().chain(self.custom.iter())
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.custom.is_empty()
    }
}

/// Filters for `list_tickets` / `sync`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncFilter {
    /// Project code; usually injected from configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Sprint name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint: Option<String>,
    /// Issue type names; empty means all.
    #[serde(default)]
    pub kinds: Vec<String>,
    /// Parent issue (epic or sub-task parent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<IssueKey>,
    /// Assignee account or display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Custom-field predicates as (field id, expected value).
    #[serde(default)]
    pub custom: Vec<(String, String)>,
}

impl SyncFilter {
    /// Compiles the filter to a JQL query string.
    pub fn to_jql(&self) -> String {
        let mut clauses = Vec::new();
        if let Some(project) = &self.project {
            clauses.push(format!("project = {}", project));
        }
        if let Some(sprint) = &self.sprint {
            clauses.push(format!("sprint = \"{}\"", sprint));
        }
        if !self.kinds.is_empty() {
            let kinds: Vec<String> = self.kinds.iter().map(|k| format!("\"{}\"", k)).collect();
            clauses.push(format!("issuetype in ({})", kinds.join(", ")));
        }
        if let Some(parent) = &self.parent {
            clauses.push(format!("parent = {}", parent));
        }
        if let Some(assignee) = &self.assignee {
            clauses.push(format!("assignee = \"{}\"", assignee));
        }
        for (field, value) in &self.custom {
            let id = field
                .strip_prefix("customfield_")
                .map(|n| format!("cf[{}]", n))
                .unwrap_or_else(|| field.clone());
            clauses.push(format!("{} = \"{}\"", id, value));
        }
        if clauses.is_empty() {
            "order by updated desc".to_string()
        } else {
            format!("{} order by updated desc", clauses.join(" AND "))
        }
    }
}
