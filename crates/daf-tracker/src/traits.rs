//! The tracker interface.

use std::path::Path;

use daf_config::{CommentVisibility, FieldSpec};
use daf_models::IssueKey;

use crate::error::Result;
use crate::types::{IssueFields, SyncFilter, Ticket, TicketDetails, Transition};

/// Remote issue tracker operations.
///
/// Implementations must be shareable across the capture thread and the
/// main flow, hence `Send + Sync`. Every method either returns a typed
/// value or fails with a [`crate::TrackerError`].
pub trait IssueTracker: Send + Sync {
    /// Backend name (`jira`, `mock`).
    fn name(&self) -> &str;

    /// Fetches the summary view of an issue.
    fn get_ticket(&self, key: &IssueKey) -> Result<Ticket>;

    /// Fetches the full view of an issue.
    fn get_ticket_detailed(&self, key: &IssueKey) -> Result<TicketDetails>;

    /// Lists issues matching a filter.
    fn list_tickets(&self, filter: &SyncFilter) -> Result<Vec<Ticket>>;

    /// Creates an issue of the given kind and returns its key.
    fn create_issue(&self, project: &str, kind: &str, fields: &IssueFields) -> Result<IssueKey>;

    /// Updates fields on an existing issue.
    fn update_issue(&self, key: &IssueKey, fields: &IssueFields) -> Result<()>;

    /// Moves an issue to the named target state.
    fn transition(&self, key: &IssueKey, target_state: &str) -> Result<()>;

    /// Lists the workflow transitions currently available on an issue.
    fn available_transitions(&self, key: &IssueKey) -> Result<Vec<Transition>>;

    /// Adds a comment, optionally restricted to a group or role.
    fn add_comment(
        &self,
        key: &IssueKey,
        text: &str,
        visibility: Option<&CommentVisibility>,
    ) -> Result<()>;

    /// Attaches a file to an issue.
    fn attach_file(&self, key: &IssueKey, path: &Path) -> Result<()>;

    /// Links two issues with the named link type.
    fn link_issues(&self, key: &IssueKey, link_type: &str, other: &IssueKey) -> Result<()>;

    /// Fields editable on an existing issue.
    fn get_editable_fields(&self, key: &IssueKey) -> Result<Vec<FieldSpec>>;

    /// Fields available when creating an issue of the given kind.
    fn get_creatable_fields(&self, project: &str, kind: &str) -> Result<Vec<FieldSpec>>;
}
