//! Issue tracker client abstraction.
//!
//! The `IssueTracker` trait is the only surface the rest of the system
//! talks to. Two implementations exist: a JIRA-style HTTP client and an
//! in-memory mock used by tests and by `DAF_MOCK_MODE=1`. Backends are
//! enumerated in a small factory; there is no dynamic loading.

pub mod error;
pub mod jira;
pub mod mock;
pub mod traits;
pub mod types;

pub use error::{Result, TrackerError};
pub use jira::JiraClient;
pub use mock::MockTracker;
pub use traits::IssueTracker;
pub use types::{IssueFields, SyncFilter, Ticket, TicketDetails, Transition};

use std::sync::Arc;

use daf_config::{BackendConfig, Settings};

/// Environment variable that forces the mock backend.
pub const MOCK_MODE_ENV: &str = "DAF_MOCK_MODE";

/// Builds the tracker selected by configuration.
///
/// `DAF_MOCK_MODE=1` overrides everything and yields the mock backend.
///
/// # Errors
/// Fails when the backend name is unknown or the JIRA client is missing
/// its endpoint or credentials.
pub fn create_tracker(
    settings: &Settings,
    backend_config: &BackendConfig,
) -> Result<Arc<dyn IssueTracker>> {
    if std::env::var(MOCK_MODE_ENV).is_ok_and(|v| v == "1") || settings.backend == "mock" {
        return Ok(Arc::new(MockTracker::new()));
    }
    match settings.backend.as_str() {
        "jira" => Ok(Arc::new(JiraClient::from_config(settings, backend_config)?)),
        other => Err(TrackerError::Config(format!(
            "unknown tracker backend '{}'",
            other
        ))),
    }
}
