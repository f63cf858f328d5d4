//! Typed identifiers for DevAIFlow.
//!
//! `IssueKey` is the tracker-side identifier (`PROJ-123`); `AgentSessionId`
//! is the identifier the spawned coding agent assigns to a conversation
//! file. Both serialize as plain strings.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Matches `PREFIX-123`: uppercase prefix starting with a letter, then
/// a positive integer.
fn issue_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9]*-[0-9]+$").expect("static pattern"))
}

/// Error returned when a string is not a valid issue key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueKeyError(pub String);

impl fmt::Display for IssueKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid issue key: {}", self.0)
    }
}

impl std::error::Error for IssueKeyError {}

/// A tracker issue key of the form `PREFIX-123`.
///
/// The prefix is uppercase, starts with a letter, and may contain digits;
/// the suffix is a positive integer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IssueKey(String);

impl IssueKey {
    /// Parses and validates an issue key.
    pub fn parse(s: &str) -> Result<Self, IssueKeyError> {
        if issue_key_pattern().is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(IssueKeyError(s.to_string()))
        }
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the project prefix (the part before the dash).
    pub fn project(&self) -> &str {
        self.0.split_once('-').map(|(p, _)| p).unwrap_or(&self.0)
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for IssueKey {
    type Err = IssueKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IssueKey {
    type Error = IssueKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<IssueKey> for String {
    fn from(key: IssueKey) -> Self {
        key.0
    }
}

/// The identifier the coding agent assigns to a conversation.
///
/// For capture-capable agents this is the stem of the conversation file
/// (a UUID). Agents without parseable conversation files get a
/// synthesized `local-` id so the rest of the system can treat every
/// conversation uniformly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentSessionId(String);

impl AgentSessionId {
    /// Wraps an identifier captured from the agent.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a local identifier for agents that cannot be captured.
    pub fn synthesized() -> Self {
        Self(format!("local-{}", Uuid::new_v4()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this id was synthesized locally rather than
    /// captured from an agent conversation file.
    pub fn is_synthesized(&self) -> bool {
        self.0.starts_with("local-")
    }
}

impl fmt::Display for AgentSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentSessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_key_valid() {
        let key = IssueKey::parse("PROJ-123").unwrap();
        assert_eq!(key.as_str(), "PROJ-123");
        assert_eq!(key.project(), "PROJ");
    }

    #[test]
    fn test_issue_key_with_digits_in_prefix() {
        let key = IssueKey::parse("AB2C-7").unwrap();
        assert_eq!(key.project(), "AB2C");
    }

    #[test]
    fn test_issue_key_rejects_lowercase() {
        assert!(IssueKey::parse("proj-123").is_err());
    }

    #[test]
    fn test_issue_key_rejects_missing_number() {
        assert!(IssueKey::parse("PROJ-").is_err());
        assert!(IssueKey::parse("PROJ").is_err());
    }

    #[test]
    fn test_issue_key_rejects_leading_digit() {
        assert!(IssueKey::parse("1ABC-5").is_err());
    }

    #[test]
    fn test_issue_key_serde_roundtrip() {
        let key = IssueKey::parse("OPS-42").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"OPS-42\"");
        let back: IssueKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_issue_key_serde_rejects_invalid() {
        let result: Result<IssueKey, _> = serde_json::from_str("\"not a key\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_agent_session_id_synthesized() {
        let id = AgentSessionId::synthesized();
        assert!(id.is_synthesized());

        let captured = AgentSessionId::new("abc-123");
        assert!(!captured.is_synthesized());
    }

    #[test]
    fn test_agent_session_id_serde_transparent() {
        let id = AgentSessionId::new("abc-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc-123\"");
    }
}
