//! Core data models for DevAIFlow.
//!
//! This crate provides the fundamental data types shared across the
//! DevAIFlow system: sessions, conversations, work intervals, notes,
//! and the typed identifiers that bind them to the issue tracker and
//! the spawned coding agent.

pub mod conversation;
pub mod ids;
pub mod note;
pub mod session;

// Re-export main types
pub use conversation::{Conversation, ConversationContext};
pub use ids::{AgentSessionId, IssueKey, IssueKeyError};
pub use note::Note;
pub use session::{
    Session, SessionDescriptor, SessionStatus, SessionType, TimeTrackingState, WorkSession,
};

/// Schema version written into every persisted session document.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;
