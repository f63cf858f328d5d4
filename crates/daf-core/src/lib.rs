//! Session state engine for DevAIFlow.
//!
//! This crate composes the store, tracker, agents, and configuration
//! into the `SessionManager`, the single writer of durable session
//! state. It also hosts the cross-cutting pieces: the safety guard that
//! refuses mutations from inside a spawned agent, time tracking, git
//! plumbing, prompt assembly, and the summarizer interface.

pub mod error;
pub mod git;
pub mod guard;
pub mod interact;
pub mod manager;
pub mod prompt;
pub mod summarize;
pub mod time;

pub use error::{CoreError, Result};
pub use guard::{Operation, SafetyGuard};
pub use interact::{Interactor, NonInteractive};
pub use manager::{CompleteOptions, CompleteReport, NewSessionParams, SessionManager, SyncReport};
pub use summarize::{summarizer_for, ConversationSummarizer, LocalSummarizer, NullSummarizer};
pub use time::TimeTracker;
