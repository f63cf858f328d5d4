//! User interaction abstraction.
//!
//! The manager never reads stdin itself; it asks an `Interactor`. The
//! CLI provides a terminal-backed implementation, and `--json` mode
//! installs [`NonInteractive`], which fails every prompt with
//! `NeedsInteractive` so scripted callers get a clean error instead of
//! a hang.

use crate::error::{CoreError, Result};

/// Prompts the manager may raise mid-operation.
pub trait Interactor {
    /// Yes/no question.
    fn confirm(&self, message: &str) -> Result<bool>;

    /// Pick one option; returns the selected index.
    fn choose(&self, message: &str, options: &[&str]) -> Result<usize>;

    /// Free-form line input.
    fn input(&self, message: &str) -> Result<String>;
}

/// Interactor for non-interactive (`--json`) runs.
pub struct NonInteractive;

impl Interactor for NonInteractive {
    fn confirm(&self, message: &str) -> Result<bool> {
        Err(CoreError::NeedsInteractive(message.to_string()))
    }

    fn choose(&self, message: &str, _options: &[&str]) -> Result<usize> {
        Err(CoreError::NeedsInteractive(message.to_string()))
    }

    fn input(&self, message: &str) -> Result<String> {
        Err(CoreError::NeedsInteractive(message.to_string()))
    }
}
