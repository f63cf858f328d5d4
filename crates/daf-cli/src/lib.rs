//! DevAIFlow CLI library.
//!
//! Provides the command-line surface over the session state engine:
//! argument parsing, command dispatch, the `--json` envelope, and the
//! terminal prompter backing interactive flows.

pub mod cli;
pub mod commands;
pub mod output;
pub mod prompter;
