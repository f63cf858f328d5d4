//! Terminal prompter.
//!
//! Backs the core's `Interactor` with rustyline. Ctrl-C and Ctrl-D
//! during a prompt cancel the operation.

use std::cell::RefCell;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use daf_core::{CoreError, Interactor, Result};

/// Interactor reading answers from the terminal.
pub struct TerminalPrompter {
    editor: RefCell<DefaultEditor>,
}

impl TerminalPrompter {
    /// Creates a prompter; fails when no terminal editor can be set up.
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().map_err(|e| CoreError::Invalid {
            what: "terminal".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            editor: RefCell::new(editor),
        })
    }

    fn readline(&self, prompt: &str) -> Result<String> {
        match self.editor.borrow_mut().readline(prompt) {
            Ok(line) => Ok(line),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Err(CoreError::Cancelled),
            Err(e) => Err(CoreError::Invalid {
                what: "input".to_string(),
                message: e.to_string(),
            }),
        }
    }
}

impl Interactor for TerminalPrompter {
    fn confirm(&self, message: &str) -> Result<bool> {
        let answer = self.readline(&format!("{} [y/N] ", message))?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    fn choose(&self, message: &str, options: &[&str]) -> Result<usize> {
        println!("{}", message);
        for (i, option) in options.iter().enumerate() {
            println!("  {}) {}", i + 1, option);
        }
        loop {
            let answer = self.readline("> ")?;
            match answer.trim().parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
                _ => println!("enter a number between 1 and {}", options.len()),
            }
        }
    }

    fn input(&self, message: &str) -> Result<String> {
        self.readline(&format!("{}: ", message))
    }
}
