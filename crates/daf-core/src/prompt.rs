//! Initial prompt assembly.
//!
//! Builds the text handed to the agent at launch. Purely functional:
//! the same inputs always produce the same text. Context files are
//! referenced as read instructions when the agent can read files
//! itself, and inlined otherwise.

use std::path::PathBuf;

use daf_models::SessionType;
use daf_tracker::TicketDetails;

/// Everything the assembler needs.
pub struct PromptInputs<'a> {
    /// Context files in precedence order (enterprise first); unreadable
    /// files are skipped.
    pub context_files: &'a [PathBuf],
    /// Bound tracker issue, when any.
    pub ticket: Option<&'a TicketDetails>,
    /// The user's goal for the session.
    pub goal: &'a str,
    /// Session type, for policy reminders.
    pub session_type: SessionType,
    /// Whether the agent can read files itself.
    pub agent_reads_files: bool,
}

/// Assembles the initial prompt.
pub fn assemble(inputs: &PromptInputs<'_>) -> String {
    let mut sections = Vec::new();

    let readable: Vec<&PathBuf> = inputs
        .context_files
        .iter()
        .filter(|path| path.is_file())
        .collect();
    if !readable.is_empty() {
        if inputs.agent_reads_files {
            let mut lines = vec!["Read these context files before starting:".to_string()];
            for path in &readable {
                lines.push(format!("- {}", path.display()));
            }
            sections.push(lines.join("\n"));
        } else {
            for path in &readable {
                if let Ok(content) = std::fs::read_to_string(path) {
                    sections.push(format!("CONTEXT ({}):\n{}", path.display(), content.trim()));
                }
            }
        }
    }

    if let Some(ticket) = inputs.ticket {
        let mut lines = vec![format!(
            "ISSUE {}: {} [{} / {}]",
            ticket.ticket.key, ticket.ticket.summary, ticket.ticket.kind, ticket.ticket.status
        )];
        if let Some(description) = &ticket.description {
            lines.push(description.clone());
        }
        sections.push(lines.join("\n"));
    }

    sections.push(format!("GOAL:\n{}", inputs.goal));

    match inputs.session_type {
        SessionType::TicketCreation => {
            sections.push(
                "POLICY: this is a ticket-creation session. Analyze only; \
                 do not create branches, do not commit, do not modify files."
                    .to_string(),
            );
        }
        SessionType::Investigation => {
            sections.push(
                "POLICY: this is an investigation session. Record findings \
                 as notes; do not create branches or commits."
                    .to_string(),
            );
        }
        SessionType::Development => {}
    }

    sections.join("\n\n")
}
