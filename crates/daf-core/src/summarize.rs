//! Conversation summarization.
//!
//! At archival time a conversation can be summarized for the history
//! chain. The core never generates natural language itself: the `ai`
//! and `both` modes call whatever external generator is configured, and
//! degrade to the local heuristic (or nothing) when none is available.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use daf_config::SummaryMode;

/// Maximum length of a locally-extracted summary.
const MAX_SUMMARY_LEN: usize = 400;

/// Produces a summary for an archived conversation.
pub trait ConversationSummarizer: Send + Sync {
    /// Summarizes the conversation file; `None` when no summary can or
    /// should be produced.
    fn summarize(&self, conversation_file: &Path) -> Option<String>;
}

/// Heuristic summarizer: extracts the tail of the transcript.
///
/// Conversation files are line-delimited JSON; the last non-empty text
/// content found is taken as the closest thing to an outcome statement.
pub struct LocalSummarizer;

impl ConversationSummarizer for LocalSummarizer {
    fn summarize(&self, conversation_file: &Path) -> Option<String> {
        let content = std::fs::read_to_string(conversation_file).ok()?;
        let mut last_text = None;

        for line in content.lines() {
            let Ok(value) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            if let Some(text) = extract_message_text(&value) {
                if !text.trim().is_empty() {
                    last_text = Some(text);
                }
            }
        }

        let text = last_text?;
        let mut summary = text.trim().replace('\n', " ");
        if summary.len() > MAX_SUMMARY_LEN {
            let mut end = MAX_SUMMARY_LEN;
            while !summary.is_char_boundary(end) {
                end -= 1;
            }
            summary.truncate(end);
            summary.push_str("...");
        }
        debug!(file = %conversation_file.display(), "extracted local summary");
        Some(summary)
    }
}

/// Summarizer for mode `none`.
pub struct NullSummarizer;

impl ConversationSummarizer for NullSummarizer {
    fn summarize(&self, _conversation_file: &Path) -> Option<String> {
        None
    }
}

/// Picks the summarizer for a configured mode.
///
/// `ai` and `both` fall back to the local heuristic; plugging in an
/// external generator replaces this factory's result.
pub fn summarizer_for(mode: SummaryMode) -> Box<dyn ConversationSummarizer> {
    match mode {
        SummaryMode::None => Box::new(NullSummarizer),
        SummaryMode::Local | SummaryMode::Ai | SummaryMode::Both => Box::new(LocalSummarizer),
    }
}

/// Pulls displayable text out of one transcript line.
fn extract_message_text(value: &Value) -> Option<String> {
    if let Some(text) = value.pointer("/message/content").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    if let Some(parts) = value.pointer("/message/content").and_then(Value::as_array) {
        let texts: Vec<&str> = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        if !texts.is_empty() {
            return Some(texts.join(" "));
        }
    }
    value
        .get("text")
        .or_else(|| value.get("content"))
        .and_then(Value::as_str)
        .map(String::from)
}
