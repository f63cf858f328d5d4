//! Session notes.
//!
//! Notes are an append-only log persisted as markdown in the session's
//! `notes.md`. The local log is authoritative; pushing a note to the
//! tracker is best-effort and recorded in the `pushed` marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker appended to the header of notes mirrored to the tracker.
const PUSHED_MARKER: &str = " [pushed]";

/// One entry in the session notes log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// When the note was taken.
    pub timestamp: DateTime<Utc>,

    /// OS user who wrote the note.
    pub author: String,

    /// Free-form note body.
    pub text: String,

    /// True once the note was mirrored to the tracker as a comment.
    #[serde(default)]
    pub pushed_to_tracker: bool,
}

impl Note {
    /// Creates a note timestamped now.
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            author: author.into(),
            text: text.into(),
            pushed_to_tracker: false,
        }
    }

    /// Renders the note as a markdown log entry.
    ///
    /// Format: `## <rfc3339> - <author>[ [pushed]]`, blank line, body,
    /// blank line.
    pub fn format_markdown(&self) -> String {
        let marker = if self.pushed_to_tracker { PUSHED_MARKER } else { "" };
        format!(
            "## {} - {}{}\n\n{}\n\n",
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.author,
            marker,
            self.text.trim_end()
        )
    }

    /// Parses a full notes log back into entries.
    ///
    /// Lines before the first header are ignored; malformed headers are
    /// skipped rather than failing the whole log.
    pub fn parse_log(content: &str) -> Vec<Note> {
        let mut notes = Vec::new();
        let mut current: Option<Note> = None;
        let mut body: Vec<&str> = Vec::new();

        let flush = |note: Option<Note>, body: &mut Vec<&str>, notes: &mut Vec<Note>| {
            if let Some(mut note) = note {
                note.text = body.join("\n").trim().to_string();
                notes.push(note);
            }
            body.clear();
        };

        for line in content.lines() {
            if let Some(header) = line.strip_prefix("## ") {
                flush(current.take(), &mut body, &mut notes);
                current = Self::parse_header(header);
            } else if current.is_some() {
                body.push(line);
            }
        }
        flush(current, &mut body, &mut notes);

        notes
    }

    fn parse_header(header: &str) -> Option<Note> {
        let (pushed, header) = match header.strip_suffix(PUSHED_MARKER.trim_start()) {
            Some(rest) => (true, rest.trim_end()),
            None => (false, header),
        };
        let (timestamp, author) = header.split_once(" - ")?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp.trim())
            .ok()?
            .with_timezone(&Utc);
        Some(Note {
            timestamp,
            author: author.trim().to_string(),
            text: String::new(),
            pushed_to_tracker: pushed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse_roundtrip() {
        let mut note = Note::new("alice", "first finding\nwith a second line");
        note.pushed_to_tracker = true;
        let other = Note::new("bob", "another note");

        let log = format!("{}{}", note.format_markdown(), other.format_markdown());
        let parsed = Note::parse_log(&log);

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].author, "alice");
        assert!(parsed[0].pushed_to_tracker);
        assert_eq!(parsed[0].text, "first finding\nwith a second line");
        assert_eq!(parsed[1].author, "bob");
        assert!(!parsed[1].pushed_to_tracker);
    }

    #[test]
    fn test_parse_preserves_order() {
        let a = Note::new("alice", "one");
        let b = Note::new("alice", "two");
        let log = format!("{}{}", a.format_markdown(), b.format_markdown());

        let parsed = Note::parse_log(&log);
        assert_eq!(parsed[0].text, "one");
        assert_eq!(parsed[1].text, "two");
    }

    #[test]
    fn test_parse_skips_preamble_and_bad_headers() {
        let log = "# Session notes\n\n## not a timestamp - alice\n\nbody\n\n";
        assert!(Note::parse_log(log).is_empty());
    }

    #[test]
    fn test_parse_empty_log() {
        assert!(Note::parse_log("").is_empty());
    }

    #[test]
    fn test_timestamp_second_precision() {
        let note = Note::new("alice", "x");
        let parsed = &Note::parse_log(&note.format_markdown())[0];
        assert_eq!(
            parsed.timestamp.timestamp(),
            note.timestamp.timestamp()
        );
    }
}
