//! Conversation-id capture.
//!
//! When an agent is launched we do not yet know the identifier it will
//! assign to its conversation file. Capture snapshots the conversation
//! directory before the spawn, then polls for newly-appeared files
//! matching the agent's naming scheme and binds the first match. The
//! poll runs on a background thread with a bounded deadline and a
//! cancellation flag.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use daf_models::AgentSessionId;

/// Polling configuration.
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Delay between directory scans.
    pub interval: Duration,
    /// Overall deadline before giving up.
    pub timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Result of one capture run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A new conversation file appeared; its stem is the id.
    Captured(AgentSessionId),
    /// No file appeared within the deadline.
    TimedOut,
}

/// Handle to a running capture thread.
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
    rx: mpsc::Receiver<CaptureOutcome>,
    thread: std::thread::JoinHandle<()>,
}

impl CaptureHandle {
    /// Blocks until the capture finishes or times out.
    pub fn wait(self) -> CaptureOutcome {
        let outcome = self.rx.recv().unwrap_or(CaptureOutcome::TimedOut);
        let _ = self.thread.join();
        outcome
    }

    /// Non-blocking check for a finished capture.
    pub fn try_outcome(&self) -> Option<CaptureOutcome> {
        self.rx.try_recv().ok()
    }

    /// Cancels the capture thread.
    pub fn cancel(self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.thread.join();
    }
}

/// Lists the conversation files currently present.
///
/// Call this BEFORE spawning the agent; files in the snapshot are never
/// candidates for capture.
pub fn snapshot(dir: &PathBuf) -> HashSet<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return HashSet::new();
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_conversation_file(path))
        .collect()
}

fn is_conversation_file(path: &std::path::Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jsonl")
}

/// Starts the capture thread for a conversation directory.
///
/// `existing` is the pre-spawn snapshot; any `.jsonl` file not in it is
/// a candidate. When several new files appear in one scan the one with
/// the latest mtime wins, with a warning.
pub fn spawn_capture(
    dir: PathBuf,
    existing: HashSet<PathBuf>,
    config: CaptureConfig,
) -> CaptureHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let (tx, rx) = mpsc::channel();

    let thread = std::thread::spawn(move || {
        let deadline = Instant::now() + config.timeout;
        debug!(dir = %dir.display(), "capture started");

        while Instant::now() < deadline && !stop_flag.load(Ordering::Relaxed) {
            if let Some(id) = scan_for_new(&dir, &existing) {
                debug!(agent_session_id = %id, "captured conversation id");
                let _ = tx.send(CaptureOutcome::Captured(id));
                return;
            }
            std::thread::sleep(config.interval);
        }

        if !stop_flag.load(Ordering::Relaxed) {
            warn!(dir = %dir.display(), "capture timed out");
            let _ = tx.send(CaptureOutcome::TimedOut);
        }
    });

    CaptureHandle { stop, rx, thread }
}

/// One directory scan; returns the id of the newest unseen file.
fn scan_for_new(dir: &PathBuf, existing: &HashSet<PathBuf>) -> Option<AgentSessionId> {
    let mut candidates: Vec<(PathBuf, SystemTime)> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_conversation_file(path) && !existing.contains(path))
        .filter_map(|path| {
            let mtime = path.metadata().and_then(|m| m.modified()).ok()?;
            Some((path, mtime))
        })
        .collect();

    if candidates.is_empty() {
        return None;
    }
    if candidates.len() > 1 {
        warn!(
            count = candidates.len(),
            "multiple new conversation files appeared, picking the latest"
        );
    }
    candidates.sort_by_key(|(_, mtime)| *mtime);
    let (path, _) = candidates.pop()?;
    let stem = path.file_stem()?.to_string_lossy().to_string();
    Some(AgentSessionId::new(stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fast_config() -> CaptureConfig {
        CaptureConfig {
            interval: Duration::from_millis(20),
            timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_captures_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let existing = snapshot(&path);

        let handle = spawn_capture(path.clone(), existing, fast_config());

        // Simulate the agent creating its conversation file shortly
        // after spawn
        std::thread::sleep(Duration::from_millis(50));
        std::fs::write(path.join("abc-123.jsonl"), "{}\n").unwrap();

        assert_eq!(
            handle.wait(),
            CaptureOutcome::Captured(AgentSessionId::new("abc-123"))
        );
    }

    #[test]
    fn test_ignores_preexisting_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("old.jsonl"), "{}\n").unwrap();
        let existing = snapshot(&path);

        let handle = spawn_capture(path.clone(), existing, fast_config());
        std::thread::sleep(Duration::from_millis(50));
        std::fs::write(path.join("new-id.jsonl"), "{}\n").unwrap();

        assert_eq!(
            handle.wait(),
            CaptureOutcome::Captured(AgentSessionId::new("new-id"))
        );
    }

    #[test]
    fn test_ignores_non_jsonl_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let existing = snapshot(&path);

        let handle = spawn_capture(path.clone(), existing, fast_config());
        std::fs::write(path.join("notes.txt"), "x").unwrap();

        assert_eq!(handle.wait(), CaptureOutcome::TimedOut);
    }

    #[test]
    fn test_timeout_when_no_file_appears() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();

        let handle = spawn_capture(path, HashSet::new(), fast_config());
        assert_eq!(handle.wait(), CaptureOutcome::TimedOut);
    }

    #[test]
    fn test_multiple_new_files_picks_latest() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();

        std::fs::write(path.join("first.jsonl"), "{}\n").unwrap();
        std::thread::sleep(Duration::from_millis(30));
        std::fs::write(path.join("second.jsonl"), "{}\n").unwrap();

        let outcome = scan_for_new(&path, &HashSet::new()).unwrap();
        assert_eq!(outcome, AgentSessionId::new("second"));
    }

    #[test]
    fn test_cancel_stops_thread() {
        let dir = tempdir().unwrap();
        let handle = spawn_capture(
            dir.path().to_path_buf(),
            HashSet::new(),
            CaptureConfig {
                interval: Duration::from_millis(20),
                timeout: Duration::from_secs(30),
            },
        );
        // Returns promptly despite the long timeout
        handle.cancel();
    }

    #[test]
    fn test_snapshot_of_missing_dir_is_empty() {
        assert!(snapshot(&PathBuf::from("/no/such/dir")).is_empty());
    }
}
