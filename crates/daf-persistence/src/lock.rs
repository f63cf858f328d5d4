//! Exclusive store locking.
//!
//! Mutations to the store are serialized through an advisory lock on
//! `<root>/.lock`. Where advisory locks are unavailable the lock falls
//! back to atomic sentinel-file creation; sentinel locks older than the
//! stale threshold are broken with a warning so a crashed holder cannot
//! wedge the store forever.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PersistenceError, Result};

/// Lock file name under the store root.
pub const LOCK_FILE_NAME: &str = ".lock";

/// How long to keep retrying before giving up on the lock.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between acquisition attempts.
const RETRY_STEP: Duration = Duration::from_millis(50);

/// Sentinel locks older than this are considered stale and broken.
const STALE_AFTER_SECS: i64 = 60;

/// Holder metadata written into the lock file for diagnostics.
#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockHolder {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    fn is_stale(&self) -> bool {
        (Utc::now() - self.acquired_at).num_seconds() > STALE_AFTER_SECS
    }
}

enum LockKind {
    /// OS advisory lock held on the file; released on drop or process death.
    Advisory(File),
    /// Sentinel file created atomically; removed on drop.
    Sentinel,
}

/// An exclusive lock over the store root, released on drop.
pub struct StoreLock {
    path: PathBuf,
    kind: LockKind,
}

impl StoreLock {
    /// Acquires the lock for `root`, blocking up to the acquire timeout.
    ///
    /// # Errors
    /// Returns `PersistenceError::Lock` if the lock cannot be acquired
    /// within the timeout.
    pub fn acquire(root: &Path) -> Result<Self> {
        if !root.exists() {
            fs::create_dir_all(root).map_err(|source| PersistenceError::DirectoryError {
                path: root.to_path_buf(),
                source,
            })?;
        }
        let path = root.join(LOCK_FILE_NAME);
        let deadline = Instant::now() + ACQUIRE_TIMEOUT;

        loop {
            match Self::try_advisory(&path) {
                Ok(Some(lock)) => return Ok(lock),
                Ok(None) => {} // held by someone else, retry
                Err(_) => {
                    // Advisory locks unsupported here; use the sentinel protocol
                    return Self::acquire_sentinel(&path, deadline);
                }
            }
            if Instant::now() >= deadline {
                let holder = Self::read_holder(&path);
                return Err(PersistenceError::Lock(format!(
                    "timed out waiting for {} (held by pid {})",
                    path.display(),
                    holder.map(|h| h.pid.to_string()).unwrap_or_else(|| "unknown".to_string())
                )));
            }
            std::thread::sleep(RETRY_STEP);
        }
    }

    /// One advisory-lock attempt. `Ok(None)` means the lock is held
    /// elsewhere; `Err` means the platform does not support it.
    fn try_advisory(path: &Path) -> std::io::Result<Option<StoreLock>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                Self::write_holder(&file);
                debug!(path = %path.display(), "acquired advisory store lock");
                Ok(Some(StoreLock {
                    path: path.to_path_buf(),
                    kind: LockKind::Advisory(file),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn acquire_sentinel(path: &Path, deadline: Instant) -> Result<Self> {
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(file) => {
                    Self::write_holder(&file);
                    debug!(path = %path.display(), "acquired sentinel store lock");
                    return Ok(StoreLock {
                        path: path.to_path_buf(),
                        kind: LockKind::Sentinel,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if let Some(holder) = Self::read_holder(path) {
                        if holder.is_stale() {
                            warn!(
                                pid = holder.pid,
                                acquired_at = %holder.acquired_at,
                                "breaking stale store lock"
                            );
                            let _ = fs::remove_file(path);
                            continue;
                        }
                    }
                }
                Err(source) => {
                    return Err(PersistenceError::WriteError {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
            if Instant::now() >= deadline {
                return Err(PersistenceError::Lock(format!(
                    "timed out waiting for {}",
                    path.display()
                )));
            }
            std::thread::sleep(RETRY_STEP);
        }
    }

    fn write_holder(mut file: &File) {
        if let Ok(json) = serde_json::to_string(&LockHolder::current()) {
            let _ = file.set_len(0);
            let _ = file.write_all(json.as_bytes());
        }
    }

    fn read_holder(path: &Path) -> Option<LockHolder> {
        let data = fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        match &self.kind {
            LockKind::Advisory(file) => {
                let _ = fs2::FileExt::unlock(file);
            }
            LockKind::Sentinel => {
                let _ = fs::remove_file(&self.path);
            }
        }
        debug!(path = %self.path.display(), "released store lock");
    }
}
