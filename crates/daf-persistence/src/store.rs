//! The session store.
//!
//! One directory per session under `<root>/sessions/`, plus the
//! `sessions.json` index. The index is a cache over the per-session
//! metadata files; `load_all` reconciles the two and the index is always
//! written last so a crash between writes favors the authoritative
//! per-session documents.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use daf_models::{Note, Session, SessionDescriptor, CURRENT_SCHEMA_VERSION};

use crate::atomic::{atomic_write, atomic_write_json, read_json_optional};
use crate::error::{PersistenceError, Result};
use crate::lock::StoreLock;
use crate::migration::{document_version, migrate_document};

/// Index file name under the store root.
const INDEX_FILE: &str = "sessions.json";

/// Per-session metadata file name.
const METADATA_FILE: &str = "metadata.json";

/// Per-session notes log file name.
const NOTES_FILE: &str = "notes.md";

/// The `sessions.json` document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionIndex {
    schema_version: u32,
    #[serde(default)]
    sessions: BTreeMap<String, SessionDescriptor>,
}

/// A session whose metadata could not be decoded.
#[derive(Debug)]
pub struct BrokenSession {
    /// Session directory name.
    pub name: String,
    /// Where the corrupt document was quarantined.
    pub quarantined_to: PathBuf,
}

/// Result of loading the whole store.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Successfully loaded sessions.
    pub sessions: Vec<Session>,
    /// Sessions skipped because their metadata was corrupt.
    pub broken: Vec<BrokenSession>,
}

/// Manages persistence of sessions under a root directory.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Creates a store rooted at the given directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    fn session_dir(&self, name: &str) -> PathBuf {
        self.sessions_dir().join(name)
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.session_dir(name).join(METADATA_FILE)
    }

    fn notes_path(&self, name: &str) -> PathBuf {
        self.session_dir(name).join(NOTES_FILE)
    }

    /// Runs `f` while holding the store's exclusive lock.
    ///
    /// Every mutation must go through here; reads may skip the lock and
    /// rely on atomic renames for a consistent snapshot.
    pub fn with_lock<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let _lock = StoreLock::acquire(&self.root)?;
        f(self)
    }

    /// Loads one session by name.
    ///
    /// Applies schema migrations in memory; the pre-migration document is
    /// backed up beside the original before the session is first saved.
    pub fn load(&self, name: &str) -> Result<Session> {
        let path = self.metadata_path(name);
        if !path.exists() {
            return Err(PersistenceError::NotFound {
                kind: "session".to_string(),
                id: name.to_string(),
            });
        }
        let data = fs::read_to_string(&path).map_err(|source| PersistenceError::ReadError {
            path: path.clone(),
            source,
        })?;

        let mut doc: Value = match serde_json::from_str(&data) {
            Ok(doc) => doc,
            Err(_) => return Err(self.quarantine(name, &path)),
        };

        let found = document_version(&doc);
        if migrate_document(&mut doc)? {
            self.backup_unmigrated(name, found, &data)?;
        }

        match serde_json::from_value(doc) {
            Ok(session) => Ok(session),
            Err(_) => Err(self.quarantine(name, &path)),
        }
    }

    /// Loads every session, reconciling the index with the session
    /// directories on disk.
    pub fn load_all(&self) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut index: SessionIndex = read_json_optional(&self.index_path())?.unwrap_or_default();
        let mut index_dirty = false;

        let dir = self.sessions_dir();
        let mut on_disk = Vec::new();
        if dir.exists() {
            let entries = fs::read_dir(&dir).map_err(|source| PersistenceError::ReadError {
                path: dir.clone(),
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| PersistenceError::ReadError {
                    path: dir.clone(),
                    source,
                })?;
                if entry.path().is_dir() {
                    on_disk.push(entry.file_name().to_string_lossy().to_string());
                }
            }
        }

        for name in &on_disk {
            match self.load(name) {
                Ok(session) => {
                    if !index.sessions.contains_key(name) {
                        warn!(session = %name, "session missing from index, re-indexing");
                        index.sessions.insert(name.clone(), session.descriptor());
                        index_dirty = true;
                    }
                    report.sessions.push(session);
                }
                Err(PersistenceError::Corrupt { quarantined, .. }) => {
                    report.broken.push(BrokenSession {
                        name: name.clone(),
                        quarantined_to: quarantined,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let stale: Vec<String> = index
            .sessions
            .keys()
            .filter(|name| !on_disk.contains(name))
            .cloned()
            .collect();
        for name in stale {
            warn!(session = %name, "index entry has no session directory, dropping");
            index.sessions.remove(&name);
            index_dirty = true;
        }

        if index_dirty {
            index.schema_version = CURRENT_SCHEMA_VERSION;
            atomic_write_json(&self.index_path(), &index)?;
        }

        Ok(report)
    }

    /// Returns true if a session with this name exists on disk.
    pub fn exists(&self, name: &str) -> bool {
        self.metadata_path(name).exists()
    }

    /// Saves a session: metadata first, index last.
    pub fn save(&self, session: &Session) -> Result<()> {
        let mut session = session.clone();
        session.schema_version = CURRENT_SCHEMA_VERSION;

        atomic_write_json(&self.metadata_path(&session.name), &session)?;

        let mut index: SessionIndex = read_json_optional(&self.index_path())?.unwrap_or_default();
        index.schema_version = CURRENT_SCHEMA_VERSION;
        index.sessions.insert(session.name.clone(), session.descriptor());
        atomic_write_json(&self.index_path(), &index)?;

        debug!(session = %session.name, "saved session");
        Ok(())
    }

    /// Deletes a session directory and its index entry.
    pub fn delete(&self, name: &str) -> Result<()> {
        let dir = self.session_dir(name);
        if !dir.exists() {
            return Err(PersistenceError::NotFound {
                kind: "session".to_string(),
                id: name.to_string(),
            });
        }
        fs::remove_dir_all(&dir).map_err(|source| PersistenceError::WriteError {
            path: dir,
            source,
        })?;

        let mut index: SessionIndex = read_json_optional(&self.index_path())?.unwrap_or_default();
        if index.sessions.remove(name).is_some() {
            atomic_write_json(&self.index_path(), &index)?;
        }

        debug!(session = %name, "deleted session");
        Ok(())
    }

    /// Renames a session directory and its index entry.
    ///
    /// The caller is expected to follow up with `save` for the session
    /// document carrying the new name.
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        let old_dir = self.session_dir(old_name);
        if !old_dir.exists() {
            return Err(PersistenceError::NotFound {
                kind: "session".to_string(),
                id: old_name.to_string(),
            });
        }
        let new_dir = self.session_dir(new_name);
        fs::rename(&old_dir, &new_dir).map_err(|source| PersistenceError::WriteError {
            path: new_dir,
            source,
        })?;

        let mut index: SessionIndex = read_json_optional(&self.index_path())?.unwrap_or_default();
        if index.sessions.remove(old_name).is_some() {
            atomic_write_json(&self.index_path(), &index)?;
        }

        debug!(from = %old_name, to = %new_name, "renamed session");
        Ok(())
    }

    /// Appends a note to the session's notes log.
    pub fn append_note(&self, name: &str, note: &Note) -> Result<()> {
        let path = self.notes_path(name);
        let mut content = if path.exists() {
            fs::read_to_string(&path).map_err(|source| PersistenceError::ReadError {
                path: path.clone(),
                source,
            })?
        } else {
            String::new()
        };
        content.push_str(&note.format_markdown());
        atomic_write(&path, content.as_bytes())
    }

    /// Reads the session's notes log.
    pub fn read_notes(&self, name: &str) -> Result<Vec<Note>> {
        let path = self.notes_path(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|source| PersistenceError::ReadError {
            path: path.clone(),
            source,
        })?;
        Ok(Note::parse_log(&content))
    }

    /// Rewrites the whole notes log (used when marking notes pushed).
    pub fn write_notes(&self, name: &str, notes: &[Note]) -> Result<()> {
        let content: String = notes.iter().map(Note::format_markdown).collect();
        atomic_write(&self.notes_path(name), content.as_bytes())
    }

    /// Moves a corrupt metadata file aside and reports it.
    fn quarantine(&self, name: &str, path: &Path) -> PersistenceError {
        let quarantined = path.with_file_name(format!(
            "{}.corrupt-{}",
            METADATA_FILE,
            Utc::now().format("%Y%m%dT%H%M%S")
        ));
        if let Err(e) = fs::rename(path, &quarantined) {
            warn!(session = %name, error = %e, "failed to quarantine corrupt metadata");
        } else {
            warn!(
                session = %name,
                quarantined = %quarantined.display(),
                "quarantined corrupt session metadata"
            );
        }
        PersistenceError::Corrupt {
            path: path.to_path_buf(),
            quarantined,
        }
    }

    /// Backs up a pre-migration document once per source version.
    fn backup_unmigrated(&self, name: &str, version: u32, raw: &str) -> Result<()> {
        let backup = self
            .session_dir(name)
            .join(format!("{}.v{}.bak", METADATA_FILE, version));
        if !backup.exists() {
            debug!(session = %name, backup = %backup.display(), "backing up unmigrated document");
            atomic_write(&backup, raw.as_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daf_models::{SessionType, Conversation, ConversationContext};
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        (dir, store)
    }

    fn session(name: &str) -> Session {
        let mut s = Session::new(name, "goal", SessionType::Development);
        s.add_conversation(
            "/w/repo",
            Conversation::new("repo", ConversationContext::new("/w/repo")),
        );
        s
    }

    #[test]
    fn test_save_and_load() {
        let (_dir, store) = store();
        let s = session("feat-x");

        store.save(&s).unwrap();
        let loaded = store.load("feat-x").unwrap();

        assert_eq!(loaded.name, "feat-x");
        assert_eq!(loaded.conversations.len(), 1);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load("nope"),
            Err(PersistenceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_load_all_reads_index_and_dirs() {
        let (_dir, store) = store();
        store.save(&session("a")).unwrap();
        store.save(&session("b")).unwrap();

        let report = store.load_all().unwrap();
        assert_eq!(report.sessions.len(), 2);
        assert!(report.broken.is_empty());
    }

    #[test]
    fn test_load_all_reindexes_unknown_dirs() {
        let (dir, store) = store();
        store.save(&session("a")).unwrap();
        // Simulate an index lost to a crash
        fs::remove_file(dir.path().join(INDEX_FILE)).unwrap();

        let report = store.load_all().unwrap();
        assert_eq!(report.sessions.len(), 1);
        assert!(dir.path().join(INDEX_FILE).exists());
    }

    #[test]
    fn test_load_all_drops_stale_index_entries() {
        let (dir, store) = store();
        store.save(&session("a")).unwrap();
        fs::remove_dir_all(dir.path().join("sessions/a")).unwrap();

        let report = store.load_all().unwrap();
        assert!(report.sessions.is_empty());

        let index: SessionIndex = read_json_optional(&store.index_path()).unwrap().unwrap();
        assert!(index.sessions.is_empty());
    }

    #[test]
    fn test_corrupt_metadata_is_quarantined() {
        let (dir, store) = store();
        store.save(&session("a")).unwrap();
        fs::write(dir.path().join("sessions/a/metadata.json"), "{not json").unwrap();

        let report = store.load_all().unwrap();
        assert!(report.sessions.is_empty());
        assert_eq!(report.broken.len(), 1);
        assert!(report.broken[0].quarantined_to.exists());
    }

    #[test]
    fn test_delete_removes_dir_and_index_entry() {
        let (dir, store) = store();
        store.save(&session("a")).unwrap();
        store.delete("a").unwrap();

        assert!(!dir.path().join("sessions/a").exists());
        let index: SessionIndex = read_json_optional(&store.index_path()).unwrap().unwrap();
        assert!(index.sessions.is_empty());
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.delete("nope"),
            Err(PersistenceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_save_is_idempotent_on_bytes() {
        let (dir, store) = store();
        let s = session("a");
        store.save(&s).unwrap();
        let before = fs::read(dir.path().join("sessions/a/metadata.json")).unwrap();

        let loaded = store.load("a").unwrap();
        store.save(&loaded).unwrap();
        let after = fs::read(dir.path().join("sessions/a/metadata.json")).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn test_rename_moves_dir_and_reindexes() {
        let (dir, store) = store();
        store.save(&session("creation-draft")).unwrap();
        store.append_note("creation-draft", &Note::new("alice", "n")).unwrap();

        store.rename("creation-draft", "creation-PROJ-9").unwrap();
        let mut renamed = store.load("creation-PROJ-9").unwrap();
        renamed.name = "creation-PROJ-9".to_string();
        store.save(&renamed).unwrap();

        assert!(!dir.path().join("sessions/creation-draft").exists());
        assert_eq!(store.read_notes("creation-PROJ-9").unwrap().len(), 1);
        let index: SessionIndex = read_json_optional(&store.index_path()).unwrap().unwrap();
        assert!(index.sessions.contains_key("creation-PROJ-9"));
        assert!(!index.sessions.contains_key("creation-draft"));
    }

    #[test]
    fn test_notes_append_and_read() {
        let (_dir, store) = store();
        store.save(&session("a")).unwrap();

        store.append_note("a", &Note::new("alice", "first")).unwrap();
        store.append_note("a", &Note::new("alice", "second")).unwrap();

        let notes = store.read_notes("a").unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].text, "first");
        assert_eq!(notes[1].text, "second");
    }

    #[test]
    fn test_write_notes_marks_pushed() {
        let (_dir, store) = store();
        store.save(&session("a")).unwrap();
        store.append_note("a", &Note::new("alice", "n")).unwrap();

        let mut notes = store.read_notes("a").unwrap();
        notes[0].pushed_to_tracker = true;
        store.write_notes("a", &notes).unwrap();

        let reread = store.read_notes("a").unwrap();
        assert!(reread[0].pushed_to_tracker);
    }

    #[test]
    fn test_v1_document_migrates_with_backup() {
        let (dir, store) = store();
        let v1 = serde_json::json!({
            "schema_version": 1,
            "name": "old",
            "goal": "legacy",
            "status": "created",
            "session_type": "development",
            "created_at": "2026-01-01T00:00:00Z",
            "last_active_at": "2026-01-01T00:00:00Z",
            "work_sessions": [],
            "working_dirs": {"/w/repo": {"agent_session_id": "abc", "created_at": "2026-01-01T00:00:00Z"}}
        });
        let meta_dir = dir.path().join("sessions/old");
        fs::create_dir_all(&meta_dir).unwrap();
        fs::write(
            meta_dir.join("metadata.json"),
            serde_json::to_string_pretty(&v1).unwrap(),
        )
        .unwrap();

        let loaded = store.load("old").unwrap();
        assert_eq!(loaded.schema_version, CURRENT_SCHEMA_VERSION);
        assert!(loaded.conversations.contains_key("/w/repo"));
        assert!(meta_dir.join("metadata.json.v1.bak").exists());
    }

    #[test]
    fn test_with_lock_runs_closure() {
        let (_dir, store) = store();
        let result = store
            .with_lock(|store| {
                store.save(&session("locked"))?;
                Ok(42)
            })
            .unwrap();
        assert_eq!(result, 42);
        assert!(store.exists("locked"));
    }
}
