//! Schema migration for persisted session documents.
//!
//! Every session document carries a `schema_version` integer. On load,
//! migrators run sequentially from the document's version to the current
//! one. Each migrator is a pure, idempotent transformation of the JSON
//! document; the caller is responsible for backing up the original file
//! before persisting a migrated document.

use serde_json::{json, Value};
use tracing::debug;

use daf_models::CURRENT_SCHEMA_VERSION;

use crate::error::{PersistenceError, Result};

/// A single-step schema migrator.
type Migrator = fn(&mut Value);

/// Migrators indexed by the version they migrate FROM. Index 0 migrates
/// v1 to v2, index 1 migrates v2 to v3.
const MIGRATORS: &[Migrator] = &[migrate_v1_to_v2, migrate_v2_to_v3];

/// Reads the schema version of a raw document. Documents written before
/// versioning was introduced are treated as v1.
pub fn document_version(doc: &Value) -> u32 {
    doc.get("schema_version")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(1)
}

/// Migrates a document in place up to [`CURRENT_SCHEMA_VERSION`].
///
/// Returns true when the document was changed.
///
/// # Errors
/// Returns `PersistenceError::Migration` for documents from a future
/// schema version.
pub fn migrate_document(doc: &mut Value) -> Result<bool> {
    let mut version = document_version(doc);
    if version > CURRENT_SCHEMA_VERSION {
        return Err(PersistenceError::Migration {
            found: version,
            reason: format!(
                "document is newer than this binary (current is v{})",
                CURRENT_SCHEMA_VERSION
            ),
        });
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(false);
    }

    while version < CURRENT_SCHEMA_VERSION {
        let migrator = MIGRATORS[(version - 1) as usize];
        migrator(doc);
        version += 1;
        debug!(version, "applied session schema migration");
    }
    doc["schema_version"] = json!(CURRENT_SCHEMA_VERSION);
    Ok(true)
}

/// v1 stored one flat record per working directory under `working_dirs`;
/// v2 introduced conversations with an active context and an archive.
fn migrate_v1_to_v2(doc: &mut Value) {
    let Some(dirs) = doc.get("working_dirs").cloned() else {
        doc["conversations"] = json!({});
        return;
    };

    let mut conversations = serde_json::Map::new();
    if let Some(dirs) = dirs.as_object() {
        for (dir, record) in dirs {
            let repo_name = std::path::Path::new(dir)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| dir.clone());

            let mut context = serde_json::Map::new();
            context.insert("project_path".to_string(), json!(dir));
            for field in ["agent_session_id", "branch", "base_branch", "remote_url"] {
                if let Some(v) = record.get(field) {
                    if !v.is_null() {
                        context.insert(field.to_string(), v.clone());
                    }
                }
            }
            let created = record
                .get("created_at")
                .cloned()
                .unwrap_or_else(|| doc.get("created_at").cloned().unwrap_or(Value::Null));
            context.insert("created_at".to_string(), created.clone());
            context.insert("last_active_at".to_string(), created);
            context.insert("message_count".to_string(), json!(0));
            context.insert("archived".to_string(), json!(false));

            conversations.insert(
                dir.clone(),
                json!({
                    "active": Value::Object(context),
                    "archived": [],
                    "repo_name": repo_name,
                }),
            );
        }
    }

    doc["conversations"] = Value::Object(conversations);
    if let Some(obj) = doc.as_object_mut() {
        obj.remove("working_dirs");
    }
}

/// v3 added explicit time-tracking state, tags, and per-context history.
fn migrate_v2_to_v3(doc: &mut Value) {
    let has_open_interval = doc
        .get("work_sessions")
        .and_then(Value::as_array)
        .is_some_and(|ws| ws.iter().any(|w| w.get("ended_at").is_none()));
    doc["time_state"] = json!(if has_open_interval { "running" } else { "paused" });

    if doc.get("tags").is_none() {
        doc["tags"] = json!([]);
    }

    if let Some(conversations) = doc.get_mut("conversations").and_then(Value::as_object_mut) {
        for conv in conversations.values_mut() {
            if let Some(active) = conv.get_mut("active") {
                if active.get("history").is_none() {
                    active["history"] = json!([]);
                }
            }
            if let Some(archived) = conv.get_mut("archived").and_then(Value::as_array_mut) {
                for ctx in archived {
                    if ctx.get("history").is_none() {
                        ctx["history"] = json!([]);
                    }
                }
            }
        }
    }
}
