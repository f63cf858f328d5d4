//! Layered settings.
//!
//! A `SettingsLayer` is one sparse configuration document; `Settings` is
//! the merged, fully-resolved view with defaults applied.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::fields::CommentVisibility;
use crate::paths;

/// How to authenticate against the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// `Authorization: Basic base64(email:token)`.
    Basic,
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// Try bearer first, fall back to basic on 401.
    #[default]
    Auto,
}

/// How conversation summaries are generated at archival time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMode {
    /// External AI summarizer only.
    Ai,
    /// Local heuristic extraction only.
    #[default]
    Local,
    /// AI with local fallback.
    Both,
    /// No summaries.
    None,
}

/// Per-prompt behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromptChoice {
    /// Act without asking.
    Always,
    /// Skip without asking.
    Never,
    /// Ask interactively.
    #[default]
    Ask,
}

/// Tri-state policy for each interactive prompt the manager can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PromptsPolicy {
    /// Reopen an issue found in a closed state at `open`.
    #[serde(default)]
    pub reopen_closed: PromptChoice,
    /// Transition the issue when completing a session.
    #[serde(default)]
    pub transition_on_complete: PromptChoice,
    /// Create a git branch for a new session.
    #[serde(default)]
    pub create_branch: PromptChoice,
    /// Mirror notes to the tracker.
    #[serde(default)]
    pub push_notes: PromptChoice,
}

/// What to do when a best-effort remote action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Warn and keep the local result.
    #[default]
    Warn,
    /// Abort the whole operation.
    Block,
}

/// Policy for tracker transitions proposed at open/complete time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPolicy {
    /// Fetch available transitions and ask; when false, use `to` directly.
    #[serde(default = "default_true")]
    pub prompt: bool,
    /// Target state used when `prompt` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Failure handling for the remote call.
    #[serde(default)]
    pub on_fail: FailurePolicy,
}

fn default_true() -> bool {
    true
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            prompt: true,
            to: None,
            on_fail: FailurePolicy::Warn,
        }
    }
}

/// One sparse configuration layer. Every field is optional; unset fields
/// defer to lower layers and finally to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsLayer {
    /// Tracker backend name (`jira`, `mock`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Tracker endpoint URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracker_url: Option<String>,

    /// Tracker authentication mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<AuthType>,

    /// Default tracker project code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Workstream label applied to created issues.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workstream: Option<String>,

    /// Agent adapter name (`claude`, `vscode`, `cursor`, `windsurf`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// Summary generation mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_mode: Option<SummaryMode>,

    /// Workspace roots searched for repositories; `~` is expanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_roots: Option<Vec<String>>,

    /// Repository keyword hints: repo name -> keywords.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_hints: Option<BTreeMap<String, Vec<String>>>,

    /// Prompt policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsPolicy>,

    /// Transition policy applied at `open` for closed issues.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_open: Option<TransitionPolicy>,

    /// Transition policy applied at `complete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_complete: Option<TransitionPolicy>,

    /// Visibility restriction for tracker comments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_visibility: Option<CommentVisibility>,
}

impl SettingsLayer {
    /// Loads a layer file, returning an empty layer when it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::InvalidConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlays `higher` on top of this layer; set fields in `higher` win.
    /// `repo_hints` are unioned key-wise with the higher layer winning.
    pub fn overlay(&mut self, higher: SettingsLayer) {
        macro_rules! take {
            ($field:ident) => {
                if higher.$field.is_some() {
                    self.$field = higher.$field;
                }
            };
        }
        take!(backend);
        take!(tracker_url);
        take!(auth_type);
        take!(project);
        take!(workstream);
        take!(agent);
        take!(summary_mode);
        take!(workspace_roots);
        take!(prompts);
        take!(on_open);
        take!(on_complete);
        take!(comment_visibility);

        if let Some(higher_hints) = higher.repo_hints {
            let hints = self.repo_hints.get_or_insert_with(BTreeMap::new);
            for (repo, keywords) in higher_hints {
                hints.insert(repo, keywords);
            }
        }
    }
}

/// The merged, fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: String,
    pub tracker_url: Option<String>,
    pub auth_type: AuthType,
    pub project: Option<String>,
    pub workstream: Option<String>,
    pub agent: String,
    pub summary_mode: SummaryMode,
    pub workspace_roots: Vec<String>,
    pub repo_hints: BTreeMap<String, Vec<String>>,
    pub prompts: PromptsPolicy,
    pub on_open: TransitionPolicy,
    pub on_complete: TransitionPolicy,
    pub comment_visibility: Option<CommentVisibility>,
}

impl Settings {
    /// Loads and merges every layer for the given root directory.
    ///
    /// `session_overrides` is the session-local layer stored inside the
    /// session metadata, when a session is in scope.
    pub fn load(
        root: &Path,
        session_overrides: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Self> {
        // Lowest precedence first; each subsequent overlay wins
        let mut merged = match session_overrides {
            Some(map) => {
                serde_json::from_value(serde_json::Value::Object(map.clone())).unwrap_or_default()
            }
            None => SettingsLayer::default(),
        };
        merged.overlay(SettingsLayer::load(&paths::user_config_file(root))?);
        merged.overlay(SettingsLayer::load(&paths::team_config_file(root))?);
        merged.overlay(SettingsLayer::load(&paths::organization_config_file(root))?);
        if let Some(enterprise) = paths::enterprise_config_file() {
            merged.overlay(SettingsLayer::load(&enterprise)?);
        }

        debug!(backend = merged.backend.as_deref().unwrap_or("jira"), "resolved settings");
        Ok(Self::resolve(merged))
    }

    /// Applies defaults to a merged layer.
    pub fn resolve(layer: SettingsLayer) -> Self {
        let workspace_roots = layer
            .workspace_roots
            .unwrap_or_default()
            .into_iter()
            .map(|root| shellexpand::tilde(&root).into_owned())
            .collect();
        Self {
            backend: layer.backend.unwrap_or_else(|| "jira".to_string()),
            tracker_url: layer.tracker_url,
            auth_type: layer.auth_type.unwrap_or_default(),
            project: layer.project,
            workstream: layer.workstream,
            agent: layer.agent.unwrap_or_else(|| "claude".to_string()),
            summary_mode: layer.summary_mode.unwrap_or_default(),
            workspace_roots,
            repo_hints: layer.repo_hints.unwrap_or_default(),
            prompts: layer.prompts.unwrap_or_default(),
            on_open: layer.on_open.unwrap_or_default(),
            on_complete: layer.on_complete.unwrap_or_default(),
            comment_visibility: layer.comment_visibility,
        }
    }
}
