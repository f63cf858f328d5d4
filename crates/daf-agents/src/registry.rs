//! Agent registry.
//!
//! All adapters are enumerated here and dispatched on a configuration
//! string. No directory scanning, no dynamic loading.

use std::collections::HashMap;
use std::sync::Arc;

use crate::claude::ClaudeAdapter;
use crate::editors::EditorAdapter;
use crate::error::{AgentError, Result};
use crate::traits::AgentAdapter;

/// Registry for agent adapters.
pub struct AgentRegistry {
    adapters: HashMap<String, Arc<dyn AgentAdapter>>,
}

impl AgentRegistry {
    /// Creates a registry with all built-in adapters.
    pub fn new() -> Self {
        let mut adapters: HashMap<String, Arc<dyn AgentAdapter>> = HashMap::new();

        let claude = Arc::new(ClaudeAdapter::new());
        adapters.insert(claude.info().id.clone(), claude);

        for editor in [
            EditorAdapter::vscode(),
            EditorAdapter::cursor(),
            EditorAdapter::windsurf(),
        ] {
            let editor = Arc::new(editor);
            adapters.insert(editor.info().id.clone(), editor);
        }

        Self { adapters }
    }

    /// Registers an adapter (used by tests to inject mock agents).
    pub fn register(&mut self, adapter: Arc<dyn AgentAdapter>) {
        self.adapters.insert(adapter.info().id.clone(), adapter);
    }

    /// Gets an adapter by canonical id or alias.
    ///
    /// # Errors
    /// Fails with `UnknownAgent` for names outside the registry.
    pub fn get(&self, name: &str) -> Result<Arc<dyn AgentAdapter>> {
        let id = Self::resolve(name).unwrap_or(name);
        self.adapters
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::UnknownAgent(name.to_string()))
    }

    /// Lists all registered adapter ids.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.adapters.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Resolves an alias to its canonical adapter id.
    pub fn resolve(alias: &str) -> Option<&'static str> {
        match alias {
            "claude" | "claude-code" | "cc" => Some("claude"),
            "vscode" | "code" | "copilot" => Some("vscode"),
            "cursor" => Some("cursor"),
            "windsurf" => Some("windsurf"),
            _ => None,
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_builtins() {
        let registry = AgentRegistry::new();
        assert_eq!(registry.list(), vec!["claude", "cursor", "vscode", "windsurf"]);
    }

    #[test]
    fn test_get_by_alias() {
        let registry = AgentRegistry::new();
        assert_eq!(registry.get("cc").unwrap().info().id, "claude");
        assert_eq!(registry.get("code").unwrap().info().id, "vscode");
        assert_eq!(registry.get("copilot").unwrap().info().id, "vscode");
    }

    #[test]
    fn test_unknown_agent() {
        let registry = AgentRegistry::new();
        assert!(matches!(
            registry.get("emacs"),
            Err(AgentError::UnknownAgent(_))
        ));
    }

    #[test]
    fn test_only_claude_captures() {
        let registry = AgentRegistry::new();
        assert!(registry.get("claude").unwrap().supports_capture());
        for editor in ["vscode", "cursor", "windsurf"] {
            assert!(!registry.get(editor).unwrap().supports_capture());
        }
    }
}
