//! Locating the DevAIFlow root directory and its well-known files.
//!
//! The root directory is determined by:
//! 1. `DEVAIFLOW_HOME` environment variable if set
//! 2. `~/.daf-sessions` if a home directory is available
//! 3. `.daf-sessions` in the current directory as a fallback

use std::path::PathBuf;

/// Environment variable for a custom root directory.
pub const HOME_ENV: &str = "DEVAIFLOW_HOME";

/// Environment variable pointing at an enterprise config file.
pub const ENTERPRISE_CONFIG_ENV: &str = "DEVAIFLOW_ENTERPRISE_CONFIG";

/// Default root directory name under home.
const DEFAULT_ROOT: &str = ".daf-sessions";

/// Get the DevAIFlow root directory.
pub fn root_dir() -> PathBuf {
    std::env::var(HOME_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(DEFAULT_ROOT))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT))
        })
}

/// User-layer configuration file.
pub fn user_config_file(root: &std::path::Path) -> PathBuf {
    root.join("config.json")
}

/// Team-layer configuration file.
pub fn team_config_file(root: &std::path::Path) -> PathBuf {
    root.join("team.json")
}

/// Organization-layer configuration file.
pub fn organization_config_file(root: &std::path::Path) -> PathBuf {
    root.join("organization.json")
}

/// Enterprise-layer configuration file, when configured.
pub fn enterprise_config_file() -> Option<PathBuf> {
    std::env::var(ENTERPRISE_CONFIG_ENV).ok().map(PathBuf::from)
}

/// Context files handed to the prompt assembler, outermost layer first.
pub fn context_files(root: &std::path::Path) -> Vec<PathBuf> {
    ["ENTERPRISE.md", "ORGANIZATION.md", "TEAM.md", "USER.md"]
        .iter()
        .map(|name| root.join(name))
        .collect()
}

/// Directory holding per-backend configuration.
pub fn backends_dir(root: &std::path::Path) -> PathBuf {
    root.join("backends")
}

/// Per-backend configuration file.
pub fn backend_file(root: &std::path::Path, backend: &str) -> PathBuf {
    backends_dir(root).join(format!("{}.json", backend))
}

/// Diagnostic log directory.
pub fn logs_dir(root: &std::path::Path) -> PathBuf {
    root.join("logs")
}

/// Ensure the root directory exists, creating it if necessary.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_root(root: &std::path::Path) -> std::io::Result<()> {
    if !root.exists() {
        std::fs::create_dir_all(root)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_dir_is_plausible() {
        let dir = root_dir();
        assert!(dir.is_absolute() || dir.ends_with(DEFAULT_ROOT));
    }

    #[test]
    fn test_file_names() {
        let root = PathBuf::from("/r");
        assert!(user_config_file(&root).ends_with("config.json"));
        assert!(team_config_file(&root).ends_with("team.json"));
        assert!(organization_config_file(&root).ends_with("organization.json"));
        assert!(backend_file(&root, "jira").ends_with("backends/jira.json"));
        assert!(logs_dir(&root).ends_with("logs"));
    }

    #[test]
    fn test_context_files_order() {
        let root = PathBuf::from("/r");
        let files = context_files(&root);
        assert_eq!(files.len(), 4);
        assert!(files[0].ends_with("ENTERPRISE.md"));
        assert!(files[3].ends_with("USER.md"));
    }
}
