//! Work-directory suggestion.
//!
//! Ranks repositories under the configured workspace roots against a
//! keyword (typically taken from the issue summary), boosted by the
//! per-repository keyword hints from configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use tracing::debug;

/// Score boost for an exact hint keyword match.
const HINT_BOOST: i64 = 100;

/// Suggests the best-matching repository directory for a keyword.
///
/// Candidates are the immediate subdirectories of each workspace root.
/// Returns `None` when nothing scores above zero.
pub fn suggest_work_dir(
    workspace_roots: &[String],
    repo_hints: &BTreeMap<String, Vec<String>>,
    keyword: &str,
) -> Option<PathBuf> {
    let matcher = SkimMatcherV2::default();
    let mut best: Option<(i64, PathBuf)> = None;

    for root in workspace_roots {
        let Ok(entries) = std::fs::read_dir(root) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let mut score = matcher.fuzzy_match(name, keyword).unwrap_or(0);
            if let Some(hints) = repo_hints.get(name) {
                let keyword_lower = keyword.to_lowercase();
                if hints.iter().any(|h| keyword_lower.contains(&h.to_lowercase())) {
                    score += HINT_BOOST;
                }
            }

            if score > 0 && best.as_ref().is_none_or(|(s, _)| score > *s) {
                best = Some((score, path));
            }
        }
    }

    if let Some((score, path)) = &best {
        debug!(score, path = %path.display(), "suggested work directory");
    }
    best.map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_matches_directory_name() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("payments-api")).unwrap();
        std::fs::create_dir(dir.path().join("web-frontend")).unwrap();

        let roots = vec![dir.path().to_string_lossy().to_string()];
        let suggestion = suggest_work_dir(&roots, &BTreeMap::new(), "payments").unwrap();
        assert!(suggestion.ends_with("payments-api"));
    }

    #[test]
    fn test_hint_beats_fuzzy_match() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("billing")).unwrap();
        std::fs::create_dir(dir.path().join("invoices-legacy")).unwrap();

        let roots = vec![dir.path().to_string_lossy().to_string()];
        let hints = BTreeMap::from([(
            "billing".to_string(),
            vec!["invoice".to_string()],
        )]);

        let suggestion = suggest_work_dir(&roots, &hints, "fix invoice rounding").unwrap();
        assert!(suggestion.ends_with("billing"));
    }

    #[test]
    fn test_no_match_returns_none() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("alpha")).unwrap();

        let roots = vec![dir.path().to_string_lossy().to_string()];
        assert!(suggest_work_dir(&roots, &BTreeMap::new(), "zzz").is_none());
    }

    #[test]
    fn test_missing_root_ignored() {
        let roots = vec!["/no/such/root".to_string()];
        assert!(suggest_work_dir(&roots, &BTreeMap::new(), "x").is_none());
    }
}
