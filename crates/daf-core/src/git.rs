//! Git subprocess plumbing.
//!
//! Thin wrappers over the `git` binary; branch management for sessions
//! and the cleanliness checks `complete` depends on.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{CoreError, Result};

/// Result of merging the base branch into the work branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merge applied cleanly (or nothing to merge).
    Clean,
    /// Merge aborted; the listed paths conflicted.
    Conflicts(Vec<String>),
}

fn run_git(work_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(work_dir)
        .output()
        .map_err(|e| CoreError::Git(format!("failed to run git {}: {}", args.join(" "), e)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(CoreError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Whether the `git` binary is on PATH (tests skip when it is not).
pub fn is_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Whether `path` is inside a git worktree.
pub fn is_repo(work_dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(work_dir)
        .output()
        .map(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).trim() == "true")
        .unwrap_or(false)
}

/// Name of the checked-out branch.
pub fn current_branch(work_dir: &Path) -> Result<String> {
    run_git(work_dir, &["rev-parse", "--abbrev-ref", "HEAD"])
}

/// True when the worktree has no uncommitted changes.
pub fn is_clean(work_dir: &Path) -> Result<bool> {
    Ok(run_git(work_dir, &["status", "--porcelain"])?.is_empty())
}

/// True when the branch exists locally.
pub fn branch_exists(work_dir: &Path, branch: &str) -> bool {
    run_git(
        work_dir,
        &["rev-parse", "--verify", &format!("refs/heads/{}", branch)],
    )
    .is_ok()
}

/// Creates and checks out a branch from the current HEAD.
pub fn create_branch(work_dir: &Path, branch: &str) -> Result<()> {
    run_git(work_dir, &["checkout", "-b", branch])?;
    debug!(branch, "created branch");
    Ok(())
}

/// Checks out an existing branch.
pub fn switch_branch(work_dir: &Path, branch: &str) -> Result<()> {
    run_git(work_dir, &["checkout", branch])?;
    debug!(branch, "switched branch");
    Ok(())
}

/// Commits behind the base branch (0 when up to date).
pub fn behind_base(work_dir: &Path, base: &str) -> Result<u32> {
    let count = run_git(work_dir, &["rev-list", "--count", &format!("HEAD..{}", base)])?;
    count
        .parse()
        .map_err(|_| CoreError::Git(format!("unparseable rev-list count '{}'", count)))
}

/// Merges `base` into the current branch.
///
/// On conflict the merge is aborted and the conflicting paths are
/// returned so the caller can show them.
pub fn merge_base(work_dir: &Path, base: &str) -> Result<MergeOutcome> {
    let merge = Command::new("git")
        .args(["merge", "--no-edit", base])
        .current_dir(work_dir)
        .output()
        .map_err(|e| CoreError::Git(format!("failed to run git merge: {}", e)))?;

    if merge.status.success() {
        return Ok(MergeOutcome::Clean);
    }

    let conflicts = run_git(work_dir, &["diff", "--name-only", "--diff-filter=U"])
        .map(|out| out.lines().map(String::from).collect::<Vec<_>>())
        .unwrap_or_default();
    run_git(work_dir, &["merge", "--abort"])?;
    Ok(MergeOutcome::Conflicts(conflicts))
}

/// Stages and commits everything in the worktree.
///
/// Returns false when there was nothing to commit.
pub fn commit_all(work_dir: &Path, message: &str) -> Result<bool> {
    if is_clean(work_dir)? {
        return Ok(false);
    }
    run_git(work_dir, &["add", "-A"])?;
    run_git(work_dir, &["commit", "-m", message])?;
    Ok(true)
}

/// Remote URL of `origin`, when configured.
pub fn remote_url(work_dir: &Path) -> Option<String> {
    run_git(work_dir, &["remote", "get-url", "origin"]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) {
        run_git(dir, &["init", "-q", "-b", "main"]).unwrap();
        run_git(dir, &["config", "user.email", "test@example.com"]).unwrap();
        run_git(dir, &["config", "user.name", "Test"]).unwrap();
        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
        run_git(dir, &["add", "-A"]).unwrap();
        run_git(dir, &["commit", "-q", "-m", "init"]).unwrap();
    }

    #[test]
    fn test_repo_detection_and_branching() {
        if !is_available() {
            return;
        }
        let dir = tempdir().unwrap();
        assert!(!is_repo(dir.path()));

        init_repo(dir.path());
        assert!(is_repo(dir.path()));
        assert_eq!(current_branch(dir.path()).unwrap(), "main");
        assert!(is_clean(dir.path()).unwrap());

        create_branch(dir.path(), "feat/x").unwrap();
        assert_eq!(current_branch(dir.path()).unwrap(), "feat/x");
        assert!(branch_exists(dir.path(), "feat/x"));
        assert!(!branch_exists(dir.path(), "feat/y"));

        switch_branch(dir.path(), "main").unwrap();
        assert_eq!(current_branch(dir.path()).unwrap(), "main");
    }

    #[test]
    fn test_commit_all() {
        if !is_available() {
            return;
        }
        let dir = tempdir().unwrap();
        init_repo(dir.path());

        assert!(!commit_all(dir.path(), "nothing").unwrap());

        std::fs::write(dir.path().join("new.txt"), "content\n").unwrap();
        assert!(commit_all(dir.path(), "add new file").unwrap());
        assert!(is_clean(dir.path()).unwrap());
    }

    #[test]
    fn test_behind_base_counts_commits() {
        if !is_available() {
            return;
        }
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        create_branch(dir.path(), "feat/x").unwrap();

        switch_branch(dir.path(), "main").unwrap();
        std::fs::write(dir.path().join("main.txt"), "x\n").unwrap();
        commit_all(dir.path(), "advance main").unwrap();

        switch_branch(dir.path(), "feat/x").unwrap();
        assert_eq!(behind_base(dir.path(), "main").unwrap(), 1);

        assert_eq!(merge_base(dir.path(), "main").unwrap(), MergeOutcome::Clean);
        assert_eq!(behind_base(dir.path(), "main").unwrap(), 0);
    }

    #[test]
    fn test_merge_conflict_lists_paths() {
        if !is_available() {
            return;
        }
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        create_branch(dir.path(), "feat/x").unwrap();
        std::fs::write(dir.path().join("README.md"), "feature change\n").unwrap();
        commit_all(dir.path(), "feature edit").unwrap();

        switch_branch(dir.path(), "main").unwrap();
        std::fs::write(dir.path().join("README.md"), "main change\n").unwrap();
        commit_all(dir.path(), "main edit").unwrap();

        switch_branch(dir.path(), "feat/x").unwrap();
        match merge_base(dir.path(), "main").unwrap() {
            MergeOutcome::Conflicts(paths) => {
                assert_eq!(paths, vec!["README.md"]);
            }
            MergeOutcome::Clean => panic!("expected conflicts"),
        }
        // The merge was aborted; the worktree is usable again
        assert!(is_clean(dir.path()).unwrap());
    }
}
