//! Per-spawn isolated working copies.
//!
//! A worktree is a fresh checkout of the current HEAD into a private
//! directory under `.adaf/worktrees/`, on a branch named
//! `adaf/spawn-<id>-<rand>`. The `adaf/` prefix is the cleanup key: crash
//! recovery and `worktree cleanup` enumerate everything carrying it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::SpawnError;

/// Branch namespace owned by ADAF.
pub const BRANCH_PREFIX: &str = "adaf/";

/// Bound on any single git invocation.
const GIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
}

#[derive(Debug, Clone)]
pub struct WorktreeManager {
    repo_root: PathBuf,
    worktrees_dir: PathBuf,
}

impl WorktreeManager {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        let repo_root = repo_root.into();
        let worktrees_dir = repo_root.join(".adaf").join("worktrees");
        Self {
            repo_root,
            worktrees_dir,
        }
    }

    /// Check out the current HEAD into a fresh worktree for a spawn.
    pub async fn create(&self, spawn_id: u64) -> Result<WorktreeInfo, SpawnError> {
        let suffix = &adaf_core::ids::new_short_hex()[..4];
        let name = format!("spawn-{spawn_id}-{suffix}");
        let branch = format!("{BRANCH_PREFIX}{name}");
        let path = self.worktrees_dir.join(&name);

        std::fs::create_dir_all(&self.worktrees_dir)
            .map_err(|e| SpawnError::io("create worktrees dir", e))?;

        let path_str = path.to_string_lossy().to_string();
        self.git(
            &[
                "worktree",
                "add",
                "-b",
                branch.as_str(),
                path_str.as_str(),
                "HEAD",
            ],
            "git worktree add",
        )
        .await?;
        debug!(spawn = spawn_id, branch = %branch, "worktree created");

        Ok(WorktreeInfo { path, branch })
    }

    /// Remove just the checkout directory, keeping the branch. Used when a
    /// spawn completes: its commits stay reachable for diff and merge while
    /// the directory goes away.
    pub async fn remove_dir(&self, path: &Path) -> Result<(), SpawnError> {
        if !path.exists() {
            return Ok(());
        }
        let path_str = path.to_string_lossy().to_string();
        self.git(
            &["worktree", "remove", "--force", path_str.as_str()],
            "git worktree remove",
        )
        .await
        .map(|_| ())
    }

    /// Remove a worktree and delete its branch. Safe to call when either is
    /// already gone.
    pub async fn remove(&self, path: &Path, branch: &str) -> Result<(), SpawnError> {
        self.remove_dir(path).await?;
        if !branch.is_empty() {
            // The branch may be merged or already deleted; both are fine.
            if let Err(err) = self.git(&["branch", "-D", branch], "git branch -D").await {
                debug!(branch = %branch, error = %err, "branch delete skipped");
            }
        }
        Ok(())
    }

    /// All live worktrees on `adaf/` branches.
    pub async fn list_active(&self) -> Result<Vec<WorktreeInfo>, SpawnError> {
        let output = self
            .git(&["worktree", "list", "--porcelain"], "git worktree list")
            .await?;

        let mut active = Vec::new();
        let mut current_path: Option<PathBuf> = None;
        for line in output.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                current_path = Some(PathBuf::from(path));
            } else if let Some(branch_ref) = line.strip_prefix("branch ") {
                let branch = branch_ref
                    .strip_prefix("refs/heads/")
                    .unwrap_or(branch_ref)
                    .to_string();
                if branch.starts_with(BRANCH_PREFIX) {
                    if let Some(path) = current_path.take() {
                        active.push(WorktreeInfo { path, branch });
                    }
                }
            } else if line.is_empty() {
                current_path = None;
            }
        }
        Ok(active)
    }

    /// Remove every `adaf/` worktree and branch. Used for crash recovery on
    /// startup and by `worktree cleanup`.
    pub async fn cleanup_all(&self) -> Result<usize, SpawnError> {
        let active = self.list_active().await?;
        let mut removed = 0;
        for info in &active {
            self.remove(&info.path, &info.branch).await?;
            removed += 1;
        }
        self.git(&["worktree", "prune"], "git worktree prune").await?;

        // Orphaned branches with no worktree still count as ours.
        let branches = self
            .git(
                &["branch", "--list", "--format=%(refname:short)", "adaf/*"],
                "git branch --list",
            )
            .await?;
        for branch in branches.lines().map(str::trim).filter(|b| !b.is_empty()) {
            if let Err(err) = self.git(&["branch", "-D", branch], "git branch -D").await {
                warn!(branch = %branch, error = %err, "orphan branch delete failed");
            } else {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// The diff a spawn branch carries relative to the mainline HEAD.
    pub async fn diff_against_head(&self, branch: &str) -> Result<String, SpawnError> {
        let range = format!("HEAD...{branch}");
        self.git(&["diff", range.as_str()], "git diff").await
    }

    /// Whether the primary working tree has no local modifications.
    pub async fn is_clean(&self) -> Result<bool, SpawnError> {
        let status = self
            .git(&["status", "--porcelain"], "git status")
            .await?;
        Ok(status.trim().is_empty())
    }

    /// Fast-forward HEAD to a spawn branch, falling back to a merge commit.
    /// Returns the resulting commit hash. Aborts the merge on conflict.
    pub async fn merge_branch(&self, branch: &str, message: &str) -> Result<String, SpawnError> {
        let ff = self
            .git(&["merge", "--ff-only", branch], "git merge --ff-only")
            .await;
        if ff.is_err() {
            let merged = self
                .git(&["merge", "--no-ff", "-m", message, branch], "git merge")
                .await;
            if let Err(err) = merged {
                let _ = self.git(&["merge", "--abort"], "git merge --abort").await;
                return Err(err);
            }
        }
        let head = self.git(&["rev-parse", "HEAD"], "git rev-parse").await?;
        Ok(head.trim().to_string())
    }

    async fn git(&self, args: &[&str], context: &str) -> Result<String, SpawnError> {
        let result = tokio::time::timeout(
            GIT_TIMEOUT,
            Command::new("git")
                .args(args)
                .current_dir(&self.repo_root)
                .output(),
        )
        .await
        .map_err(|_| {
            SpawnError::git(context, format!("timed out after {}s", GIT_TIMEOUT.as_secs()))
        })?
        .map_err(|e| SpawnError::io(context.to_string(), e))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SpawnError::git(context, stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&result.stdout).to_string())
    }
}
