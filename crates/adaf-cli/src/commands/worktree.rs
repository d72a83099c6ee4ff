//! `adaf worktree-cleanup`: sweep orphaned adaf worktrees and branches.

use adaf_spawn::worktree::WorktreeManager;

use crate::error::CliError;
use crate::runtime::{block_on, find_project_dir};

pub fn cleanup(_args: Vec<String>) -> Result<(), CliError> {
    let worktrees = WorktreeManager::new(find_project_dir()?);
    let removed = block_on(worktrees.cleanup_all())??;
    println!("removed {removed} worktrees/branches");
    Ok(())
}
