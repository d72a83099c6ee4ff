//! adaf-spawn: worktree isolation and sub-agent delegation.

pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod worktree;

pub use error::SpawnError;
pub use orchestrator::{
    NullSessionSpawner, Orchestrator, SessionSpawner, SpawnRequest, SpawnTreeNode,
};
pub use worktree::{WorktreeInfo, WorktreeManager, BRANCH_PREFIX};
