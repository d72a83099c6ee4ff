//! Spawns and asks: sub-agent delegation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn lifecycle:
/// `pending → running → (awaiting_input ↔ running)* → {completed | failed |
/// cancelled}`; after `completed` the operator moves it to `merged` or
/// `rejected`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnStatus {
    #[default]
    Pending,
    Running,
    AwaitingInput,
    Completed,
    Failed,
    #[serde(alias = "canceled")]
    Cancelled,
    Merged,
    Rejected,
}

impl SpawnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::AwaitingInput => "awaiting_input",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Merged => "merged",
            Self::Rejected => "rejected",
        }
    }

    /// Accepts the legacy `"canceled"` spelling on read; always writes
    /// `"cancelled"`.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "awaiting_input" => Ok(Self::AwaitingInput),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "merged" => Ok(Self::Merged),
            "rejected" => Ok(Self::Rejected),
            other => Err(StoreError::Validation(format!(
                "invalid spawn status: {other:?}"
            ))),
        }
    }

    /// Observers stop watching once a spawn reaches this set.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Merged | Self::Rejected
        )
    }
}

impl std::fmt::Display for SpawnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spawn {
    pub id: u64,
    pub parent_turn_id: u64,
    pub parent_profile: String,
    pub child_profile: String,
    pub child_agent: String,
    pub task: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub team: String,
    /// Working copy of the parent at spawn time.
    #[serde(default)]
    pub parent_worktree: String,
    /// Isolated working copy owned by this spawn until terminal.
    #[serde(default)]
    pub worktree_path: String,
    #[serde(default)]
    pub branch: String,
    /// Nested session running the child, once started.
    #[serde(default)]
    pub child_session_id: Option<u64>,
    pub status: SpawnStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Final commit recorded on merge.
    #[serde(default)]
    pub commit_hash: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub error: String,
}

// ---------------------------------------------------------------------------
// Ask
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AskStatus {
    #[default]
    Pending,
    Answered,
    Dismissed,
}

impl AskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Answered => "answered",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "answered" => Ok(Self::Answered),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(StoreError::Validation(format!(
                "invalid ask status: {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for AskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A question raised by a spawned child back to its parent. Exists only
/// while the spawn is non-terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ask {
    pub id: u64,
    pub spawn_id: u64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reply: String,
    #[serde(default)]
    pub replied_at: Option<DateTime<Utc>>,
    pub status: AskStatus,
}
