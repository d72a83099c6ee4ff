//! Sessions: the runtime record of a daemon process.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{LoopDef, Profile, PushoverConfig, Team};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Starting,
    Running,
    Stopping,
    Done,
    Failed,
    Aborted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "aborted" => Ok(Self::Aborted),
            other => Err(StoreError::Validation(format!(
                "invalid session status: {other:?}"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Aborted)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a daemon process needs to run, snapshotted at creation time.
/// Later config edits never affect a session that has already started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: u64,
    /// PID of the daemon once claimed; stale PIDs are detected by probe.
    #[serde(default)]
    pub pid: Option<i32>,
    pub project_dir: String,
    /// Directory the agent runs in; differs from `project_dir` for spawn
    /// sessions bound to a worktree.
    pub work_dir: String,
    #[serde(default)]
    pub plan_id: String,
    pub profile: String,
    pub agent: String,
    /// Loop definition snapshot driving this session.
    pub loop_def: LoopDef,
    /// Name of the loop the definition came from; empty for one-shots.
    #[serde(default)]
    pub loop_name: String,
    /// One-shot sessions run a single cycle of a single step with one turn.
    #[serde(default)]
    pub one_shot: bool,
    /// Profiles snapshot.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    /// Teams snapshot, for delegation expansion inside the run.
    #[serde(default)]
    pub teams: BTreeMap<String, Team>,
    #[serde(default)]
    pub pushover: Option<PushoverConfig>,
    #[serde(default)]
    pub socket_path: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub last_error: String,
    /// The run this session hosts, once created.
    #[serde(default)]
    pub loop_run_id: Option<u64>,
    /// For spawn sessions: the spawn and parent turn that launched us.
    #[serde(default)]
    pub spawn_id: Option<u64>,
    #[serde(default)]
    pub parent_turn_id: Option<u64>,
    /// Refreshed by the daemon; a live pid plus a fresh heartbeat is
    /// required to trust a `running` status.
    #[serde(default)]
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
