//! Turns: the atomic unit of agent work.
//!
//! One turn is one invocation of one agent producing one recording.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Build state reported at the end of a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Passing,
    Failing,
    #[default]
    Unknown,
}

impl BuildState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passing => "passing",
            Self::Failing => "failing",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "passing" => Ok(Self::Passing),
            "failing" => Ok(Self::Failing),
            "unknown" => Ok(Self::Unknown),
            other => Err(StoreError::Validation(format!(
                "invalid build state: {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: u64,
    /// 8-hex handle for human-friendly lookup.
    pub hex_id: String,
    pub date: DateTime<Utc>,
    pub agent: String,
    pub model: String,
    pub profile: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub build_state: BuildState,
    #[serde(default)]
    pub commit_hash: String,
    #[serde(default)]
    pub known_issues: Vec<String>,
    #[serde(default)]
    pub duration_seconds: u64,
    /// The daemon session that hosted this turn.
    pub session_id: u64,
    /// Back-references into the loop run this turn belonged to, when any.
    #[serde(default)]
    pub loop_run_id: Option<u64>,
    #[serde(default)]
    pub loop_run_hex_id: String,
    #[serde(default)]
    pub step_index: Option<usize>,
    #[serde(default)]
    pub step_hex_id: String,
    /// Whether the turn completed, failed, or was interrupted.
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub interrupted: bool,
}
