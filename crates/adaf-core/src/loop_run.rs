//! Loop runs: live or historical executions of a loop definition.
//!
//! The `steps` snapshot is frozen when the run starts; later config edits
//! never affect an in-flight run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Step position within a loop (closed set). The position decides which
/// in-turn controls the agent is authorized to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Supervisor,
    Manager,
    Lead,
    #[default]
    Worker,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Manager => "manager",
            Self::Lead => "lead",
            Self::Worker => "worker",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "supervisor" => Ok(Self::Supervisor),
            "manager" => Ok(Self::Manager),
            "lead" => Ok(Self::Lead),
            "worker" => Ok(Self::Worker),
            other => Err(StoreError::Validation(format!(
                "invalid position: {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status / stop reason
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopRunStatus {
    #[default]
    Queued,
    Running,
    Stopping,
    Completed,
    Failed,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl LoopRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(StoreError::Validation(format!(
                "invalid loop run status: {other:?}"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for LoopRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Stopped,
    Failed,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Step snapshot
// ---------------------------------------------------------------------------

/// What happens to the run when a turn of this step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepFailurePolicy {
    /// Continue with the next turn (default).
    #[default]
    Continue,
    /// Fail the whole run.
    FailRun,
}

/// A loop step frozen into a run. Mirrors the `LoopStepDef` it was built
/// from, after normalization (`turns == 0` becomes 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopStep {
    pub profile: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub role: String,
    pub turns: u32,
    #[serde(default)]
    pub can_stop: bool,
    #[serde(default)]
    pub can_message: bool,
    #[serde(default)]
    pub can_pushover: bool,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub on_fail: StepFailurePolicy,
}

// ---------------------------------------------------------------------------
// LoopRun / LoopMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopRun {
    pub id: u64,
    pub hex_id: String,
    pub loop_name: String,
    pub status: LoopRunStatus,
    /// 0-based cycle counter.
    #[serde(default)]
    pub cycle: u64,
    #[serde(default)]
    pub step_index: usize,
    /// Frozen snapshot; immutable once the run starts.
    pub steps: Vec<LoopStep>,
    /// Append-only list of turn IDs produced by this run.
    #[serde(default)]
    pub turn_ids: Vec<u64>,
    /// Per-step short hex IDs keyed by `"<cycle>:<stepIndex>"`.
    #[serde(default)]
    pub step_hex_ids: BTreeMap<String, String>,
    /// The daemon session hosting this run.
    pub session_id: u64,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl LoopRun {
    /// Key into `step_hex_ids` for a (cycle, step) pair.
    pub fn step_key(cycle: u64, step_index: usize) -> String {
        format!("{cycle}:{step_index}")
    }
}

/// Inter-step note posted by one step and consumed by later steps of the
/// same run. Persists for audit after consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopMessage {
    pub id: u64,
    pub run_id: u64,
    /// Index of the step that posted the message.
    pub step_index: usize,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{LoopRun, LoopRunStatus, Position};

    #[test]
    fn status_parse_accepts_legacy_canceled_spelling() {
        let parsed = match LoopRunStatus::parse("canceled") {
            Ok(s) => s,
            Err(e) => panic!("parse: {e}"),
        };
        assert_eq!(parsed, LoopRunStatus::Cancelled);
        assert_eq!(parsed.as_str(), "cancelled");
    }

    #[test]
    fn terminal_statuses_are_exactly_the_closed_set() {
        assert!(LoopRunStatus::Completed.is_terminal());
        assert!(LoopRunStatus::Failed.is_terminal());
        assert!(LoopRunStatus::Cancelled.is_terminal());
        assert!(!LoopRunStatus::Queued.is_terminal());
        assert!(!LoopRunStatus::Running.is_terminal());
        assert!(!LoopRunStatus::Stopping.is_terminal());
    }

    #[test]
    fn step_key_formats_cycle_and_index() {
        assert_eq!(LoopRun::step_key(0, 0), "0:0");
        assert_eq!(LoopRun::step_key(3, 12), "3:12");
    }

    #[test]
    fn position_roundtrip() {
        for pos in [
            Position::Supervisor,
            Position::Manager,
            Position::Lead,
            Position::Worker,
        ] {
            let parsed = match Position::parse(pos.as_str()) {
                Ok(p) => p,
                Err(e) => panic!("parse {pos}: {e}"),
            };
            assert_eq!(parsed, pos);
        }
        assert!(Position::parse("boss").is_err());
    }
}
