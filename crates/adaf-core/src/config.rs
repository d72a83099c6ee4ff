//! Global configuration, loaded read-only from `~/.adaf/config.json`.
//!
//! The CLI snapshots the relevant parts (profiles, the chosen loop,
//! pushover) into each session record, so a daemon never re-reads this
//! file mid-run.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::loop_run::{LoopStep, Position, StepFailurePolicy};

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A named (agent, model, role, intelligence, spawnable set) tuple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub agent: String,
    pub model: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub intelligence: String,
    /// Profiles this one may spawn directly. A `team` reference expands
    /// transitively on top of this set.
    #[serde(default)]
    pub spawnable_profiles: Vec<String>,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub can_pushover: bool,
}

/// A team names a delegation tree: profiles it contains plus sub-teams
/// whose delegations are expanded transitively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Team {
    #[serde(default)]
    pub delegation: DelegationNode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelegationNode {
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub teams: Vec<String>,
}

/// One step of a loop definition, as written by the operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopStepDef {
    pub profile: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub role: String,
    /// Turns to run this step per cycle; 0 is normalized to 1.
    #[serde(default)]
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

impl LoopStepDef {
    /// Freeze this definition into a run snapshot, normalizing zero turns
    /// to one.
    pub fn freeze(&self) -> LoopStep {
        LoopStep {
            profile: self.profile.clone(),
            position: self.position,
            role: self.role.clone(),
            turns: self.turns.max(1),
            can_stop: self.can_stop,
            can_message: self.can_message,
            can_pushover: self.can_pushover,
            instructions: self.instructions.clone(),
            team: self.team.clone(),
            on_fail: self.on_fail,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopDef {
    #[serde(default)]
    pub steps: Vec<LoopStepDef>,
}

impl LoopDef {
    /// A one-shot definition: single step, one turn, worker position.
    pub fn one_shot(profile: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            steps: vec![LoopStepDef {
                profile: profile.into(),
                position: Position::Worker,
                role: role.into(),
                turns: 1,
                ..LoopStepDef::default()
            }],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushoverConfig {
    pub token: String,
    pub user: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(default)]
    pub teams: BTreeMap<String, Team>,
    #[serde(default)]
    pub loops: BTreeMap<String, LoopDef>,
    #[serde(default)]
    pub skills: BTreeMap<String, Skill>,
    #[serde(default)]
    pub pushover: Option<PushoverConfig>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Path of the global config file: `$HOME/.adaf/config.json`.
pub fn global_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_default();
    if home.is_empty() {
        PathBuf::from(".adaf").join("config.json")
    } else {
        PathBuf::from(home).join(".adaf").join("config.json")
    }
}

/// Load the global config, returning defaults when the file is missing.
/// An unreadable or malformed file is a hard error.
pub fn load_global_config() -> Result<GlobalConfig, StoreError> {
    load_global_config_from(&global_config_path())
}

pub fn load_global_config_from(path: &std::path::Path) -> Result<GlobalConfig, StoreError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(GlobalConfig::default());
        }
        Err(err) => return Err(StoreError::io(format!("read config {path:?}"), err)),
    };
    serde_json::from_str(&data).map_err(|e| StoreError::encode(format!("parse config {path:?}"), e))
}

impl GlobalConfig {
    pub fn profile(&self, name: &str) -> Result<&Profile, StoreError> {
        self.profiles
            .get(name)
            .ok_or_else(|| StoreError::not_found("profile", name))
    }

    pub fn loop_def(&self, name: &str) -> Result<&LoopDef, StoreError> {
        self.loops
            .get(name)
            .ok_or_else(|| StoreError::not_found("loop", name))
    }
}

#[cfg(test)]
mod tests {
    use super::{load_global_config_from, LoopDef, LoopStepDef};
    use crate::loop_run::Position;

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let cfg = match load_global_config_from(&dir.path().join("config.json")) {
            Ok(c) => c,
            Err(e) => panic!("load: {e}"),
        };
        assert!(cfg.profiles.is_empty());
        assert!(cfg.loops.is_empty());
    }

    #[test]
    fn malformed_config_is_a_hard_error() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let path = dir.path().join("config.json");
        if let Err(e) = std::fs::write(&path, "{not json") {
            panic!("write: {e}");
        }
        assert!(load_global_config_from(&path).is_err());
    }

    #[test]
    fn freeze_normalizes_zero_turns_to_one() {
        let def = LoopStepDef {
            profile: "eng".to_string(),
            turns: 0,
            ..LoopStepDef::default()
        };
        assert_eq!(def.freeze().turns, 1);
    }

    #[test]
    fn one_shot_definition_is_single_worker_step() {
        let def = LoopDef::one_shot("reviewer", "review");
        assert_eq!(def.steps.len(), 1);
        assert_eq!(def.steps[0].position, Position::Worker);
        assert_eq!(def.steps[0].turns, 1);
    }
}
