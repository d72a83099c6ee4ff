//! Runtime environment context.
//!
//! Agent-context commands discover where they run from `ADAF_*` variables
//! injected by the runner. `ADAF_TURN_ID` is authoritative; the legacy
//! `ADAF_SESSION_ID` spelling is accepted as a read fallback only.

use std::collections::HashMap;

use crate::loop_run::Position;

pub const ENV_PROJECT_DIR: &str = "ADAF_PROJECT_DIR";
pub const ENV_SESSION_ID: &str = "ADAF_SESSION_ID";
pub const ENV_TURN_ID: &str = "ADAF_TURN_ID";
pub const ENV_LOOP_RUN_ID: &str = "ADAF_LOOP_RUN_ID";
pub const ENV_LOOP_STEP_INDEX: &str = "ADAF_LOOP_STEP_INDEX";
pub const ENV_POSITION: &str = "ADAF_POSITION";
pub const ENV_PARENT_TURN: &str = "ADAF_PARENT_TURN";
pub const ENV_DELEGATION_JSON: &str = "ADAF_DELEGATION_JSON";

/// Parsed runtime context. All fields optional; a plain user shell has
/// none of them set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeContext {
    pub project_dir: Option<String>,
    pub session_id: Option<u64>,
    pub turn_id: Option<u64>,
    pub loop_run_id: Option<u64>,
    pub step_index: Option<usize>,
    pub position: Option<Position>,
    pub parent_turn: Option<u64>,
    /// Expanded delegation allow-list injected for the running turn.
    pub delegation: Vec<String>,
}

impl RuntimeContext {
    /// Read the context from the process environment.
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Read the context from an explicit variable map (tests).
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let get = |key: &str| vars.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let turn_id = get(ENV_TURN_ID)
            .or_else(|| get(ENV_SESSION_ID))
            .and_then(|v| v.parse().ok());

        let delegation = get(ENV_DELEGATION_JSON)
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
            .unwrap_or_default();

        Self {
            project_dir: get(ENV_PROJECT_DIR),
            session_id: get(ENV_SESSION_ID).and_then(|v| v.parse().ok()),
            turn_id,
            loop_run_id: get(ENV_LOOP_RUN_ID).and_then(|v| v.parse().ok()),
            step_index: get(ENV_LOOP_STEP_INDEX).and_then(|v| v.parse().ok()),
            position: get(ENV_POSITION).and_then(|v| Position::parse(&v).ok()),
            parent_turn: get(ENV_PARENT_TURN).and_then(|v| v.parse().ok()),
            delegation,
        }
    }

    /// Whether the process runs inside an agent turn.
    pub fn is_agent(&self) -> bool {
        self.turn_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{RuntimeContext, ENV_POSITION, ENV_SESSION_ID, ENV_TURN_ID};
    use crate::loop_run::Position;

    #[test]
    fn turn_id_falls_back_to_legacy_session_variable() {
        let mut vars = HashMap::new();
        vars.insert(ENV_SESSION_ID.to_string(), "17".to_string());
        let ctx = RuntimeContext::from_vars(&vars);
        assert_eq!(ctx.turn_id, Some(17));
        assert!(ctx.is_agent());

        vars.insert(ENV_TURN_ID.to_string(), "23".to_string());
        let ctx = RuntimeContext::from_vars(&vars);
        assert_eq!(ctx.turn_id, Some(23), "turn id must win over fallback");
    }

    #[test]
    fn empty_environment_is_user_context() {
        let ctx = RuntimeContext::from_vars(&HashMap::new());
        assert!(!ctx.is_agent());
        assert_eq!(ctx.position, None);
    }

    #[test]
    fn position_parses_from_env() {
        let mut vars = HashMap::new();
        vars.insert(ENV_POSITION.to_string(), "manager".to_string());
        let ctx = RuntimeContext::from_vars(&vars);
        assert_eq!(ctx.position, Some(Position::Manager));
    }
}
