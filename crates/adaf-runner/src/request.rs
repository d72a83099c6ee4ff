//! Turn requests and the per-turn environment.

use std::path::PathBuf;

use adaf_core::envctx;
use adaf_core::loop_run::Position;
use serde::{Deserialize, Serialize};

/// Which agent binary runs the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Claude,
    Codex,
    Gemini,
    /// Any other executable speaking NDJSON on stdout.
    Custom(String),
}

impl AgentKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "claude" => Self::Claude,
            "codex" => Self::Codex,
            "gemini" => Self::Gemini,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
            Self::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the runner needs to execute one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub turn_id: u64,
    pub session_id: u64,
    pub loop_run_id: Option<u64>,
    pub step_index: Option<usize>,
    pub position: Position,
    pub parent_turn: Option<u64>,
    /// Expanded delegation allow-list for this turn.
    pub delegation: Vec<String>,
    pub agent: AgentKind,
    pub model: String,
    pub workdir: PathBuf,
    pub project_dir: PathBuf,
    pub prompt: String,
    /// Extra overrides appended after the standard set.
    pub extra_env: Vec<(String, String)>,
}

impl TurnRequest {
    /// The `ADAF_*` environment injected into the agent subprocess.
    pub fn env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            (
                envctx::ENV_PROJECT_DIR.to_string(),
                self.project_dir.to_string_lossy().to_string(),
            ),
            (envctx::ENV_SESSION_ID.to_string(), self.session_id.to_string()),
            (envctx::ENV_TURN_ID.to_string(), self.turn_id.to_string()),
            (
                envctx::ENV_POSITION.to_string(),
                self.position.as_str().to_string(),
            ),
        ];
        if let Some(run_id) = self.loop_run_id {
            env.push((envctx::ENV_LOOP_RUN_ID.to_string(), run_id.to_string()));
        }
        if let Some(step) = self.step_index {
            env.push((envctx::ENV_LOOP_STEP_INDEX.to_string(), step.to_string()));
        }
        if let Some(parent) = self.parent_turn {
            env.push((envctx::ENV_PARENT_TURN.to_string(), parent.to_string()));
        }
        if !self.delegation.is_empty() {
            if let Ok(json) = serde_json::to_string(&self.delegation) {
                env.push((envctx::ENV_DELEGATION_JSON.to_string(), json));
            }
        }
        env.extend(self.extra_env.iter().cloned());
        env
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{AgentKind, TurnRequest};
    use adaf_core::envctx::RuntimeContext;
    use adaf_core::loop_run::Position;

    fn request() -> TurnRequest {
        TurnRequest {
            turn_id: 12,
            session_id: 3,
            loop_run_id: Some(5),
            step_index: Some(1),
            position: Position::Manager,
            parent_turn: None,
            delegation: vec!["reviewer".to_string()],
            agent: AgentKind::Claude,
            model: "opus".to_string(),
            workdir: "/tmp/w".into(),
            project_dir: "/tmp/p".into(),
            prompt: "do the thing".to_string(),
            extra_env: vec![],
        }
    }

    #[test]
    fn env_round_trips_through_runtime_context() {
        let vars: HashMap<String, String> = request().env().into_iter().collect();
        let ctx = RuntimeContext::from_vars(&vars);
        assert_eq!(ctx.turn_id, Some(12));
        assert_eq!(ctx.session_id, Some(3));
        assert_eq!(ctx.loop_run_id, Some(5));
        assert_eq!(ctx.step_index, Some(1));
        assert_eq!(ctx.position, Some(Position::Manager));
        assert_eq!(ctx.delegation, vec!["reviewer".to_string()]);
        assert!(ctx.is_agent());
    }

    #[test]
    fn agent_kind_parse_is_total() {
        assert_eq!(AgentKind::parse("claude"), AgentKind::Claude);
        assert_eq!(AgentKind::parse("codex"), AgentKind::Codex);
        assert_eq!(AgentKind::parse("gemini"), AgentKind::Gemini);
        assert_eq!(
            AgentKind::parse("aider"),
            AgentKind::Custom("aider".to_string())
        );
    }
}
