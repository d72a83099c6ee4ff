//! Provider command lines per agent kind.

use crate::request::{AgentKind, TurnRequest};

/// A program plus its argument vector, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Build the subprocess invocation for a turn. Every kind is asked for
/// stream-JSON output on stdout; the prompt rides on the command line.
pub fn build_agent_command(req: &TurnRequest) -> AgentCommand {
    match &req.agent {
        AgentKind::Claude => AgentCommand {
            program: "claude".to_string(),
            args: vec![
                "-p".to_string(),
                req.prompt.clone(),
                "--model".to_string(),
                req.model.clone(),
                "--output-format".to_string(),
                "stream-json".to_string(),
                "--verbose".to_string(),
            ],
        },
        AgentKind::Codex => AgentCommand {
            program: "codex".to_string(),
            args: vec![
                "exec".to_string(),
                "--model".to_string(),
                req.model.clone(),
                "--json".to_string(),
                req.prompt.clone(),
            ],
        },
        AgentKind::Gemini => AgentCommand {
            program: "gemini".to_string(),
            args: vec![
                "--model".to_string(),
                req.model.clone(),
                "--output-format".to_string(),
                "stream-json".to_string(),
                "--prompt".to_string(),
                req.prompt.clone(),
            ],
        },
        AgentKind::Custom(program) => AgentCommand {
            program: program.clone(),
            args: vec![
                "--model".to_string(),
                req.model.clone(),
                "-p".to_string(),
                req.prompt.clone(),
            ],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::build_agent_command;
    use crate::request::{AgentKind, TurnRequest};
    use adaf_core::loop_run::Position;

    fn request(agent: AgentKind) -> TurnRequest {
        TurnRequest {
            turn_id: 1,
            session_id: 1,
            loop_run_id: None,
            step_index: None,
            position: Position::Worker,
            parent_turn: None,
            delegation: vec![],
            agent,
            model: "opus".to_string(),
            workdir: "/tmp".into(),
            project_dir: "/tmp".into(),
            prompt: "hello".to_string(),
            extra_env: vec![],
        }
    }

    #[test]
    fn claude_gets_stream_json_flags() {
        let cmd = build_agent_command(&request(AgentKind::Claude));
        assert_eq!(cmd.program, "claude");
        assert!(cmd.args.contains(&"stream-json".to_string()));
        assert!(cmd.args.contains(&"hello".to_string()));
    }

    #[test]
    fn custom_agent_uses_its_own_program() {
        let cmd = build_agent_command(&request(AgentKind::Custom("aider".to_string())));
        assert_eq!(cmd.program, "aider");
        assert!(cmd.args.contains(&"opus".to_string()));
    }
}
