//! The command table.
//!
//! Every command declares its audience and, for agent commands, the
//! position it requires. Help filtering and dispatch enforcement both
//! consult this one table; hiding and enforcing are separate concerns
//! evaluated from the same rows.

use adaf_core::envctx::RuntimeContext;
use adaf_core::loop_run::Position;

use crate::error::CliError;

/// Who may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    UserOnly,
    AgentOnly,
    Both,
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub summary: &'static str,
    pub audience: Audience,
    /// For agent invocations: the position that must match `ADAF_POSITION`.
    pub required_position: Option<Position>,
}

/// The closed command table.
pub fn commands() -> Vec<CommandSpec> {
    vec![
        spec("init", "initialize a project store", Audience::UserOnly, None),
        spec("plan", "manage plans", Audience::UserOnly, None),
        spec("sessions", "list sessions and their liveness", Audience::UserOnly, None),
        spec("attach", "subscribe to a running session's event stream", Audience::UserOnly, None),
        spec("lookup", "resolve a short hex id", Audience::Both, None),
        spec("loop-start", "start a loop session daemon", Audience::UserOnly, None),
        spec("loop-stop", "request a loop stop", Audience::Both, Some(Position::Supervisor)),
        spec(
            "loop-call-supervisor",
            "fast-forward the loop to the next supervisor step",
            Audience::AgentOnly,
            Some(Position::Manager),
        ),
        spec(
            "loop-message",
            "post a message for later steps",
            Audience::AgentOnly,
            Some(Position::Supervisor),
        ),
        spec("spawn", "delegate a task to a sub-agent", Audience::AgentOnly, None),
        spec("spawn-list", "list spawns", Audience::Both, None),
        spec("spawn-status", "show one spawn", Audience::Both, None),
        spec("spawn-diff", "diff a spawn's work against HEAD", Audience::Both, None),
        spec("spawn-merge", "merge a completed spawn", Audience::UserOnly, None),
        spec("spawn-reject", "reject a completed spawn", Audience::UserOnly, None),
        spec("spawn-cancel", "cancel a spawn and its descendants", Audience::Both, None),
        spec("spawn-wait", "wait for a spawn to finish", Audience::Both, None),
        spec("parent-ask", "ask the parent a question (blocks)", Audience::AgentOnly, None),
        spec("spawn-reply", "answer a pending ask", Audience::Both, None),
        spec("tree", "show the spawn delegation tree", Audience::Both, None),
        spec("worktree-cleanup", "remove orphaned adaf worktrees", Audience::UserOnly, None),
        spec("stats-migrate", "re-derive stats from turns and recordings", Audience::UserOnly, None),
        spec("stats-show", "show profile or loop stats", Audience::UserOnly, None),
    ]
}

fn spec(
    name: &'static str,
    summary: &'static str,
    audience: Audience,
    required_position: Option<Position>,
) -> CommandSpec {
    CommandSpec {
        name,
        summary,
        audience,
        required_position,
    }
}

pub fn find(name: &str) -> Option<CommandSpec> {
    commands().into_iter().find(|c| c.name == name)
}

/// Commands shown in help for the current context.
pub fn visible(ctx: &RuntimeContext) -> Vec<CommandSpec> {
    commands()
        .into_iter()
        .filter(|c| match c.audience {
            Audience::Both => true,
            Audience::UserOnly => !ctx.is_agent(),
            Audience::AgentOnly => ctx.is_agent(),
        })
        .filter(|c| match (ctx.is_agent(), c.required_position) {
            (true, Some(required)) => ctx.position == Some(required),
            _ => true,
        })
        .collect()
}

/// Enforce audience and position for a dispatch. Hiding a command does not
/// excuse skipping this check; both consult the same table row.
pub fn check_access(spec: &CommandSpec, ctx: &RuntimeContext) -> Result<(), CliError> {
    match spec.audience {
        Audience::Both => {}
        Audience::UserOnly => {
            if ctx.is_agent() {
                return Err(CliError::Context(format!(
                    "`adaf {}` is an operator command; it cannot run inside an agent turn",
                    spec.name
                )));
            }
        }
        Audience::AgentOnly => {
            if !ctx.is_agent() {
                return Err(CliError::Context(format!(
                    "`adaf {}` only works inside an agent turn (ADAF_TURN_ID is not set)",
                    spec.name
                )));
            }
        }
    }

    if ctx.is_agent() {
        if let Some(required) = spec.required_position {
            if ctx.position != Some(required) {
                let actual = ctx
                    .position
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_else(|| "unset".to_string());
                return Err(CliError::Context(format!(
                    "`adaf {}` requires position {:?}; this turn runs as {:?}",
                    spec.name,
                    required.as_str(),
                    actual
                )));
            }
        }
    }
    Ok(())
}
