//! `adaf attach`: subscribe to a running session's event stream.

use adaf_daemon::attach::{resolve_target, AttachClient, AttachTarget};
use adaf_runner::event::{RunnerEvent, StreamEvent};

use crate::error::CliError;
use crate::runtime::{block_on, open_store, parse_id, take_flag, take_switch};

pub fn run(mut args: Vec<String>) -> Result<(), CliError> {
    let ndjson = take_switch(&mut args, "--ndjson");
    let loop_name = take_flag(&mut args, "--loop")?;

    let target = if let Some(raw) = args.first() {
        AttachTarget::SessionId(parse_id(raw, "session id")?)
    } else if let Some(name) = loop_name {
        AttachTarget::LoopName(name)
    } else {
        AttachTarget::SingleRunning
    };

    let store = open_store()?;
    let session = resolve_target(&store, &target)?;
    let socket_path = store.session_socket_path(session.id);

    block_on(async move {
        let mut client = AttachClient::connect(&socket_path).await?;
        while let Some(event) = client.next_event().await? {
            if ndjson {
                if let Ok(line) = event.to_ndjson() {
                    println!("{line}");
                }
            } else if let Some(line) = render_human(&event) {
                println!("{line}");
            }
            if matches!(event, RunnerEvent::LoopDone { .. }) {
                break;
            }
        }
        Ok::<(), CliError>(())
    })?
}

/// Human rendering; raw provider output is elided.
fn render_human(event: &RunnerEvent) -> Option<String> {
    match event {
        RunnerEvent::SessionSnapshot {
            session_id,
            status,
            cycle,
            step_index,
            ..
        } => Some(format!(
            "== session {session_id} [{status}] cycle {cycle} step {step_index}"
        )),
        RunnerEvent::LoopStepStart {
            cycle,
            step_index,
            profile,
            position,
        } => Some(format!(
            ">> cycle {cycle} step {step_index}: {profile} ({position})"
        )),
        RunnerEvent::LoopStepEnd { cycle, step_index } => {
            Some(format!("<< cycle {cycle} step {step_index} done"))
        }
        RunnerEvent::LoopDone { reason } => Some(format!("== loop done: {reason}")),
        RunnerEvent::AgentStarted { turn_id, agent, model } => {
            Some(format!("-- turn {turn_id}: {agent} ({model})"))
        }
        RunnerEvent::AgentFinished { turn_id, error } => Some(match error {
            Some(err) => format!("-- turn {turn_id} finished: {err}"),
            None => format!("-- turn {turn_id} finished"),
        }),
        RunnerEvent::AgentEvent {
            event: StreamEvent::ContentBlockDelta { text },
            ..
        } => Some(text.clone()),
        RunnerEvent::GuardrailViolation { role, tool } => {
            Some(format!("!! guardrail violation: {role} tried {tool}"))
        }
        RunnerEvent::SpawnStatus { spawns } => Some(format!(
            "-- spawns: {}",
            spawns
                .iter()
                .map(|s| format!("{}:{}", s.id, s.status))
                .collect::<Vec<_>>()
                .join(" ")
        )),
        RunnerEvent::AgentPrompt { .. }
        | RunnerEvent::AgentRawOutput { .. }
        | RunnerEvent::AgentEvent { .. }
        | RunnerEvent::AgentLoopDone { .. } => None,
    }
}
