//! Position capabilities and role resolution.
//!
//! The mapping from a step plus config to (position, worker role,
//! capabilities) is pure and deterministic; the table below is the closed
//! authority both for hiding agent commands and for enforcing them.

use adaf_core::config::Profile;
use adaf_core::loop_run::{LoopStep, Position};

/// What a step's position authorizes inside a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub can_stop: bool,
    pub can_message: bool,
    pub can_call_supervisor: bool,
    pub can_pushover: bool,
}

/// The capability table. `loop_has_supervisor` gates call-supervisor for
/// managers; `profile_can_pushover` is the profile flag threaded through
/// for every position.
pub fn capabilities(
    position: Position,
    loop_has_supervisor: bool,
    profile_can_pushover: bool,
) -> Capabilities {
    match position {
        Position::Supervisor => Capabilities {
            can_stop: true,
            can_message: true,
            can_call_supervisor: false,
            can_pushover: profile_can_pushover,
        },
        Position::Manager => Capabilities {
            can_stop: false,
            can_message: false,
            can_call_supervisor: loop_has_supervisor,
            can_pushover: profile_can_pushover,
        },
        Position::Lead | Position::Worker => Capabilities {
            can_stop: false,
            can_message: false,
            can_call_supervisor: false,
            can_pushover: profile_can_pushover,
        },
    }
}

/// The position a step runs at.
pub fn effective_position(step: &LoopStep) -> Position {
    step.position
}

/// The worker role for a step: the step's role, else the profile's role,
/// else the position name.
pub fn effective_worker_role(position: Position, step: &LoopStep, profile: &Profile) -> String {
    if !step.role.trim().is_empty() {
        return step.role.trim().to_string();
    }
    if !profile.role.trim().is_empty() {
        return profile.role.trim().to_string();
    }
    position.as_str().to_string()
}

/// Whether any step of the loop runs as supervisor.
pub fn loop_has_supervisor(steps: &[LoopStep]) -> bool {
    steps
        .iter()
        .any(|s| s.position == Position::Supervisor)
}

/// The fast-forward target for a call-supervisor from `current`: the
/// smallest index greater than `current` whose step is a supervisor, or
/// wrapping to the smallest at or before `current` otherwise. `None` when
/// the loop has no supervisor step.
pub fn next_supervisor_step_index(steps: &[LoopStep], current: usize) -> Option<usize> {
    let after = steps
        .iter()
        .enumerate()
        .skip(current + 1)
        .find(|(_, s)| s.position == Position::Supervisor)
        .map(|(i, _)| i);
    if after.is_some() {
        return after;
    }
    steps
        .iter()
        .enumerate()
        .take(current + 1)
        .find(|(_, s)| s.position == Position::Supervisor)
        .map(|(i, _)| i)
}
