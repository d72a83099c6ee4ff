//! Per-turn prompt assembly.
//!
//! A turn's prompt layers the step instructions over the role, then folds
//! in pending inter-step messages and the current spawn statuses.

use adaf_core::loop_run::LoopMessage;
use adaf_runner::event::SpawnStatusEntry;

pub struct PromptInputs<'a> {
    pub role: &'a str,
    pub instructions: &'a str,
    pub cycle: u64,
    pub turn_in_step: u32,
    pub messages: &'a [LoopMessage],
    pub spawns: &'a [SpawnStatusEntry],
}

pub fn render_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "You are acting as: {} (cycle {}, turn {}).\n",
        inputs.role, inputs.cycle, inputs.turn_in_step
    ));

    if !inputs.instructions.trim().is_empty() {
        out.push('\n');
        out.push_str(inputs.instructions.trim());
        out.push('\n');
    }

    if !inputs.messages.is_empty() {
        out.push_str("\nMessages from earlier steps:\n");
        for message in inputs.messages {
            out.push_str(&format!(
                "- [step {}] {}\n",
                message.step_index, message.content
            ));
        }
    }

    if !inputs.spawns.is_empty() {
        out.push_str("\nActive sub-agents:\n");
        for spawn in inputs.spawns {
            out.push_str(&format!(
                "- spawn {} ({}): {}: {}\n",
                spawn.id, spawn.child_profile, spawn.status, spawn.task
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{render_prompt, PromptInputs};
    use adaf_core::loop_run::LoopMessage;
    use adaf_core::spawn::SpawnStatus;
    use adaf_runner::event::SpawnStatusEntry;
    use chrono::Utc;

    #[test]
    fn renders_role_and_instructions() {
        let prompt = render_prompt(&PromptInputs {
            role: "builder",
            instructions: "Fix the failing test.",
            cycle: 2,
            turn_in_step: 1,
            messages: &[],
            spawns: &[],
        });
        assert!(prompt.contains("acting as: builder (cycle 2, turn 1)"));
        assert!(prompt.contains("Fix the failing test."));
        assert!(!prompt.contains("Messages from earlier steps"));
        assert!(!prompt.contains("Active sub-agents"));
    }

    #[test]
    fn folds_in_messages_and_spawn_statuses() {
        let messages = vec![LoopMessage {
            id: 1,
            run_id: 1,
            step_index: 0,
            content: "scope unclear".to_string(),
            created_at: Utc::now(),
        }];
        let spawns = vec![SpawnStatusEntry {
            id: 7,
            child_profile: "reviewer".to_string(),
            task: "review diff".to_string(),
            status: SpawnStatus::Running,
        }];
        let prompt = render_prompt(&PromptInputs {
            role: "manager",
            instructions: "",
            cycle: 0,
            turn_in_step: 2,
            messages: &messages,
            spawns: &spawns,
        });
        assert!(prompt.contains("[step 0] scope unclear"));
        assert!(prompt.contains("spawn 7 (reviewer): running: review diff"));
    }
}
