//! Spawn lifecycle transitions and operation gating.

use adaf_core::spawn::SpawnStatus;

use crate::error::SpawnError;

pub fn is_valid_transition(from: SpawnStatus, to: SpawnStatus) -> bool {
    use SpawnStatus::*;
    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (Pending, Running)
            | (Pending, Failed)
            | (Pending, Cancelled)
            | (Running, AwaitingInput)
            | (Running, Completed)
            | (Running, Failed)
            | (Running, Cancelled)
            | (AwaitingInput, Running)
            | (AwaitingInput, Failed)
            | (AwaitingInput, Cancelled)
            | (Completed, Merged)
            | (Completed, Rejected)
    )
}

pub fn validate_transition(
    spawn_id: u64,
    from: SpawnStatus,
    to: SpawnStatus,
    operation: &'static str,
) -> Result<(), SpawnError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(SpawnError::InvalidState {
            spawn_id,
            status: from,
            operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::is_valid_transition;
    use adaf_core::spawn::SpawnStatus::*;

    #[test]
    fn nominal_path_is_valid() {
        let path = [
            (Pending, Running),
            (Running, AwaitingInput),
            (AwaitingInput, Running),
            (Running, Completed),
            (Completed, Merged),
        ];
        for (from, to) in path {
            assert!(is_valid_transition(from, to), "expected {from}->{to}");
        }
    }

    #[test]
    fn completed_can_also_be_rejected() {
        assert!(is_valid_transition(Completed, Rejected));
    }

    #[test]
    fn terminal_states_do_not_resume() {
        for terminal in [Failed, Cancelled, Merged, Rejected] {
            assert!(!is_valid_transition(terminal, Running));
            assert!(!is_valid_transition(terminal, Pending));
        }
        // Merged/rejected are final even from each other.
        assert!(!is_valid_transition(Merged, Rejected));
        assert!(!is_valid_transition(Rejected, Merged));
    }

    #[test]
    fn merge_requires_completed() {
        assert!(!is_valid_transition(Running, Merged));
        assert!(!is_valid_transition(AwaitingInput, Merged));
        assert!(!is_valid_transition(Failed, Merged));
    }
}
