//! Attach-channel wire protocol.
//!
//! Server → client: [`RunnerEvent`] frames, one `{"type":...,"data":...}`
//! JSON object per newline-terminated UTF-8 line. Client → server: the
//! commands below, same framing.

use adaf_core::session::Session;
use adaf_runner::event::RunnerEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Cooperative shutdown of the current turn and run.
    Cancel,
    /// Ask for a fresh session snapshot frame.
    Status,
}

/// The snapshot frame sent to every new subscriber before the live tail.
pub fn snapshot_event(session: &Session, cycle: u64, step_index: usize) -> RunnerEvent {
    RunnerEvent::SessionSnapshot {
        session_id: session.id,
        status: session.status,
        loop_run_id: session.loop_run_id,
        cycle,
        step_index,
    }
}

#[cfg(test)]
mod tests {
    use super::ClientCommand;

    #[test]
    fn commands_round_trip_as_ndjson() {
        for command in [ClientCommand::Cancel, ClientCommand::Status] {
            let line = match serde_json::to_string(&command) {
                Ok(l) => l,
                Err(e) => panic!("encode: {e}"),
            };
            let decoded: ClientCommand = match serde_json::from_str(&line) {
                Ok(c) => c,
                Err(e) => panic!("decode: {e}"),
            };
            assert_eq!(decoded, command);
        }
    }

    #[test]
    fn cancel_wire_shape_is_stable() {
        let line = match serde_json::to_string(&ClientCommand::Cancel) {
            Ok(l) => l,
            Err(e) => panic!("encode: {e}"),
        };
        assert_eq!(line, r#"{"type":"cancel"}"#);
    }
}
