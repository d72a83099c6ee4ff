//! The runner/controller event stream.
//!
//! A closed tagged union serialized as `{"type":"<variant>","data":{...}}`,
//! one JSON object per line on the attach channel. Dispatch happens over the
//! `type` discriminant in one place; the set is closed so NDJSON
//! compatibility stays stable.

use adaf_core::loop_run::{Position, StopReason};
use adaf_core::session::SessionStatus;
use adaf_core::spawn::SpawnStatus;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Normalized provider stream events
// ---------------------------------------------------------------------------

/// Provider stream lines normalized into a single sum of variants. Anything
/// the normalizer does not understand passes through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ContentBlockStart {
        block_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    ContentBlockDelta {
        #[serde(default)]
        text: String,
    },
    MessageStop,
    Passthrough {
        raw: serde_json::Value,
    },
}

impl StreamEvent {
    /// Normalize one raw provider line. Non-JSON lines are not events.
    pub fn parse_line(line: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
        let obj = value.as_object()?;
        let event_type = obj.get("type")?.as_str()?;
        match event_type {
            "content_block_start" => {
                let block = obj.get("content_block").and_then(|v| v.as_object());
                let block_type = block
                    .and_then(|b| b.get("type"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("text")
                    .to_string();
                let name = block
                    .and_then(|b| b.get("name"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                Some(Self::ContentBlockStart { block_type, name })
            }
            "content_block_delta" => {
                let text = obj
                    .get("delta")
                    .and_then(|d| d.get("text"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                Some(Self::ContentBlockDelta { text })
            }
            "message_stop" => Some(Self::MessageStop),
            _ => Some(Self::Passthrough { raw: value }),
        }
    }
}

// ---------------------------------------------------------------------------
// Spawn status summaries
// ---------------------------------------------------------------------------

/// Compact spawn view embedded in `spawn_status` events and prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnStatusEntry {
    pub id: u64,
    pub child_profile: String,
    pub task: String,
    pub status: SpawnStatus,
}

// ---------------------------------------------------------------------------
// Runner events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RunnerEvent {
    AgentStarted {
        turn_id: u64,
        agent: String,
        model: String,
    },
    AgentPrompt {
        turn_id: u64,
        prompt: String,
    },
    AgentEvent {
        turn_id: u64,
        event: StreamEvent,
    },
    AgentRawOutput {
        turn_id: u64,
        line: String,
    },
    SpawnStatus {
        spawns: Vec<SpawnStatusEntry>,
    },
    LoopStepStart {
        cycle: u64,
        step_index: usize,
        profile: String,
        position: Position,
    },
    LoopStepEnd {
        cycle: u64,
        step_index: usize,
    },
    LoopDone {
        reason: StopReason,
    },
    /// The provider stream for a turn ended normally (before the process
    /// result is known).
    AgentLoopDone {
        turn_id: u64,
    },
    AgentFinished {
        turn_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SessionSnapshot {
        session_id: u64,
        status: SessionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        loop_run_id: Option<u64>,
        cycle: u64,
        step_index: usize,
    },
    GuardrailViolation {
        role: String,
        tool: String,
    },
}

impl RunnerEvent {
    /// Serialize to one NDJSON line (no trailing newline).
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{RunnerEvent, StreamEvent};
    use adaf_core::loop_run::{Position, StopReason};

    #[test]
    fn events_serialize_with_type_and_data_envelope() {
        let event = RunnerEvent::LoopStepStart {
            cycle: 0,
            step_index: 1,
            profile: "eng".to_string(),
            position: Position::Worker,
        };
        let line = match event.to_ndjson() {
            Ok(l) => l,
            Err(e) => panic!("encode: {e}"),
        };
        let value: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => panic!("parse: {e}"),
        };
        assert_eq!(value["type"], "loop_step_start");
        assert_eq!(value["data"]["profile"], "eng");
        assert_eq!(value["data"]["position"], "worker");
    }

    #[test]
    fn loop_done_carries_reason() {
        let event = RunnerEvent::LoopDone {
            reason: StopReason::Stopped,
        };
        let line = match event.to_ndjson() {
            Ok(l) => l,
            Err(e) => panic!("encode: {e}"),
        };
        assert!(line.contains("\"stopped\""), "got: {line}");
    }

    #[test]
    fn ndjson_round_trip_preserves_variant() {
        let event = RunnerEvent::AgentFinished {
            turn_id: 7,
            error: Some("interrupted".to_string()),
        };
        let line = match event.to_ndjson() {
            Ok(l) => l,
            Err(e) => panic!("encode: {e}"),
        };
        let decoded: RunnerEvent = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => panic!("decode: {e}"),
        };
        assert_eq!(decoded, event);
    }

    #[test]
    fn normalizes_known_provider_lines() {
        let start = StreamEvent::parse_line(
            r#"{"type":"content_block_start","content_block":{"type":"tool_use","name":"bash"}}"#,
        );
        assert_eq!(
            start,
            Some(StreamEvent::ContentBlockStart {
                block_type: "tool_use".to_string(),
                name: Some("bash".to_string()),
            })
        );

        let delta =
            StreamEvent::parse_line(r#"{"type":"content_block_delta","delta":{"text":"hi"}}"#);
        assert_eq!(
            delta,
            Some(StreamEvent::ContentBlockDelta {
                text: "hi".to_string()
            })
        );

        let stop = StreamEvent::parse_line(r#"{"type":"message_stop"}"#);
        assert_eq!(stop, Some(StreamEvent::MessageStop));
    }

    #[test]
    fn unknown_provider_lines_pass_through() {
        let event = StreamEvent::parse_line(r#"{"type":"usage","input_tokens":12}"#);
        match event {
            Some(StreamEvent::Passthrough { raw }) => {
                assert_eq!(raw["input_tokens"], 12);
            }
            other => panic!("expected passthrough, got {other:?}"),
        }
    }

    #[test]
    fn non_json_lines_are_not_events() {
        assert_eq!(StreamEvent::parse_line("plain text"), None);
        assert_eq!(StreamEvent::parse_line(r#"["array"]"#), None);
    }
}
