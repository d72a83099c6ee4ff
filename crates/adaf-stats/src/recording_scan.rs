//! Usage extraction from verbatim recordings.
//!
//! Recordings hold raw provider NDJSON. The scan is tolerant: unknown and
//! malformed lines are skipped, tool-use blocks are counted by name, and
//! the final usage/cost figures win (providers re-emit running totals).

use std::collections::BTreeMap;
use std::path::Path;

use adaf_core::error::StoreError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingUsage {
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tool_calls: BTreeMap<String, u64>,
}

/// Scan one recording file. A missing recording yields zero usage.
pub fn scan_recording(path: &Path) -> Result<RecordingUsage, StoreError> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(RecordingUsage::default());
        }
        Err(err) => return Err(StoreError::io(format!("read recording {path:?}"), err)),
    };
    Ok(scan_lines(data.lines()))
}

pub fn scan_lines<'a>(lines: impl Iterator<Item = &'a str>) -> RecordingUsage {
    let mut usage = RecordingUsage::default();

    for line in lines {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line.trim()) else {
            continue;
        };
        let Some(obj) = value.as_object() else {
            continue;
        };

        if obj.get("type").and_then(|v| v.as_str()) == Some("content_block_start") {
            let block = obj.get("content_block").and_then(|v| v.as_object());
            if block.and_then(|b| b.get("type")).and_then(|v| v.as_str()) == Some("tool_use") {
                let name = block
                    .and_then(|b| b.get("name"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                *usage.tool_calls.entry(name).or_insert(0) += 1;
            }
        }

        // Running totals: the last report wins.
        if let Some(u) = find_usage(obj) {
            if let Some(input) = u.get("input_tokens").and_then(|v| v.as_u64()) {
                usage.input_tokens = input;
            }
            if let Some(output) = u.get("output_tokens").and_then(|v| v.as_u64()) {
                usage.output_tokens = output;
            }
        }
        for key in ["total_cost_usd", "cost_usd"] {
            if let Some(cost) = obj.get(key).and_then(|v| v.as_f64()) {
                usage.cost_usd = cost;
            }
        }
    }
    usage
}

fn find_usage<'a>(
    obj: &'a serde_json::Map<String, serde_json::Value>,
) -> Option<&'a serde_json::Map<String, serde_json::Value>> {
    if let Some(direct) = obj.get("usage").and_then(|v| v.as_object()) {
        return Some(direct);
    }
    obj.get("message")
        .and_then(|v| v.as_object())
        .and_then(|m| m.get("usage"))
        .and_then(|v| v.as_object())
}

#[cfg(test)]
mod tests {
    use super::scan_lines;

    #[test]
    fn counts_tool_use_blocks_by_name() {
        let lines = [
            r#"{"type":"content_block_start","content_block":{"type":"tool_use","name":"bash"}}"#,
            r#"{"type":"content_block_start","content_block":{"type":"tool_use","name":"bash"}}"#,
            r#"{"type":"content_block_start","content_block":{"type":"tool_use","name":"edit"}}"#,
            r#"{"type":"content_block_start","content_block":{"type":"text"}}"#,
        ];
        let usage = scan_lines(lines.into_iter());
        assert_eq!(usage.tool_calls.get("bash"), Some(&2));
        assert_eq!(usage.tool_calls.get("edit"), Some(&1));
        assert_eq!(usage.tool_calls.len(), 2);
    }

    #[test]
    fn last_usage_and_cost_reports_win() {
        let lines = [
            r#"{"type":"message_start","message":{"usage":{"input_tokens":10,"output_tokens":1}}}"#,
            r#"{"type":"result","usage":{"input_tokens":120,"output_tokens":45},"total_cost_usd":0.37}"#,
        ];
        let usage = scan_lines(lines.into_iter());
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 45);
        assert!((usage.cost_usd - 0.37).abs() < 1e-9);
    }

    #[test]
    fn malformed_and_unknown_lines_are_skipped() {
        let lines = [
            "not json at all",
            r#"{"type":"adaf_truncated"}"#,
            r#"{"type":"result","usage":{"input_tokens":5,"output_tokens":2}}"#,
        ];
        let usage = scan_lines(lines.into_iter());
        assert_eq!(usage.input_tokens, 5);
        assert_eq!(usage.output_tokens, 2);
    }
}
