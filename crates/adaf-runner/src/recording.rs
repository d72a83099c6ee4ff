//! Verbatim turn recordings.
//!
//! Every raw provider line is appended untouched to
//! `recordings/<turn_id>.ndjson` so stats can re-extract usage later. An
//! interrupted turn keeps its partial recording with a truncation marker as
//! the final line.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::RunnerError;

/// Marker line appended when a recording was cut short.
pub const TRUNCATION_MARKER: &str = r#"{"type":"adaf_truncated"}"#;

pub struct RecordingWriter {
    file: File,
}

impl RecordingWriter {
    pub fn create(path: &Path) -> Result<Self, RunnerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RunnerError::io(format!("create recordings dir {parent:?}"), e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| RunnerError::io(format!("open recording {path:?}"), e))?;
        Ok(Self { file })
    }

    /// Append one raw line. The newline is added here; the line itself is
    /// written byte-for-byte.
    pub fn append_line(&mut self, line: &str) -> Result<(), RunnerError> {
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.write_all(b"\n"))
            .map_err(|e| RunnerError::io("append recording line", e))
    }

    pub fn mark_truncated(&mut self) -> Result<(), RunnerError> {
        self.append_line(TRUNCATION_MARKER)
    }

    pub fn flush(&mut self) -> Result<(), RunnerError> {
        self.file
            .flush()
            .map_err(|e| RunnerError::io("flush recording", e))
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordingWriter, TRUNCATION_MARKER};

    #[test]
    fn appends_lines_verbatim_and_marks_truncation() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let path = dir.path().join("7.ndjson");
        let mut writer = match RecordingWriter::create(&path) {
            Ok(w) => w,
            Err(e) => panic!("create: {e}"),
        };
        let raw = r#"{"type":"content_block_delta","delta":{"text":"x"}}"#;
        if let Err(e) = writer.append_line(raw) {
            panic!("append: {e}");
        }
        if let Err(e) = writer.mark_truncated() {
            panic!("truncate: {e}");
        }
        if let Err(e) = writer.flush() {
            panic!("flush: {e}");
        }

        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => panic!("read: {e}"),
        };
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec![raw, TRUNCATION_MARKER]);
    }
}
