//! Store-as-IPC signal markers.
//!
//! Stop, call-supervisor, and interrupt signals are files under the hosting
//! session's directory (`sessions/<id>/`). Markers are idempotent, survive
//! daemon restarts, and are polled by the controller between turns.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::loop_run::LoopMessage;
use crate::store::Store;

/// Per-turn interrupt kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptKind {
    CallSupervisor,
    UserAbort,
}

impl InterruptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CallSupervisor => "call_supervisor",
            Self::UserAbort => "user_abort",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "call_supervisor" => Ok(Self::CallSupervisor),
            "user_abort" => Ok(Self::UserAbort),
            other => Err(StoreError::Validation(format!(
                "invalid interrupt kind: {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for InterruptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `callsup-<step>` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSupervisorSignal {
    pub from_step: usize,
    pub to_step: usize,
    pub content: String,
}

impl Store {
    fn ensure_signal_dir(&self, session_id: u64) -> Result<PathBuf, StoreError> {
        let dir = self.session_signal_dir(session_id);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(format!("create {dir:?}"), e))?;
        Ok(dir)
    }

    // -----------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------

    /// Write the stop marker for a run. Idempotent.
    pub fn signal_loop_stop(&self, run_id: u64) -> Result<(), StoreError> {
        let run = self.get_loop_run(run_id)?;
        let dir = self.ensure_signal_dir(run.session_id)?;
        fs::write(dir.join("stop"), b"")
            .map_err(|e| StoreError::io(format!("write stop marker for run {run_id}"), e))
    }

    pub fn is_loop_stopped(&self, run_id: u64) -> Result<bool, StoreError> {
        let run = self.get_loop_run(run_id)?;
        Ok(self
            .session_signal_dir(run.session_id)
            .join("stop")
            .exists())
    }

    // -----------------------------------------------------------------
    // Call supervisor
    // -----------------------------------------------------------------

    /// Write a fast-forward marker naming the target step and post the loop
    /// message carrying the same content.
    pub fn signal_loop_call_supervisor(
        &self,
        run_id: u64,
        from_step: usize,
        to_step: usize,
        content: &str,
    ) -> Result<(), StoreError> {
        let run = self.get_loop_run(run_id)?;
        let dir = self.ensure_signal_dir(run.session_id)?;

        let signal = CallSupervisorSignal {
            from_step,
            to_step,
            content: content.to_string(),
        };
        let data = serde_json::to_string(&signal)
            .map_err(|e| StoreError::encode("encode call-supervisor marker", e))?;
        fs::write(dir.join(format!("callsup-{to_step}")), data).map_err(|e| {
            StoreError::io(format!("write call-supervisor marker for run {run_id}"), e)
        })?;

        let mut message = LoopMessage {
            id: 0,
            run_id,
            step_index: from_step,
            content: content.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.create_loop_message(&mut message)
    }

    /// The pending call-supervisor signal for a session, if any.
    pub fn pending_call_supervisor(
        &self,
        session_id: u64,
    ) -> Result<Option<CallSupervisorSignal>, StoreError> {
        let dir = self.session_signal_dir(session_id);
        for name in list_marker_names(&dir)? {
            if name.starts_with("callsup-") {
                let path = dir.join(&name);
                let data = fs::read_to_string(&path)
                    .map_err(|e| StoreError::io(format!("read marker {path:?}"), e))?;
                let signal = serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
                    path,
                    detail: e.to_string(),
                })?;
                return Ok(Some(signal));
            }
        }
        Ok(None)
    }

    pub fn clear_call_supervisor(&self, session_id: u64) -> Result<(), StoreError> {
        let dir = self.session_signal_dir(session_id);
        for name in list_marker_names(&dir)? {
            if name.starts_with("callsup-") {
                let path = dir.join(&name);
                fs::remove_file(&path)
                    .map_err(|e| StoreError::io(format!("remove marker {path:?}"), e))?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Per-turn interrupts
    // -----------------------------------------------------------------

    /// Write an interrupt marker for a turn. Idempotent.
    pub fn signal_interrupt(&self, turn_id: u64, kind: InterruptKind) -> Result<(), StoreError> {
        let turn = self.get_turn(turn_id)?;
        let dir = self.ensure_signal_dir(turn.session_id)?;
        fs::write(dir.join(format!("interrupt-{turn_id}-{kind}")), b"")
            .map_err(|e| StoreError::io(format!("write interrupt marker for turn {turn_id}"), e))
    }

    /// The pending interrupt for a turn, if any. `user_abort` wins when
    /// both kinds are present.
    pub fn pending_interrupt(
        &self,
        session_id: u64,
        turn_id: u64,
    ) -> Result<Option<InterruptKind>, StoreError> {
        let dir = self.session_signal_dir(session_id);
        let mut found = None;
        let prefix = format!("interrupt-{turn_id}-");
        for name in list_marker_names(&dir)? {
            if let Some(kind_str) = name.strip_prefix(&prefix) {
                let kind = InterruptKind::parse(kind_str)?;
                if kind == InterruptKind::UserAbort {
                    return Ok(Some(kind));
                }
                found = Some(kind);
            }
        }
        Ok(found)
    }

    pub fn clear_interrupts_for_turn(
        &self,
        session_id: u64,
        turn_id: u64,
    ) -> Result<(), StoreError> {
        let dir = self.session_signal_dir(session_id);
        let prefix = format!("interrupt-{turn_id}-");
        for name in list_marker_names(&dir)? {
            if name.starts_with(&prefix) {
                let path = dir.join(&name);
                fs::remove_file(&path)
                    .map_err(|e| StoreError::io(format!("remove marker {path:?}"), e))?;
            }
        }
        Ok(())
    }

    /// Remove the whole signal directory; called when a session finalizes.
    pub fn clear_session_signals(&self, session_id: u64) -> Result<(), StoreError> {
        let dir = self.session_signal_dir(session_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(format!("remove signal dir {dir:?}"), err)),
        }
    }
}

fn list_marker_names(dir: &std::path::Path) -> Result<Vec<String>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(StoreError::io(format!("read signal dir {dir:?}"), err)),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(format!("read signal entry in {dir:?}"), e))?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
