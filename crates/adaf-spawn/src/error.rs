//! Spawn orchestrator errors.

use adaf_core::spawn::SpawnStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpawnError {
    /// The parent's delegation set does not contain the target profile.
    #[error("delegation violation: profile {parent:?} may not spawn {child:?} (allowed: {allowed:?})")]
    Guardrail {
        parent: String,
        child: String,
        allowed: Vec<String>,
    },

    #[error("spawn {spawn_id} is {status:?} and does not support {operation}")]
    InvalidState {
        spawn_id: u64,
        status: SpawnStatus,
        operation: &'static str,
    },

    #[error("wait timeout for spawn {spawn_id}: last observed status {last:?}")]
    WaitTimeout { spawn_id: u64, last: SpawnStatus },

    #[error("wait cancelled for spawn {spawn_id}")]
    WaitCancelled { spawn_id: u64 },

    #[error("child session launch failed: {0}")]
    Launch(String),

    #[error("{context}: {detail}")]
    Git { context: String, detail: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] adaf_core::StoreError),
}

impl SpawnError {
    pub fn git(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Git {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
