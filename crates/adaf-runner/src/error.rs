//! Runner error taxonomy.

use adaf_core::signal::InterruptKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// The agent subprocess failed to start or exited abnormally.
    #[error("agent failure: {0}")]
    AgentFailure(String),

    /// The turn was interrupted by a marker or cancellation.
    #[error("turn interrupted: {0}")]
    Interrupted(InterruptKind),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] adaf_core::StoreError),
}

impl RunnerError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
