//! Daemon errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("session {0} is already hosted by a live daemon (pid {1})")]
    AlreadyRunning(u64, i32),

    #[error("no running session matches {0}")]
    NoMatch(String),

    #[error("{0} running sessions match; name one explicitly")]
    Ambiguous(usize),

    #[error("daemon never came up: {0}")]
    AbortSessionStartup(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] adaf_core::StoreError),

    #[error(transparent)]
    Loop(#[from] adaf_loop::LoopError),

    #[error(transparent)]
    Spawn(#[from] adaf_spawn::SpawnError),
}

impl DaemonError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
