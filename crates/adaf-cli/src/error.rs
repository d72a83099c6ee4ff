//! CLI errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Bad flags or arguments; the message includes usage.
    #[error("{0}")]
    Usage(String),

    /// Command invoked from the wrong audience or position.
    #[error("{0}")]
    Context(String),

    #[error(transparent)]
    Store(#[from] adaf_core::StoreError),

    #[error(transparent)]
    Daemon(#[from] adaf_daemon::DaemonError),

    #[error(transparent)]
    Spawn(#[from] adaf_spawn::SpawnError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
