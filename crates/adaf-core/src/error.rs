//! Error taxonomy for store and model operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the store and the core model.
///
/// Low-level I/O failures are wrapped with the operation that caused them so
/// callers can report "updating issue #42: <cause>" instead of a bare errno.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store already initialized at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("no store at {0} (run `adaf init` first)")]
    NotInitialized(PathBuf),

    #[error("{what} {id:?} not found")]
    NotFound { what: &'static str, id: String },

    #[error("{0}")]
    Validation(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Encode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt record {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error("id allocation for {0} exhausted after retries")]
    IdExhausted(&'static str),
}

impl StoreError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn encode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Encode {
            context: context.into(),
            source,
        }
    }

    pub fn not_found(what: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            what,
            id: id.to_string(),
        }
    }

    /// Whether this error means "the record does not exist" as opposed to an
    /// I/O failure. Callers use this to distinguish the two in remediation
    /// messages.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
