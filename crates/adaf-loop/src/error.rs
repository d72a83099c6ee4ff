//! Loop controller errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("step references unknown profile {0:?}")]
    UnknownProfile(String),

    #[error(transparent)]
    Store(#[from] adaf_core::StoreError),

    #[error(transparent)]
    Runner(#[from] adaf_runner::RunnerError),
}
