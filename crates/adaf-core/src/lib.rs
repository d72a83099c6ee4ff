//! adaf-core: entities, filesystem store, signals, config, delegation.
//!
//! Everything on disk under `<repo>/.adaf` is owned by [`store::Store`];
//! other crates mutate state only through it.

pub mod config;
pub mod delegation;
pub mod envctx;
pub mod error;
pub mod ids;
pub mod issue;
pub mod lookup;
pub mod loop_run;
pub mod plan;
pub mod project;
pub mod session;
pub mod signal;
pub mod spawn;
pub mod stats;
pub mod store;
pub mod turn;

pub use error::StoreError;
pub use store::{Listing, Store};
