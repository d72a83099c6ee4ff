//! adaf-loop: the loop controller: cycles, steps, turns, and the signals
//! that steer them.

pub mod controller;
pub mod error;
pub mod position;
pub mod prompt;

pub use controller::LoopController;
pub use error::LoopError;
pub use position::{
    capabilities, effective_position, effective_worker_role, loop_has_supervisor,
    next_supervisor_step_index, Capabilities,
};
