//! Process supervision: PID-state persistence, ownership-checked teardown,
//! and process-group spawn for long-running component processes.

pub mod ownership;
pub mod pid_state;
pub mod registry;
pub mod runtime_state;
pub mod spawn;

pub use ownership::{teardown, OwnershipProof};
pub use pid_state::PidState;
pub use registry::PidRegistry;
pub use runtime_state::{ComponentSnapshot, RuntimeState};
pub use spawn::Supervised;
