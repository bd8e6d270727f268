//! Volume Control Plane Module
//!
//! The authoritative side of the volume lifecycle: the periodic
//! reconciliation sweep, its leader-gated scheduler, the pure state
//! transition function, and the user-initiated lifecycle operations.

pub mod backends;
pub mod lifecycle;
pub mod reconciler;
pub mod scheduler;
pub mod state_machine;

pub use backends::*;
pub use lifecycle::*;
pub use reconciler::*;
pub use scheduler::*;
