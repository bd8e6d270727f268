//! Domain layer - Core records and port definitions
//!
//! This module defines the volume domain model and the traits (ports) that
//! adapters implement, following hexagonal architecture principles.

pub mod partition;
pub mod ports;
pub mod volume;

pub use partition::*;
pub use ports::*;
pub use volume::*;
