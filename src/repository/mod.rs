//! Record store adapters
//!
//! Implementations of the [`VolumeRepository`] and
//! [`TargetCounterRepository`] ports.
//!
//! [`VolumeRepository`]: crate::domain::ports::VolumeRepository
//! [`TargetCounterRepository`]: crate::domain::ports::TargetCounterRepository

pub mod memory;

pub use memory::*;
