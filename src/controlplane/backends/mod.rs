//! Storage backend adapters
//!
//! Implementations of the [`StorageBackendClient`] port.
//!
//! [`StorageBackendClient`]: crate::domain::ports::StorageBackendClient

pub mod http;

pub use http::*;
