//! Error types for the block storage controller
//!
//! Provides structured error types for all controller components including
//! volume reconciliation, lifecycle operations, target allocation, and
//! external command execution.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the controller
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No backend endpoint configured for partition: {partition}")]
    UnknownPartition { partition: String },

    // =========================================================================
    // Backend Transport Errors
    // =========================================================================
    #[error("Backend transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend rejected request: {endpoint} - {reason}")]
    BackendRejected { endpoint: String, reason: String },

    // =========================================================================
    // Record Store Errors
    // =========================================================================
    #[error("Volume record not found: {volume_id}")]
    RecordNotFound { volume_id: String },

    #[error("Transactional conflict updating record: {volume_id}")]
    RecordConflict { volume_id: String },

    #[error("Allocation counter missing for node: {node}")]
    CounterNotFound { node: String },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Volume {volume_id} not yet ready")]
    NotYetReady { volume_id: String },

    #[error("Invalid volume size: {size_gib} GiB")]
    InvalidSize { size_gib: u32 },

    // =========================================================================
    // Export Errors
    // =========================================================================
    #[error("No response within the timeout for command: {command}")]
    CommandTimeout { command: String },

    #[error("Command failed: {command} - {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Target id space exhausted on node: {node}")]
    AllocationExhausted { node: String },

    #[error("Export precondition failed: {0}")]
    ExportPrecondition(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during reconciliation or a retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Transport(_) | Error::RecordConflict { .. } => {
                ErrorAction::RequeueWithBackoff
            }

            // The volume exists but has not converged - short retry
            Error::NotYetReady { .. } => ErrorAction::RequeueAfter(Duration::from_secs(5)),

            // Scarce-resource exhaustion - wait for teardowns to free ids
            Error::AllocationExhausted { .. } => {
                ErrorAction::RequeueAfter(Duration::from_secs(60))
            }

            // Configuration/validation errors - don't retry automatically
            Error::Configuration(_)
            | Error::UnknownPartition { .. }
            | Error::InvalidSize { .. }
            | Error::YamlParse(_) => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::RecordConflict { .. } | Error::NotYetReady { .. }
        )
    }
}

/// Result type alias for the controller
pub type Result<T> = std::result::Result<T, Error>;
