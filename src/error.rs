//! Error types for ringkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using RingError
pub type Result<T> = std::result::Result<T, RingError>;

/// Unified error type for ringkv operations
#[derive(Debug, Error)]
pub enum RingError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted SSTable {path}: {reason}")]
    Corrupted { path: String, reason: String },

    /// Mutation attempted after the engine was closed
    #[error("Already stopped")]
    AlreadyStopped,

    // -------------------------------------------------------------------------
    // Replication Errors
    // -------------------------------------------------------------------------
    #[error("Not enough replicas: {acks} of {required} acknowledged")]
    QuorumNotReached { acks: usize, required: usize },

    #[error("Invalid replica factor: {0}")]
    InvalidReplicaFactor(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RingError {
    /// Build a `Corrupted` error for the table at `path`
    pub(crate) fn corrupted(path: &std::path::Path, reason: impl Into<String>) -> Self {
        RingError::Corrupted {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}
