//! Error types for AtlasLog
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::log::Cursor;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for AtlasLog operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    /// The open segment cannot hold the record; roll over and retry.
    #[error("Segment overflow: record needs {needed} bytes, {available} available")]
    Overflow { needed: u64, available: u64 },

    #[error("Record of {size} bytes can never fit a segment of {capacity} bytes")]
    RecordTooLarge { size: u64, capacity: u64 },

    /// The cursor lies past the tail or inside reclaimed space.
    #[error("Cursor underflow: no record at {0}")]
    Underflow(Cursor),

    #[error("Checksum mismatch in {path:?}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Log corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Writer Errors
    // -------------------------------------------------------------------------
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Writer backlog is full")]
    Backlog,

    #[error("Engine is closed")]
    EngineClosed,

    #[error("Task failed: {0}")]
    TaskFailed(String),
}

impl From<bincode::Error> for AtlasError {
    fn from(e: bincode::Error) -> Self {
        AtlasError::Serialization(e.to_string())
    }
}
