//! # AtlasLog
//!
//! An embedded, log-structured key-value storage engine with:
//! - A cursor-addressed log split into fixed-capacity segment files
//! - CRC32-sealed segments, torn files discarded on recovery
//! - Checkpointed application of write-ahead-log batches
//! - Incremental garbage collection that never moves live records
//! - Single-writer concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Write-Ahead Log (external)                  │
//! │                 Batch { number, events, hook }               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ apply
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                                │
//! │        (bounded task queue → single writer thread)           │
//! └──────┬──────────────────┬──────────────────┬────────────────┘
//!        │                  │                  │
//!        ▼                  ▼                  ▼
//!   ┌──────────┐      ┌───────────┐      ┌────────────┐
//!   │  Index   │      │ Checkpoint│      │  Sweeper   │
//!   │ key→cur  │      │ num.cursor│      │ dead runs  │
//!   └──────────┘      └───────────┘      └─────┬──────┘
//!                                              │ collect
//!                     ┌────────────────────────▼────────────┐
//!                     │  SegmentChain + RangeReclaimer       │
//!                     │  [seg 0][seg 4096] hole [seg 9000]   │
//!                     └─────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod log;
pub mod checkpoint;
pub mod wal;
pub mod index;
pub mod sweeper;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AtlasError, Result};
pub use config::Config;
pub use engine::{Engine, EngineStats, Probe, Scan, Ticket};
pub use index::{Index, MemIndex};
pub use log::{Cursor, Entry};
pub use wal::{Batch, Event};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasLog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
