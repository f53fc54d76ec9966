//! Index Module
//!
//! Maps each key to the cursor of its current record.
//!
//! ## Responsibilities
//! - Point lookups for `Engine::load`
//! - The liveness test: a record is live iff the index still points at it
//! - Persisting itself when the engine reaches a checkpoint
//!
//! The engine only depends on the [`Index`] trait. [`MemIndex`] is the
//! default implementation: an ordered in-memory map that snapshots itself
//! to a single file on `flush()`.

mod mem;

pub use mem::MemIndex;

use crate::error::Result;
use crate::log::Cursor;

/// Key → cursor index consumed by the engine
///
/// Implementations only ever see calls from the engine's writer thread.
pub trait Index: Send {
    /// Cursor of the current record for `key`
    fn get(&self, key: &[u8]) -> Option<Cursor>;

    /// Point `key` at a new record
    fn put(&mut self, key: Vec<u8>, cursor: Cursor);

    /// Forget `key`, returning its last cursor
    fn remove(&mut self, key: &[u8]) -> Option<Cursor>;

    /// Make every change so far durable
    fn flush(&mut self) -> Result<()>;

    /// Number of keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
