//! Cursor
//!
//! A logical byte offset into the unbounded log address space.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical position of a record in the log
///
/// Cursors are only meaningful within the log instance that produced them.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Cursor(u64);

impl Cursor {
    /// The very beginning of the log
    pub const HEAD: Cursor = Cursor(0);

    pub const fn new(offset: u64) -> Self {
        Cursor(offset)
    }

    pub const fn offset(&self) -> u64 {
        self.0
    }

    /// Step `len` bytes forward
    pub const fn forward(&self, len: u64) -> Cursor {
        Cursor(self.0 + len)
    }

    /// Bytes from `other` up to `self`, zero when `other` is ahead
    pub const fn distance(&self, other: Cursor) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl From<u64> for Cursor {
    fn from(offset: u64) -> Self {
        Cursor(offset)
    }
}
