//! Log Module
//!
//! The cursor-addressed, append-only log.
//!
//! ## Responsibilities
//! - Address records by monotonically increasing cursors
//! - Split the address space into fixed-capacity segment files
//! - Detect torn segments through a CRC32 trailer
//! - Reclaim dead ranges without moving live records
//!
//! ## Directory Layout
//! ```text
//! segments/
//!   ├── 0          [records ...][crc]   (sealed)
//!   ├── 4096       [records ...][crc]   (sealed)
//!   └── 8192       [records ...]        (open)
//! ```

mod chain;
mod cursor;
mod reclaim;
mod record;
mod segment;

pub use chain::{SegmentChain, SegmentInfo};
pub use cursor::Cursor;
pub use reclaim::RangeReclaimer;
pub use record::{Entry, LENGTH_PREFIX};
pub use segment::{Segment, Split, TRAILER_SIZE};
