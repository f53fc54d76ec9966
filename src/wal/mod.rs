//! Write-Ahead Log interface
//!
//! The engine does not read journal pages itself. The write-ahead-log layer
//! decodes each page into a [`Batch`] of [`Event`]s and submits it through
//! `Engine::apply`.
//!
//! ## Batch Lifecycle
//! ```text
//! RECEIVED ──(already applied)──► DISCARD
//!    │
//!    ▼
//! QUEUED ─► APPLYING ─► APPLIED ─(checkpoint due)─► CHECKPOINTING ─► ROLLED_OVER ─► COMPLETE
//!                │
//!                └──(error)──► FAILED (kept pending, replayed after restart)
//! ```

mod batch;
mod entry;

pub use batch::{Batch, ReleaseHook};
pub use entry::Event;
