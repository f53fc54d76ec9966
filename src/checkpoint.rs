//! Checkpoint
//!
//! Persists the pair (last applied batch number, log cursor) that recovery
//! resumes from. The state lives entirely in the name of a single empty
//! marker file, `"{number}.{cursor}"`.
//!
//! ## Save Protocol
//! ```text
//!   1. create "{new_number}.{new_cursor}"
//!   2. delete "{old_number}.{old_cursor}"
//! ```
//! The two steps are not atomic. A crash in between leaves two markers;
//! `open()` keeps the one with the highest number and deletes the rest.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::{AtlasError, Result};
use crate::log::Cursor;

/// Recovery checkpoint
///
/// Not thread-safe: owned by the engine's writer.
#[derive(Debug)]
pub struct Checkpoint {
    /// Directory holding the marker file
    dir: PathBuf,
    /// Last fully applied batch
    number: u64,
    /// Log position covering that batch
    cursor: Cursor,
    /// Whether a marker for (number, cursor) exists on disk
    persisted: bool,
    /// Log growth required before the next save
    group_apply_length: u64,
}

impl Checkpoint {
    /// Open the checkpoint stored in `dir`
    ///
    /// On startup:
    /// 1. Collect every "{number}.{cursor}" marker
    /// 2. Keep the one with the highest number
    /// 3. Delete the others (left over from an interrupted save)
    pub fn open(dir: &Path, group_apply_length: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut markers: Vec<(u64, u64, PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match Self::parse_marker(&path) {
                Some((number, cursor)) => markers.push((number, cursor, path)),
                None => tracing::debug!("ignoring stray file {:?}", path),
            }
        }

        markers.sort_by_key(|(number, cursor, _)| (*number, *cursor));

        let current = markers.pop();
        for (_, _, stale) in markers {
            tracing::warn!("removing stale checkpoint marker {:?}", stale);
            fs::remove_file(&stale)?;
        }

        let checkpoint = match current {
            Some((number, cursor, _)) => Self {
                dir: dir.to_path_buf(),
                number,
                cursor: Cursor::new(cursor),
                persisted: true,
                group_apply_length,
            },
            None => Self {
                dir: dir.to_path_buf(),
                number: 0,
                cursor: Cursor::HEAD,
                persisted: false,
                group_apply_length,
            },
        };

        tracing::debug!(
            number = checkpoint.number,
            cursor = checkpoint.cursor.offset(),
            "loaded checkpoint"
        );

        Ok(checkpoint)
    }

    /// Last fully applied batch number
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Log position recovery resumes from
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Whether batch `number` is already covered (replay guard)
    pub fn is_applied(&self, number: u64) -> bool {
        self.persisted && number <= self.number
    }

    /// Whether the log has grown enough since the last save
    pub fn can_save(&self, cursor: Cursor) -> bool {
        cursor.distance(self.cursor) >= self.group_apply_length
    }

    /// Move the checkpoint to (number, cursor)
    pub fn save(&mut self, number: u64, cursor: Cursor) -> Result<()> {
        if self.persisted && (number < self.number || cursor < self.cursor) {
            return Err(AtlasError::Corruption(format!(
                "checkpoint would move backwards: ({}, {}) -> ({}, {})",
                self.number, self.cursor, number, cursor
            )));
        }

        let next = Self::marker_path(&self.dir, number, cursor);
        let previous = Self::marker_path(&self.dir, self.number, self.cursor);

        File::create(&next)?.sync_all()?;
        if self.persisted && previous != next {
            fs::remove_file(&previous)?;
        }

        self.number = number;
        self.cursor = cursor;
        self.persisted = true;

        tracing::info!(number, cursor = cursor.offset(), "saved checkpoint");
        Ok(())
    }

    /// Path of the current marker, if one has been written
    pub fn marker(&self) -> Option<PathBuf> {
        self.persisted
            .then(|| Self::marker_path(&self.dir, self.number, self.cursor))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// "{dir}/{number}.{cursor}"
    fn marker_path(dir: &Path, number: u64, cursor: Cursor) -> PathBuf {
        dir.join(format!("{}.{}", number, cursor.offset()))
    }

    /// "5.80" → Some((5, 80))
    fn parse_marker(path: &Path) -> Option<(u64, u64)> {
        let name = path.file_name()?.to_str()?;
        let (number, cursor) = name.split_once('.')?;
        Some((number.parse().ok()?, cursor.parse().ok()?))
    }
}
