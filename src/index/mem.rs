//! MemIndex implementation
//!
//! BTreeMap-based index with an optional on-disk snapshot.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::log::Cursor;

use super::Index;

/// In-memory ordered index
///
/// With a snapshot path, `flush()` writes the whole map with bincode to a
/// temporary file and renames it over the previous snapshot, so a crash
/// leaves either the old or the new snapshot, never a torn one.
#[derive(Debug, Default)]
pub struct MemIndex {
    /// key → cursor of the current record
    entries: BTreeMap<Vec<u8>, Cursor>,
    /// Where `flush()` persists the map (None = memory only)
    snapshot: Option<PathBuf>,
    /// Changed since the last flush
    dirty: bool,
}

impl MemIndex {
    /// Create an empty, memory-only index
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the index persisted at `path`, or start empty
    pub fn open(path: &Path) -> Result<Self> {
        let entries: BTreeMap<Vec<u8>, Cursor> = if path.exists() {
            let bytes = fs::read(path)?;
            bincode::deserialize(&bytes)?
        } else {
            BTreeMap::new()
        };

        tracing::debug!(keys = entries.len(), "loaded index snapshot {:?}", path);

        Ok(Self {
            entries,
            snapshot: Some(path.to_path_buf()),
            dirty: false,
        })
    }

    /// Iterate (key, cursor) pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], Cursor)> {
        self.entries.iter().map(|(k, c)| (k.as_slice(), *c))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn write_snapshot(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            bincode::serialize_into(&mut writer, &self.entries)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl Index for MemIndex {
    fn get(&self, key: &[u8]) -> Option<Cursor> {
        self.entries.get(key).copied()
    }

    fn put(&mut self, key: Vec<u8>, cursor: Cursor) {
        self.entries.insert(key, cursor);
        self.dirty = true;
    }

    fn remove(&mut self, key: &[u8]) -> Option<Cursor> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(path) = &self.snapshot {
            self.write_snapshot(path)?;
            tracing::trace!(keys = self.entries.len(), "flushed index snapshot");
        }
        self.dirty = false;
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
