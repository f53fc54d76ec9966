//! Segment
//!
//! One fixed-capacity backing file holding the slice `[begin, begin + length)`
//! of the log.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Record 1  [Len (4)][Entry (Len)]            │
//! │ Record 2  [Len (4)][Entry (Len)]            │
//! │ ...                                         │
//! ├─────────────────────────────────────────────┤
//! │ Trailer (8, sealed segments only)           │
//! │   CRC32 of all record bytes, as u64 BE      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The file is named by the decimal `begin` offset. A segment is *sealed*
//! once the trailer has been written; appending to a sealed segment drops
//! the trailer again until the next seal.
//!
//! Not thread-safe: every mutation goes through the engine's single writer.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{AtlasError, Result};

use super::record::{Entry, LENGTH_PREFIX};
use super::Cursor;

/// Size of the checksum trailer of a sealed segment
pub const TRAILER_SIZE: u64 = 8;

/// Chunk size used when checksumming or copying file bodies
const COPY_CHUNK: usize = 64 * 1024;

/// Extension of a truncated copy that has not replaced its segment yet
pub const TMP_EXTENSION: &str = "tmp";

/// Result of punching a dead range out of a single segment
#[derive(Debug)]
pub enum Split {
    /// The range was too small to be worth the I/O; nothing changed
    Skipped,
    /// The dead range was a prefix; the segment now starts after it
    Trimmed,
    /// The segment keeps the live prefix, the returned segment holds the live suffix
    Split(Segment),
}

/// A single segment file of the log
#[derive(Debug)]
pub struct Segment {
    /// Directory holding all segment files
    dir: PathBuf,
    /// Path of this segment's file
    path: PathBuf,
    /// First cursor covered by this segment (never changes)
    begin: Cursor,
    /// Maximum number of record bytes
    capacity: u64,
    /// Bytes of records written so far
    write_position: u32,
    /// Whether the checksum trailer is currently on disk
    sealed: bool,
    /// Read/write handle, released when the segment is dropped
    file: File,
}

impl Segment {
    /// Create a new, empty, open segment starting at `begin`
    pub fn create(dir: &Path, begin: Cursor, capacity: u64) -> Result<Self> {
        Self::create_file(dir, begin, capacity, false)
    }

    /// `exclusive` refuses to clobber an existing file of the same name
    fn create_file(dir: &Path, begin: Cursor, capacity: u64, exclusive: bool) -> Result<Self> {
        let path = Self::path_for(dir, begin);
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if exclusive {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }
        let file = options.open(&path)?;

        tracing::trace!(begin = begin.offset(), "created segment {:?}", path);

        Ok(Self {
            dir: dir.to_path_buf(),
            path,
            begin,
            capacity,
            write_position: 0,
            sealed: false,
            file,
        })
    }

    /// Open an existing segment file and verify its trailer
    ///
    /// An empty file is an open segment with no records. Anything else must
    /// carry a valid trailer, otherwise `ChecksumMismatch` / `Corruption` is
    /// returned and the caller decides what to do with the file.
    pub fn open(path: &Path, capacity: u64) -> Result<Self> {
        let begin = Self::parse_begin(path).ok_or_else(|| {
            AtlasError::Corruption(format!("not a segment file name: {:?}", path))
        })?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();

        if file_len == 0 {
            return Ok(Self {
                dir,
                path: path.to_path_buf(),
                begin,
                capacity,
                write_position: 0,
                sealed: false,
                file,
            });
        }

        if file_len < TRAILER_SIZE {
            return Err(AtlasError::Corruption(format!(
                "segment {:?} is {} bytes, shorter than its trailer",
                path, file_len
            )));
        }

        let body_len = file_len - TRAILER_SIZE;
        if body_len > u32::MAX as u64 {
            return Err(AtlasError::Corruption(format!(
                "segment {:?} holds {} bytes, more than a segment can address",
                path, body_len
            )));
        }

        file.seek(SeekFrom::Start(body_len))?;
        let mut trailer = [0u8; TRAILER_SIZE as usize];
        file.read_exact(&mut trailer)?;
        let expected = u64::from_be_bytes(trailer);

        let actual = checksum(&mut file, body_len)?;
        if actual != expected {
            return Err(AtlasError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected,
                actual,
            });
        }

        Ok(Self {
            dir,
            path: path.to_path_buf(),
            begin,
            // Written under a larger capacity: keep it readable, just full
            capacity: capacity.max(body_len),
            write_position: body_len as u32,
            sealed: true,
            file,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn begin(&self) -> Cursor {
        self.begin
    }

    /// Bytes of records held by this segment
    pub fn length(&self) -> u64 {
        self.write_position as u64
    }

    /// First cursor past this segment's records
    pub fn end(&self) -> Cursor {
        self.begin.forward(self.length())
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_empty(&self) -> bool {
        self.write_position == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `cursor` addresses a byte held by this segment
    pub fn contains(&self, cursor: Cursor) -> bool {
        cursor >= self.begin && cursor < self.end()
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Append one record, returning its cursor
    ///
    /// Fails with `Overflow` when the record does not fit; the caller rolls
    /// over to a new segment and retries.
    pub fn append(&mut self, entry: &Entry) -> Result<Cursor> {
        let needed = entry.framed_len();
        let available = self.capacity - self.length();
        if needed > available {
            return Err(AtlasError::Overflow { needed, available });
        }

        if self.sealed {
            self.reopen()?;
        }

        let frame = entry.encode();
        let position = self.write_position;
        self.file.seek(SeekFrom::Start(position as u64))?;
        self.file.write_all(&frame)?;
        self.write_position += needed as u32;

        Ok(self.begin.forward(position as u64))
    }

    /// Read the record at `cursor`
    pub fn get(&mut self, cursor: Cursor) -> Result<Entry> {
        let len = self.payload_len(cursor)?;
        let mut payload = vec![0u8; len as usize];
        self.file.read_exact(&mut payload)?;
        Entry::decode(&payload)
    }

    /// Cursor of the record following the one at `cursor`
    pub fn next(&mut self, cursor: Cursor) -> Result<Cursor> {
        Ok(cursor.forward(self.record_len(cursor)?))
    }

    /// Framed length of the record at `cursor`
    pub fn record_len(&mut self, cursor: Cursor) -> Result<u64> {
        Ok(self.payload_len(cursor)? + LENGTH_PREFIX)
    }

    /// Read and validate the length prefix at `cursor`; leaves the file
    /// positioned at the start of the payload.
    fn payload_len(&mut self, cursor: Cursor) -> Result<u64> {
        if !self.contains(cursor) {
            return Err(AtlasError::Underflow(cursor));
        }

        let position = cursor.distance(self.begin);
        if position + LENGTH_PREFIX > self.length() {
            return Err(AtlasError::Corruption(format!(
                "length prefix at {} runs past segment end {}",
                cursor,
                self.end()
            )));
        }

        self.file.seek(SeekFrom::Start(position))?;
        let mut prefix = [0u8; LENGTH_PREFIX as usize];
        self.file.read_exact(&mut prefix)?;
        let len = u32::from_be_bytes(prefix) as u64;

        if position + LENGTH_PREFIX + len > self.length() {
            return Err(AtlasError::Corruption(format!(
                "record at {} ({} bytes) runs past segment end {}",
                cursor,
                len,
                self.end()
            )));
        }

        Ok(len)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Write the checksum trailer and sync; no-op if already sealed
    pub fn seal(&mut self) -> Result<()> {
        if self.sealed {
            return Ok(());
        }

        let body_len = self.length();
        write_trailer(&mut self.file, body_len)?;
        self.sealed = true;

        tracing::trace!(begin = self.begin.offset(), length = body_len, "sealed segment");
        Ok(())
    }

    /// Flush appended records to disk without sealing
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Seal this segment and start the next one right after it
    pub fn multiply(&mut self) -> Result<Segment> {
        self.seal()?;
        Segment::create(&self.dir, self.end(), self.capacity)
    }

    /// Delete the backing file
    pub fn clear(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        fs::remove_file(&path)?;
        tracing::trace!("removed segment {:?}", path);
        Ok(())
    }

    // =========================================================================
    // Reclamation
    // =========================================================================

    /// Reclaim the dead range `[b, e)`, both inside this segment
    pub fn split(&mut self, b: Cursor, e: Cursor) -> Result<Split> {
        let b = b.max(self.begin);
        let e = e.min(self.end());

        if b >= e || e.distance(b) < self.record_len(b)? {
            return Ok(Split::Skipped);
        }

        if b == self.begin {
            self.right(e)?;
            return Ok(Split::Trimmed);
        }

        // Copy the suffix out before the prefix is cut off
        let suffix = self.copy_suffix(e)?;
        self.left(b)?;
        Ok(Split::Split(suffix))
    }

    /// Keep only the records from `cursor` on
    ///
    /// Returns `false` (and changes nothing) when `cursor` is the segment
    /// start. Otherwise the suffix is copied into a new file named after
    /// `cursor`, sealed, and the old file is deleted.
    pub fn right(&mut self, cursor: Cursor) -> Result<bool> {
        if cursor <= self.begin {
            return Ok(false);
        }

        let suffix = self.copy_suffix(cursor)?;
        let old = std::mem::replace(self, suffix);
        old.clear()?;
        Ok(true)
    }

    /// Keep only the records before `cursor`
    ///
    /// Returns `false` when nothing survives; the file has then been
    /// deleted and the segment must be dropped from its chain.
    ///
    /// The prefix is written and sealed under `"{begin}.tmp"` and renamed
    /// over the old file, which stays valid until then.
    pub fn left(&mut self, cursor: Cursor) -> Result<bool> {
        if cursor <= self.begin {
            fs::remove_file(&self.path)?;
            tracing::trace!("removed segment {:?}", self.path);
            return Ok(false);
        }
        if cursor >= self.end() {
            return Ok(true);
        }

        let body_len = cursor.distance(self.begin);
        let tmp = self.path.with_extension(TMP_EXTENSION);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        self.copy_range(0, body_len, &mut file)?;
        write_trailer(&mut file, body_len)?;
        fs::rename(&tmp, &self.path)?;

        self.file = file;
        self.write_position = body_len as u32;
        self.sealed = true;

        tracing::trace!(begin = self.begin.offset(), length = body_len, "truncated segment");
        Ok(true)
    }

    /// Copy `[cursor, end)` into a fresh sealed segment starting at `cursor`
    fn copy_suffix(&mut self, cursor: Cursor) -> Result<Segment> {
        if cursor > self.end() {
            return Err(AtlasError::Underflow(cursor));
        }

        let mut suffix = Segment::create_file(&self.dir, cursor, self.capacity, true)?;
        let start = cursor.distance(self.begin);
        let len = self.length() - start;

        self.copy_range(start, len, &mut suffix.file)?;
        suffix.write_position = len as u32;
        suffix.seal()?;
        Ok(suffix)
    }

    /// Copy `len` record bytes starting at file position `start` into `out`
    fn copy_range(&mut self, start: u64, len: u64, out: &mut File) -> Result<()> {
        self.file.seek(SeekFrom::Start(start))?;
        let mut reader = (&mut self.file).take(len);
        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
        }
        Ok(())
    }

    /// Drop the trailer so the segment accepts appends again
    fn reopen(&mut self) -> Result<()> {
        self.file.set_len(self.length())?;
        self.sealed = false;
        Ok(())
    }

    // =========================================================================
    // File Naming
    // =========================================================================

    /// "{dir}/{begin}"
    pub fn path_for(dir: &Path, begin: Cursor) -> PathBuf {
        dir.join(begin.offset().to_string())
    }

    /// "4096" → Some(Cursor(4096))
    pub fn parse_begin(path: &Path) -> Option<Cursor> {
        let name = path.file_name()?.to_str()?;
        name.parse::<u64>().ok().map(Cursor::new)
    }
}

/// Write the trailer for the first `body_len` bytes of `file` and sync
fn write_trailer(file: &mut File, body_len: u64) -> Result<()> {
    let crc = checksum(file, body_len)?;
    file.seek(SeekFrom::Start(body_len))?;
    file.write_all(&crc.to_be_bytes())?;
    file.set_len(body_len + TRAILER_SIZE)?;
    file.sync_all()?;
    Ok(())
}

/// CRC32 of the first `len` bytes of `file`
fn checksum(file: &mut File, len: u64) -> Result<u64> {
    file.seek(SeekFrom::Start(0))?;
    let mut hasher = crc32fast::Hasher::new();
    let mut reader = file.take(len);
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize() as u64)
}
