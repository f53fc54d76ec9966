//! Configuration for AtlasLog
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AtlasError, Result};

/// Smallest segment that can hold a framed record plus its trailer
pub const MIN_SEGMENT_CAPACITY: u64 = 16;

/// Main configuration for an AtlasLog instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── segments/        (one file per segment, named by begin offset)
    ///     ├── checkpoint/      (a single "{number}.{cursor}" marker)
    ///     └── index.snapshot   (MemIndex snapshot, when the default index is used)
    pub data_dir: PathBuf,

    /// Capacity of a single segment file (in bytes)
    pub segment_capacity: u64,

    // -------------------------------------------------------------------------
    // Reclamation / Checkpoint Configuration
    // -------------------------------------------------------------------------
    /// Dead ranges shorter than this are left alone
    pub min_collect_length: u64,

    /// Bytes the log must grow before a new checkpoint is written
    pub group_apply_length: u64,

    // -------------------------------------------------------------------------
    // Writer Configuration
    // -------------------------------------------------------------------------
    /// Capacity of the single-writer task queue
    pub task_backlog: usize,

    /// How long a caller waits for a unit of work (milliseconds)
    pub request_timeout_ms: u64,

    /// Writer heartbeat period (milliseconds)
    pub heartbeat_interval_ms: u64,

    /// Pause between two full sweeps of the log (milliseconds)
    pub sweep_pause_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlaslog_data"),
            segment_capacity: 64 * 1024 * 1024, // 64 MB
            min_collect_length: 4 * 1024,
            group_apply_length: 1024 * 1024,
            task_backlog: 1024,
            request_timeout_ms: 5000,
            heartbeat_interval_ms: 1000,
            sweep_pause_ms: 1000,
        }
    }
}

impl Config {
    const SEGMENT_DIR: &'static str = "segments";
    const CHECKPOINT_DIR: &'static str = "checkpoint";
    const INDEX_SNAPSHOT: &'static str = "index.snapshot";

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the values can actually be used together
    pub fn validate(&self) -> Result<()> {
        if self.segment_capacity < MIN_SEGMENT_CAPACITY {
            return Err(AtlasError::Config(format!(
                "segment_capacity must be at least {} bytes, got {}",
                MIN_SEGMENT_CAPACITY, self.segment_capacity
            )));
        }
        if self.segment_capacity > u32::MAX as u64 {
            return Err(AtlasError::Config(format!(
                "segment_capacity must fit in 32 bits, got {}",
                self.segment_capacity
            )));
        }
        if self.task_backlog == 0 {
            return Err(AtlasError::Config("task_backlog must be non-zero".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(AtlasError::Config(
                "request_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(AtlasError::Config(
                "heartbeat_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory holding the segment files
    pub fn segment_dir(&self) -> PathBuf {
        self.data_dir.join(Self::SEGMENT_DIR)
    }

    /// Directory holding the checkpoint marker
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.data_dir.join(Self::CHECKPOINT_DIR)
    }

    /// Snapshot file of the default index
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(Self::INDEX_SNAPSHOT)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn sweep_pause(&self) -> Duration {
        Duration::from_millis(self.sweep_pause_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment capacity (in bytes)
    pub fn segment_capacity(mut self, bytes: u64) -> Self {
        self.config.segment_capacity = bytes;
        self
    }

    /// Set the minimum dead range worth reclaiming (in bytes)
    pub fn min_collect_length(mut self, bytes: u64) -> Self {
        self.config.min_collect_length = bytes;
        self
    }

    /// Set the log growth between checkpoints (in bytes)
    pub fn group_apply_length(mut self, bytes: u64) -> Self {
        self.config.group_apply_length = bytes;
        self
    }

    /// Set the writer queue capacity
    pub fn task_backlog(mut self, count: usize) -> Self {
        self.config.task_backlog = count;
        self
    }

    /// Set the request timeout (in milliseconds)
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    /// Set the heartbeat interval (in milliseconds)
    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.config.heartbeat_interval_ms = ms;
        self
    }

    /// Set the pause between full sweeps (in milliseconds)
    pub fn sweep_pause_ms(mut self, ms: u64) -> Self {
        self.config.sweep_pause_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step
    pub fn try_build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
