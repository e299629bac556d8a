//! Database, WAL and cursor configuration.

use crate::error::{Result, TsdbError};
use crate::sample::MAX_RECORD_SIZE;
use std::thread;
use std::time::Duration;

/// Smallest allowed volume size (1 MiB).
pub const VOLUME_MIN_SIZE: u64 = 1024 * 1024;
/// Largest allowed volume size (4 GiB).
pub const VOLUME_MAX_SIZE: u64 = 4 * 1024 * 1024 * 1024;
/// Smallest allowed WAL volume size (1 MiB).
pub const WAL_MIN_SIZE: u64 = 1024 * 1024;
/// Largest allowed WAL volume size (1 GiB).
pub const WAL_MAX_SIZE: u64 = 1024 * 1024 * 1024;
/// Largest allowed number of WAL volumes.
pub const WAL_MAX_VOLUMES: u32 = 1000;

/// Default number of database volumes.
const DEFAULT_VOLUMES: u32 = 4;
/// Default size of a database volume (4 GiB).
const DEFAULT_VOLUME_SIZE: u64 = VOLUME_MAX_SIZE;
/// Default size of the cursor read buffer.
const DEFAULT_READ_BUFFER_SIZE: usize = 1024;
/// Default number of write attempts while the engine is busy.
const DEFAULT_BUSY_ATTEMPTS: u32 = 1024;

/// Options for creating a new database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    /// Number of volumes. Must be at least 1.
    pub volumes: u32,
    /// Size of each volume in bytes.
    pub volume_size: u64,
    /// Preallocate volume files on disk.
    pub allocate: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            volumes: DEFAULT_VOLUMES,
            volume_size: DEFAULT_VOLUME_SIZE,
            allocate: false,
        }
    }
}

impl CreateOptions {
    /// Creates database options with custom settings.
    pub fn new(volumes: u32, volume_size: u64, allocate: bool) -> Self {
        Self {
            volumes,
            volume_size,
            allocate,
        }
    }

    /// Checks every field against the engine's limits.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::InvalidConfig` describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.volume_size < VOLUME_MIN_SIZE {
            return Err(TsdbError::InvalidConfig(format!(
                "volume size {} is too small, it can't be less than 1MB",
                self.volume_size
            )));
        }
        if self.volume_size > VOLUME_MAX_SIZE {
            return Err(TsdbError::InvalidConfig(format!(
                "volume size {} exceeds 4GB",
                self.volume_size
            )));
        }
        if self.volumes < 1 {
            return Err(TsdbError::InvalidConfig(
                "volumes must be greater or equal than 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Write-ahead log settings passed to the engine on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalConfig {
    /// Number of concurrent WAL writers. Must be at least 1.
    pub concurrency: u32,
    /// Size of each WAL volume in bytes.
    pub volume_size: u64,
    /// Number of WAL volumes. The engine rejects exactly one volume; zero
    /// disables the WAL.
    pub volumes: u32,
}

impl Default for WalConfig {
    fn default() -> Self {
        let cpus = thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        Self {
            concurrency: cpus,
            volume_size: WAL_MIN_SIZE,
            volumes: cpus.clamp(2, WAL_MAX_VOLUMES),
        }
    }
}

impl WalConfig {
    /// Creates a WAL configuration with custom settings.
    pub fn new(concurrency: u32, volume_size: u64, volumes: u32) -> Self {
        Self {
            concurrency,
            volume_size,
            volumes,
        }
    }

    /// Checks every field against the engine's limits.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::InvalidConfig` describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency < 1 {
            return Err(TsdbError::InvalidConfig(
                "WAL concurrency must be at least 1".to_string(),
            ));
        }
        if self.volumes == 1 || self.volumes > WAL_MAX_VOLUMES {
            return Err(TsdbError::InvalidConfig(format!(
                "WAL volumes {} should not exceed {} or be equal to 1",
                self.volumes, WAL_MAX_VOLUMES
            )));
        }
        if self.volume_size < WAL_MIN_SIZE || self.volume_size > WAL_MAX_SIZE {
            return Err(TsdbError::InvalidConfig(format!(
                "WAL volume size {} must be between {} and {}",
                self.volume_size, WAL_MIN_SIZE, WAL_MAX_SIZE
            )));
        }
        Ok(())
    }
}

/// Cursor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorConfig {
    /// Capacity of the read buffer in bytes.
    pub read_buffer_size: usize,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl CursorConfig {
    /// Creates a cursor configuration with a custom buffer size.
    pub fn new(read_buffer_size: usize) -> Self {
        Self { read_buffer_size }
    }

    /// Checks that the buffer can hold the largest record.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::InvalidConfig` if the buffer is too small.
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size < MAX_RECORD_SIZE {
            return Err(TsdbError::InvalidConfig(format!(
                "read buffer of {} bytes can't hold a {} byte record",
                self.read_buffer_size, MAX_RECORD_SIZE
            )));
        }
        Ok(())
    }
}

/// Retry policy for writes rejected with a busy status.
///
/// Retries happen immediately, without backoff. `None` disables a bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusyRetry {
    /// Maximum number of write attempts.
    pub max_attempts: Option<u32>,
    /// Maximum time spent retrying.
    pub timeout: Option<Duration>,
}

impl Default for BusyRetry {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_BUSY_ATTEMPTS),
            timeout: None,
        }
    }
}

impl BusyRetry {
    /// Creates a retry policy with custom bounds.
    pub fn new(max_attempts: Option<u32>, timeout: Option<Duration>) -> Self {
        Self {
            max_attempts,
            timeout,
        }
    }

    /// Retries until the engine accepts the write.
    pub fn unbounded() -> Self {
        Self::new(None, None)
    }

    /// Checks the attempt bound.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::InvalidConfig` if `max_attempts` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == Some(0) {
            return Err(TsdbError::InvalidConfig(
                "at least one write attempt is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings applied when opening a database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Write-ahead log settings. `None` opens without a WAL.
    pub wal: Option<WalConfig>,
    /// Settings for cursors opened through this database.
    pub cursor: CursorConfig,
    /// Busy retry policy for writes.
    pub busy_retry: BusyRetry,
}

impl DatabaseConfig {
    /// Creates a database configuration with custom settings.
    pub fn new(wal: Option<WalConfig>, cursor: CursorConfig, busy_retry: BusyRetry) -> Self {
        Self {
            wal,
            cursor,
            busy_retry,
        }
    }

    /// Validates every nested configuration.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::InvalidConfig` describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.validate()?;
        }
        self.cursor.validate()?;
        self.busy_retry.validate()
    }
}
