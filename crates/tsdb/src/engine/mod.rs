//! Engine collaborator interface.
//!
//! The binding layer never touches storage itself. Every operation is a call
//! through [`Engine`], which hands out opaque handles and fills read buffers
//! with sample records (see [`crate::sample`]).
//!
//! [`MemoryEngine`] is an in-process implementation producing the same record
//! stream as the native engine.

pub mod memory;

pub use memory::MemoryEngine;

use crate::config::{CreateOptions, WalConfig};
use crate::sample::{SeriesId, Timestamp};
use crate::status::Status;
use std::path::{Path, PathBuf};

/// Result of an engine call that fails with a bare status code.
pub type EngineResult<T> = std::result::Result<T, Status>;

/// Opaque database handle issued by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawDatabase(pub u64);

/// Opaque session handle issued by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawSession(pub u64);

/// Opaque cursor handle issued by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawCursor(pub u64);

/// Parameters passed to the engine when opening a database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenParams {
    /// WAL settings; `None` opens without a WAL.
    pub wal: Option<WalConfig>,
    /// Directory holding the WAL volumes.
    pub wal_path: Option<PathBuf>,
}

/// Calls exposed by a time series engine.
///
/// Handles are only valid on the engine that issued them. Releasing calls
/// (`close_database`, `destroy_session`, `cursor_close`) must tolerate unknown
/// handles.
pub trait Engine: Send + Sync {
    /// Creates the database file `<dir>/<name>.akumuli`.
    fn create_database(&self, name: &str, dir: &Path, options: &CreateOptions) -> Status;

    /// Removes the database file and its volumes.
    fn remove_database(&self, file: &Path) -> Status;

    /// Opens an existing database file.
    fn open_database(&self, file: &Path, params: &OpenParams) -> EngineResult<RawDatabase>;

    /// Closes a database.
    fn close_database(&self, db: RawDatabase);

    /// Creates a session on an open database.
    fn create_session(&self, db: RawDatabase) -> EngineResult<RawSession>;

    /// Destroys a session.
    fn destroy_session(&self, session: RawSession);

    /// Resolves a series name to its id, registering it if needed.
    fn series_to_id(&self, session: RawSession, series: &str) -> EngineResult<SeriesId>;

    /// Resolves a series id back to its name.
    fn id_to_series(&self, session: RawSession, id: SeriesId) -> Option<String>;

    /// Writes one float sample.
    fn write(
        &self,
        session: RawSession,
        series_id: SeriesId,
        timestamp: Timestamp,
        value: f64,
    ) -> Status;

    /// Starts a query. Failures are reported through [`cursor_error`](Self::cursor_error).
    fn query(&self, session: RawSession, query: &str) -> RawCursor;

    /// Copies whole records into `buf` and returns the number of bytes written.
    fn cursor_read(&self, cursor: RawCursor, buf: &mut [u8]) -> usize;

    /// Returns true once the cursor has produced every record.
    fn cursor_is_done(&self, cursor: RawCursor) -> bool;

    /// Returns the cursor's error status, if it failed.
    fn cursor_error(&self, cursor: RawCursor) -> Option<Status>;

    /// Releases a cursor.
    fn cursor_close(&self, cursor: RawCursor);
}
