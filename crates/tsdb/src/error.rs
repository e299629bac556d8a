//! Error and Result types for the engine binding.

use crate::sample::SeriesId;
use crate::status::Status;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for binding operations.
pub type Result<T> = std::result::Result<T, TsdbError>;

/// The error type for engine binding operations.
#[derive(Debug, Error)]
pub enum TsdbError {
    /// The engine entered an unrecoverable state. Sticky for the process.
    #[error("Engine panic: {0}")]
    Panic(String),

    /// The engine reported a non-success status.
    #[error("Engine error: {0}")]
    Engine(Status),

    /// The series name was rejected by the engine.
    #[error("Invalid series {series:?}: {status}")]
    InvalidSeries {
        /// The offending series name.
        series: String,
        /// Status reported while resolving the name.
        status: Status,
    },

    /// A record referenced a series id the engine could not resolve.
    #[error("Series id {0} could not be resolved to a name")]
    UnresolvedSeries(SeriesId),

    /// A record header is inconsistent with the bytes that follow it.
    #[error("Corrupt record at offset {offset}: {reason}")]
    CorruptRecord {
        /// Offset of the record within the read buffer.
        offset: usize,
        /// What failed to line up.
        reason: String,
    },

    /// The engine stayed busy for the whole retry budget.
    #[error("Engine busy after {attempts} write attempts")]
    WriteBusy {
        /// Number of write attempts made.
        attempts: u32,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A time falls outside the engine's timestamp range.
    #[error("Time {0} is out of the timestamp range")]
    TimestampOutOfRange(String),

    /// A query could not be built.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// No database file exists at the given path.
    #[error("Database not found: {0}")]
    DatabaseNotFound(PathBuf),

    /// The handle was already released.
    #[error("Handle is closed")]
    Closed,

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl TsdbError {
    /// Returns true if the error comes from the sticky panic state.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panic(_))
    }
}
