//! Databases and sessions.
//!
//! Resources form a borrow chain: a [`Session`] borrows its [`Database`] and a
//! [`Cursor`] borrows its session, so a parent can't be closed while children
//! are alive. Every handle is released exactly once, by `close` or on drop.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_tsdb::{CreateOptions, DatabaseConfig, SelectQuery, Tsdb};
//!
//! let tsdb = Tsdb::in_memory();
//! tsdb.create_database(&dir, "metrics", &CreateOptions::default())?;
//! let db = tsdb.open_database(&dir, "metrics", DatabaseConfig::default())?;
//! let session = db.session()?;
//!
//! session.write("cpu.load host=a", now_ns, 0.75)?;
//!
//! let query = SelectQuery::builder("cpu.load").range(from, to).build()?;
//! for row in session.query(&query)? {
//!     let row = row?;
//!     println!("{:?} {}", row.series(), row.value());
//! }
//! ```

use crate::bridge::PanicState;
use crate::config::{CreateOptions, DatabaseConfig};
use crate::cursor::{Cursor, MetadataCursor};
use crate::engine::{Engine, MemoryEngine, OpenParams, RawDatabase, RawSession};
use crate::error::{Result, TsdbError};
use crate::query::{timestamp_from_utc, MetadataQuery, Query};
use crate::sample::Timestamp;
use crate::series::MAX_SERIES_NAME_LEN;
use crate::status::Status;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Extension of database files.
pub const DATABASE_EXTENSION: &str = "akumuli";

/// Entry point to an engine.
///
/// Holds the engine together with the panic state it reports to.
#[derive(Debug)]
pub struct Tsdb<E: Engine> {
    engine: Arc<E>,
    panic: Arc<PanicState>,
}

impl Tsdb<MemoryEngine> {
    /// Creates a binding over a fresh [`MemoryEngine`].
    pub fn in_memory() -> Self {
        let panic = Arc::new(PanicState::new());
        let engine = MemoryEngine::new(Arc::clone(&panic));
        Self::new(engine, panic)
    }
}

impl<E: Engine> Tsdb<E> {
    /// Wraps `engine`, which reports panics to `panic`.
    pub fn new(engine: E, panic: Arc<PanicState>) -> Self {
        Self {
            engine: Arc::new(engine),
            panic,
        }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns the shared panic state.
    pub fn panic_state(&self) -> &Arc<PanicState> {
        &self.panic
    }

    /// Records an engine panic. The first message wins.
    pub fn record_panic(&self, message: impl Into<String>) {
        self.panic.record_panic(message);
    }

    /// Returns true once an engine panic has been recorded.
    pub fn has_panic(&self) -> bool {
        self.panic.has_panic()
    }

    /// Path of the database file `name` in `dir`.
    pub fn database_file(dir: impl AsRef<Path>, name: &str) -> PathBuf {
        dir.as_ref().join(format!("{}.{}", name, DATABASE_EXTENSION))
    }

    /// Creates a database and returns the path of its file.
    ///
    /// # Errors
    ///
    /// - `TsdbError::Panic` if an engine panic has been recorded
    /// - `TsdbError::InvalidConfig` for a bad name or out-of-range options
    /// - `TsdbError::Engine` if the engine rejects the request
    pub fn create_database(
        &self,
        dir: impl AsRef<Path>,
        name: &str,
        options: &CreateOptions,
    ) -> Result<PathBuf> {
        self.panic.check()?;
        validate_name(name)?;
        options.validate()?;

        let dir = dir.as_ref();
        let status = self.engine.create_database(name, dir, options);
        if !status.is_success() {
            return Err(TsdbError::Engine(status));
        }
        let file = Self::database_file(dir, name);
        debug!("Created database {}", file.display());
        Ok(file)
    }

    /// Opens an existing database.
    ///
    /// # Errors
    ///
    /// - `TsdbError::Panic` if an engine panic has been recorded
    /// - `TsdbError::InvalidConfig` for out-of-range settings
    /// - `TsdbError::DatabaseNotFound` if the database file doesn't exist
    /// - `TsdbError::Engine` if the engine can't open it
    pub fn open_database(
        &self,
        dir: impl AsRef<Path>,
        name: &str,
        config: DatabaseConfig,
    ) -> Result<Database<E>> {
        self.panic.check()?;
        validate_name(name)?;
        config.validate()?;

        let dir = dir.as_ref();
        let file = Self::database_file(dir, name);
        if !file.is_file() {
            return Err(TsdbError::DatabaseNotFound(file));
        }

        let wal = config.wal.clone().filter(|wal| wal.volumes > 0);
        let params = OpenParams {
            wal_path: wal.as_ref().map(|_| dir.to_path_buf()),
            wal,
        };
        let raw = self
            .engine
            .open_database(&file, &params)
            .map_err(TsdbError::Engine)?;
        debug!("Opened database {} as {:?}", file.display(), raw);

        Ok(Database {
            engine: Arc::clone(&self.engine),
            panic: Arc::clone(&self.panic),
            raw: Some(raw),
            file,
            config,
        })
    }

    /// Removes a closed database.
    ///
    /// # Errors
    ///
    /// - `TsdbError::Panic` if an engine panic has been recorded
    /// - `TsdbError::DatabaseNotFound` if the database file doesn't exist
    /// - `TsdbError::Engine` if the engine refuses, e.g. while it is open
    pub fn remove_database(&self, dir: impl AsRef<Path>, name: &str) -> Result<()> {
        self.panic.check()?;
        validate_name(name)?;

        let file = Self::database_file(dir, name);
        if !file.is_file() {
            return Err(TsdbError::DatabaseNotFound(file));
        }
        match self.engine.remove_database(&file) {
            Status::Success => {
                debug!("Removed database {}", file.display());
                Ok(())
            }
            status => Err(TsdbError::Engine(status)),
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains(|c: char| c == '/' || c == '\\') {
        return Err(TsdbError::InvalidConfig(format!(
            "invalid database name {:?}",
            name
        )));
    }
    Ok(())
}

/// An open database.
#[derive(Debug)]
pub struct Database<E: Engine> {
    engine: Arc<E>,
    panic: Arc<PanicState>,
    raw: Option<RawDatabase>,
    file: PathBuf,
    config: DatabaseConfig,
}

impl<E: Engine> Database<E> {
    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Configuration the database was opened with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Opens a session.
    ///
    /// # Errors
    ///
    /// - `TsdbError::Panic` if an engine panic has been recorded
    /// - `TsdbError::Closed` if the database was closed
    /// - `TsdbError::Engine` if the engine refuses
    pub fn session(&self) -> Result<Session<'_, E>> {
        self.panic.check()?;
        let db = self.raw.ok_or(TsdbError::Closed)?;
        let raw = self
            .engine
            .create_session(db)
            .map_err(TsdbError::Engine)?;
        debug!("Created session {:?} on {:?}", raw, db);
        Ok(Session {
            db: self,
            raw: Some(raw),
        })
    }

    /// Closes the database. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::Panic` if an engine panic has been recorded.
    pub fn close(&mut self) -> Result<()> {
        self.panic.check()?;
        if let Some(raw) = self.raw.take() {
            self.engine.close_database(raw);
            debug!("Closed database {}", self.file.display());
        }
        Ok(())
    }
}

impl<E: Engine> Drop for Database<E> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            if self.panic.has_panic() {
                warn!("Engine panic recorded, not closing {}", self.file.display());
                return;
            }
            self.engine.close_database(raw);
            debug!("Closed database {} on drop", self.file.display());
        }
    }
}

/// A session on an open database.
#[derive(Debug)]
pub struct Session<'db, E: Engine> {
    db: &'db Database<E>,
    raw: Option<RawSession>,
}

impl<'db, E: Engine> Session<'db, E> {
    fn handle(&self) -> Result<RawSession> {
        self.db.panic.check()?;
        self.raw.ok_or(TsdbError::Closed)
    }

    /// Writes one value.
    ///
    /// A busy engine is retried immediately until it accepts the write or the
    /// database's [`BusyRetry`](crate::config::BusyRetry) bound runs out.
    ///
    /// # Errors
    ///
    /// - `TsdbError::Panic` if an engine panic has been recorded
    /// - `TsdbError::InvalidSeries` if the series name is too long or rejected
    /// - `TsdbError::WriteBusy` if the engine stayed busy
    /// - `TsdbError::Engine` for any other failure status
    pub fn write(&self, series: &str, timestamp: Timestamp, value: f64) -> Result<()> {
        let session = self.handle()?;
        if series.len() > MAX_SERIES_NAME_LEN {
            return Err(TsdbError::InvalidSeries {
                series: series.to_string(),
                status: Status::BadArg,
            });
        }
        let engine = &*self.db.engine;
        let id = engine
            .series_to_id(session, series)
            .map_err(|status| TsdbError::InvalidSeries {
                series: series.to_string(),
                status,
            })?;

        let retry = &self.db.config.busy_retry;
        let started = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match engine.write(session, id, timestamp, value) {
                Status::Success => return Ok(()),
                Status::Busy => {
                    let out_of_attempts = retry.max_attempts.is_some_and(|max| attempts >= max);
                    let out_of_time = retry.timeout.is_some_and(|t| started.elapsed() >= t);
                    if out_of_attempts || out_of_time {
                        warn!("Engine busy, giving up after {} attempts", attempts);
                        return Err(TsdbError::WriteBusy { attempts });
                    }
                    trace!("Engine busy, retrying write to {}", series);
                    self.db.panic.check()?;
                }
                status => return Err(TsdbError::Engine(status)),
            }
        }
    }

    /// Writes one value at a UTC time.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::TimestampOutOfRange` for times before the epoch,
    /// otherwise see [`write`](Self::write).
    pub fn write_at(&self, series: &str, time: DateTime<Utc>, value: f64) -> Result<()> {
        self.write(series, timestamp_from_utc(time)?, value)
    }

    /// Starts a query given as engine query text.
    ///
    /// Query failures are reported by the cursor.
    ///
    /// # Errors
    ///
    /// - `TsdbError::Panic` if an engine panic has been recorded
    /// - `TsdbError::Closed` if the session was closed
    pub fn open_cursor(&self, query: &str) -> Result<Cursor<'_, E>> {
        let session = self.handle()?;
        let raw = self.db.engine.query(session, query);
        debug!("Opened cursor {:?} for {}", raw, query);
        Ok(Cursor::new(
            &*self.db.engine,
            &self.db.panic,
            session,
            raw,
            self.db.config.cursor.read_buffer_size,
        ))
    }

    /// Starts a query built with one of the query builders.
    ///
    /// # Errors
    ///
    /// See [`open_cursor`](Self::open_cursor).
    pub fn query(&self, query: &impl Query) -> Result<Cursor<'_, E>> {
        self.open_cursor(&query.to_query_string())
    }

    /// Lists series names.
    ///
    /// # Errors
    ///
    /// See [`open_cursor`](Self::open_cursor).
    pub fn metadata(&self, query: &MetadataQuery) -> Result<MetadataCursor<'_, E>> {
        Ok(MetadataCursor::new(self.query(query)?))
    }

    /// Destroys the session. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::Panic` if an engine panic has been recorded.
    pub fn close(&mut self) -> Result<()> {
        self.db.panic.check()?;
        if let Some(raw) = self.raw.take() {
            self.db.engine.destroy_session(raw);
            debug!("Destroyed session {:?}", raw);
        }
        Ok(())
    }
}

impl<E: Engine> Drop for Session<'_, E> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            if self.db.panic.has_panic() {
                warn!("Engine panic recorded, not destroying session {:?}", raw);
                return;
            }
            self.db.engine.destroy_session(raw);
            debug!("Destroyed session {:?} on drop", raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusyRetry;
    use std::time::Duration;
    use tempfile::TempDir;

    fn open(tsdb: &Tsdb<MemoryEngine>, dir: &TempDir, retry: BusyRetry) -> Database<MemoryEngine> {
        tsdb.create_database(dir.path(), "db", &CreateOptions::default())
            .unwrap();
        let config = DatabaseConfig {
            busy_retry: retry,
            ..Default::default()
        };
        tsdb.open_database(dir.path(), "db", config).unwrap()
    }

    #[test]
    fn test_write_retries_busy() {
        let dir = TempDir::new().unwrap();
        let tsdb = Tsdb::in_memory();
        let db = open(&tsdb, &dir, BusyRetry::unbounded());
        let session = db.session().unwrap();

        tsdb.engine().set_busy_writes(50);
        session.write("m host=a", 1, 1.0).unwrap();
        let rows: Vec<_> = session
            .open_cursor(r#"{"select":"m"}"#)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_write_busy_bound() {
        let dir = TempDir::new().unwrap();
        let tsdb = Tsdb::in_memory();
        let db = open(&tsdb, &dir, BusyRetry::new(Some(3), None));
        let session = db.session().unwrap();

        tsdb.engine().set_busy_writes(10);
        match session.write("m host=a", 1, 1.0) {
            Err(TsdbError::WriteBusy { attempts }) => assert_eq!(attempts, 3),
            other => panic!("Expected busy error, got {:?}", other),
        }

        let db2_dir = TempDir::new().unwrap();
        let db2 = open(
            &tsdb,
            &db2_dir,
            BusyRetry::new(None, Some(Duration::ZERO)),
        );
        let session = db2.session().unwrap();
        tsdb.engine().set_busy_writes(10);
        assert!(matches!(
            session.write("m host=a", 1, 1.0),
            Err(TsdbError::WriteBusy { attempts: 1 })
        ));
    }

    #[test]
    fn test_invalid_series() {
        let dir = TempDir::new().unwrap();
        let tsdb = Tsdb::in_memory();
        let db = open(&tsdb, &dir, BusyRetry::default());
        let session = db.session().unwrap();

        match session.write("no_tags", 1, 1.0) {
            Err(TsdbError::InvalidSeries { series, status }) => {
                assert_eq!(series, "no_tags");
                assert_eq!(status, Status::BadData);
            }
            other => panic!("Expected invalid series, got {:?}", other),
        }

        let long = format!("m host={}", "x".repeat(MAX_SERIES_NAME_LEN));
        let before = tsdb.engine().calls();
        assert!(matches!(
            session.write(&long, 1, 1.0),
            Err(TsdbError::InvalidSeries {
                status: Status::BadArg,
                ..
            })
        ));
        assert_eq!(tsdb.engine().calls(), before);
    }

    #[test]
    fn test_handles_released_once() {
        let dir = TempDir::new().unwrap();
        let tsdb = Tsdb::in_memory();
        let mut db = open(&tsdb, &dir, BusyRetry::default());
        {
            let mut session = db.session().unwrap();
            let _cursor = session.open_cursor(r#"{"select":"m"}"#).unwrap();
            assert_eq!(tsdb.engine().open_cursors(), 1);
            drop(_cursor);
            session.close().unwrap();
            session.close().unwrap();
            assert_eq!(tsdb.engine().open_sessions(), 0);
            assert!(matches!(session.write("m host=a", 1, 1.0), Err(TsdbError::Closed)));
        }
        db.close().unwrap();
        db.close().unwrap();
        assert_eq!(tsdb.engine().open_databases(), 0);
        assert!(matches!(db.session(), Err(TsdbError::Closed)));
    }

    #[test]
    fn test_bad_names_and_missing_database() {
        let dir = TempDir::new().unwrap();
        let tsdb = Tsdb::in_memory();
        assert!(matches!(
            tsdb.create_database(dir.path(), "a/b", &CreateOptions::default()),
            Err(TsdbError::InvalidConfig(_))
        ));
        assert!(matches!(
            tsdb.open_database(dir.path(), "missing", DatabaseConfig::default()),
            Err(TsdbError::DatabaseNotFound(_))
        ));
        assert!(matches!(
            tsdb.remove_database(dir.path(), "missing"),
            Err(TsdbError::DatabaseNotFound(_))
        ));
    }
}
