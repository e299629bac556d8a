//! Buffered result cursors.
//!
//! A [`Cursor`] owns a raw engine cursor and a [`ReadBuffer`]. Rows are pulled
//! one at a time: when the buffer is exhausted it is refilled from the engine,
//! then the record at the read position is decoded and the position advances
//! by the record's size.
//!
//! ```rust,ignore
//! let mut cursor = session.open_cursor(r#"{"select":"cpu.load"}"#)?;
//! while !cursor.done()? {
//!     if let Some(row) = cursor.next_row()? {
//!         println!("{:?} {:?} {}", row.series(), row.timestamp(), row.value());
//!     }
//! }
//! cursor.close()?;
//! ```

pub mod buffer;

pub use buffer::ReadBuffer;

use crate::bridge::PanicState;
use crate::engine::{Engine, RawCursor, RawSession};
use crate::error::{Result, TsdbError};
use crate::row::Row;
use crate::sample::SampleHeader;
use tracing::{debug, trace, warn};

/// Pull-based cursor over query results.
///
/// Borrows the session it was opened on. The engine cursor is released by
/// [`close`](Self::close) or on drop, exactly once.
#[derive(Debug)]
pub struct Cursor<'s, E: Engine> {
    engine: &'s E,
    panic: &'s PanicState,
    session: RawSession,
    raw: Option<RawCursor>,
    buffer: ReadBuffer,
    /// Offset and reason of the first corrupt record.
    corrupt: Option<(usize, String)>,
    fused: bool,
}

impl<'s, E: Engine> Cursor<'s, E> {
    pub(crate) fn new(
        engine: &'s E,
        panic: &'s PanicState,
        session: RawSession,
        raw: RawCursor,
        buffer_size: usize,
    ) -> Self {
        Self {
            engine,
            panic,
            session,
            raw: Some(raw),
            buffer: ReadBuffer::with_capacity(buffer_size),
            corrupt: None,
            fused: false,
        }
    }

    /// Returns true while the engine reports no error for this cursor.
    ///
    /// Only the engine's status is consulted; a corrupt record is reported by
    /// [`next_row`](Self::next_row). A closed cursor cannot proceed.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::Panic` if an engine panic has been recorded.
    pub fn can_proceed(&self) -> Result<bool> {
        self.panic.check()?;
        Ok(match self.raw {
            Some(raw) => self.engine.cursor_error(raw).is_none(),
            None => false,
        })
    }

    /// Returns true once every row has been read.
    ///
    /// Never true while buffered bytes remain. A closed cursor is done.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::Panic` if an engine panic has been recorded.
    pub fn done(&self) -> Result<bool> {
        self.panic.check()?;
        if !self.buffer.is_exhausted() {
            return Ok(false);
        }
        Ok(match self.raw {
            Some(raw) => self.engine.cursor_is_done(raw),
            None => true,
        })
    }

    /// Reads the next row.
    ///
    /// `Ok(None)` means no row was available right now; consult
    /// [`done`](Self::done) to tell whether more may follow.
    ///
    /// # Errors
    ///
    /// - `TsdbError::Panic` if an engine panic has been recorded
    /// - `TsdbError::Engine` if the engine reports an error for this cursor
    /// - `TsdbError::CorruptRecord` if a record's framing is inconsistent;
    ///   every later call fails the same way
    /// - `TsdbError::UnresolvedSeries` if the record's series id has no name;
    ///   the record is skipped and the next call continues after it
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        self.panic.check()?;
        let Some(raw) = self.raw else {
            return Ok(None);
        };
        if let Some((offset, reason)) = &self.corrupt {
            return Err(TsdbError::CorruptRecord {
                offset: *offset,
                reason: reason.clone(),
            });
        }

        if self.buffer.is_exhausted() {
            let engine = self.engine;
            let read = self.buffer.refill(|buf| engine.cursor_read(raw, buf));
            trace!("Refilled cursor {:?} with {} bytes", raw, read);
        }

        if let Some(status) = self.engine.cursor_error(raw) {
            return Err(TsdbError::Engine(status));
        }
        if self.buffer.is_exhausted() {
            return Ok(None);
        }

        let offset = self.buffer.position();
        let header = match SampleHeader::parse(self.buffer.unread(), offset) {
            Ok(header) => header,
            Err(err) => {
                warn!("Corrupt record in cursor {:?}: {}", raw, err);
                if let TsdbError::CorruptRecord { offset, reason } = &err {
                    self.corrupt = Some((*offset, reason.clone()));
                }
                self.buffer.discard();
                return Err(err);
            }
        };

        let (engine, session) = (self.engine, self.session);
        let result = header.decode_row(self.buffer.unread(), |id| engine.id_to_series(session, id));
        self.buffer.advance(header.record_len());

        match result {
            Ok(row) => Ok(Some(row)),
            Err(err) => {
                warn!("Skipping record at offset {}: {}", offset, err);
                Err(err)
            }
        }
    }

    /// Releases the engine cursor. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::Panic` if an engine panic has been recorded.
    pub fn close(&mut self) -> Result<()> {
        self.panic.check()?;
        if let Some(raw) = self.raw.take() {
            self.engine.cursor_close(raw);
            self.buffer.discard();
            debug!("Closed cursor {:?}", raw);
        }
        Ok(())
    }

    /// Returns true once the cursor has been closed.
    pub fn is_closed(&self) -> bool {
        self.raw.is_none()
    }
}

impl<E: Engine> Iterator for Cursor<'_, E> {
    type Item = Result<Row>;

    /// Yields rows until the cursor is done.
    ///
    /// Unresolved series are reported and skipped. Any other error is
    /// reported once and ends the iteration.
    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        loop {
            match self.next_row() {
                Ok(Some(row)) => return Some(Ok(row)),
                Ok(None) => match self.done() {
                    Ok(true) => {
                        self.fused = true;
                        return None;
                    }
                    Ok(false) => continue,
                    Err(err) => {
                        self.fused = true;
                        return Some(Err(err));
                    }
                },
                Err(err @ TsdbError::UnresolvedSeries(_)) => return Some(Err(err)),
                Err(err) => {
                    self.fused = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<E: Engine> Drop for Cursor<'_, E> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            if self.panic.has_panic() {
                warn!("Engine panic recorded, not releasing cursor {:?}", raw);
                return;
            }
            self.engine.cursor_close(raw);
            debug!("Released cursor {:?} on drop", raw);
        }
    }
}

/// Cursor over the series names returned by a metadata query.
#[derive(Debug)]
pub struct MetadataCursor<'s, E: Engine> {
    inner: Cursor<'s, E>,
}

impl<'s, E: Engine> MetadataCursor<'s, E> {
    pub(crate) fn new(inner: Cursor<'s, E>) -> Self {
        Self { inner }
    }

    /// Reads the next series name.
    ///
    /// Rows without a series are skipped. `Ok(None)` has the same meaning as
    /// in [`Cursor::next_row`].
    ///
    /// # Errors
    ///
    /// See [`Cursor::next_row`].
    pub fn next_name(&mut self) -> Result<Option<String>> {
        loop {
            match self.inner.next_row()? {
                Some(Row {
                    series: Some(name), ..
                }) => return Ok(Some(name)),
                Some(_) => warn!("Skipping metadata row without a series"),
                None => return Ok(None),
            }
        }
    }

    /// Returns true once every name has been read.
    ///
    /// Reports false while the engine cannot proceed, so that the caller's
    /// next read surfaces the engine error.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::Panic` if an engine panic has been recorded.
    pub fn done(&self) -> Result<bool> {
        if !self.inner.can_proceed()? {
            return Ok(self.inner.is_closed());
        }
        self.inner.done()
    }

    /// See [`Cursor::can_proceed`].
    pub fn can_proceed(&self) -> Result<bool> {
        self.inner.can_proceed()
    }

    /// See [`Cursor::close`].
    pub fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

impl<E: Engine> Iterator for MetadataCursor<'_, E> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(Row {
                    series: Some(name), ..
                }) => return Some(Ok(name)),
                Ok(_) => warn!("Skipping metadata row without a series"),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
