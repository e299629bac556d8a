//! Alopex TSDB - Binding layer for an external time series engine
//!
//! This crate wraps a time series engine behind owned database, session and
//! cursor handles, and decodes the engine's binary sample records into rows.
//!
//! # Components
//!
//! - [`Tsdb`] / [`Database`] / [`Session`]: Handle lifecycle and the write path
//! - [`Cursor`]: Buffered pull cursor over query results
//! - [`sample`]: Binary record decoding
//! - [`query`]: JSON query builders
//! - [`PanicState`]: Sticky engine panic shared by every handle
//! - [`MemoryEngine`]: In-process engine producing the native record stream
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
//! session.write("cpu.load host=a", 1_000, 0.5)?;
//!
//! let query = SelectQuery::builder("cpu.load").from(0).build()?;
//! let mut cursor = session.query(&query)?;
//! while !cursor.done()? {
//!     if let Some(row) = cursor.next_row()? {
//!         println!("{:?} {:?} {:?}", row.series(), row.timestamp(), row.values());
//!     }
//! }
//! ```

#![deny(missing_docs)]

pub mod bridge;
pub mod config;
pub mod cursor;
pub mod database;
pub mod engine;
pub mod error;
pub mod query;
pub mod row;
pub mod sample;
pub mod series;
pub mod status;

pub use bridge::PanicState;
pub use config::{BusyRetry, CreateOptions, CursorConfig, DatabaseConfig, WalConfig};
pub use cursor::{Cursor, MetadataCursor};
pub use database::{Database, Session, Tsdb};
pub use engine::{Engine, MemoryEngine};
pub use error::{Result, TsdbError};
pub use query::{
    AggregateFunction, AggregateQuery, GroupAggregateQuery, JoinQuery, MetadataQuery, Query,
    SelectQuery,
};
pub use row::Row;
pub use sample::{SeriesId, Timestamp};
pub use series::Tag;
pub use status::Status;
