//! Query builders.
//!
//! The engine accepts queries as JSON documents. The builders here produce
//! those documents from typed parameters and reject incomplete queries before
//! they reach the engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_tsdb::query::{Query, SelectQuery};
//!
//! let query = SelectQuery::builder("cpu.load").range(from, to).build()?;
//! let mut cursor = session.query(&query)?;
//! ```

pub mod aggregate;
pub mod group_aggregate;
pub mod join;
pub mod metadata;
pub mod select;

pub use aggregate::AggregateQuery;
pub use group_aggregate::GroupAggregateQuery;
pub use join::JoinQuery;
pub use metadata::MetadataQuery;
pub use select::SelectQuery;

use crate::error::{Result, TsdbError};
use crate::sample::Timestamp;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// A query that can be sent to the engine.
pub trait Query {
    /// Renders the query as a JSON value.
    fn to_json(&self) -> Value;

    /// Renders the query as the text passed to the engine.
    fn to_query_string(&self) -> String {
        self.to_json().to_string()
    }
}

/// Aggregation functions supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggregateFunction {
    /// Number of points.
    Count,
    /// Largest value.
    Max,
    /// Smallest value.
    Min,
    /// Arithmetic mean.
    Mean,
    /// Sum of values.
    Sum,
    /// Timestamp of the smallest value.
    MinTimestamp,
    /// Timestamp of the largest value.
    MaxTimestamp,
    /// First value in time order.
    First,
    /// Last value in time order.
    Last,
}

impl AggregateFunction {
    /// All functions, in the engine's canonical order.
    pub const ALL: [AggregateFunction; 9] = [
        Self::Count,
        Self::Max,
        Self::Min,
        Self::Mean,
        Self::Sum,
        Self::MinTimestamp,
        Self::MaxTimestamp,
        Self::First,
        Self::Last,
    ];

    /// Name used in query text and series names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Max => "max",
            Self::Min => "min",
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::MinTimestamp => "min_timestamp",
            Self::MaxTimestamp => "max_timestamp",
            Self::First => "first",
            Self::Last => "last",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateFunction {
    type Err = TsdbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|func| func.as_str() == s)
            .ok_or_else(|| TsdbError::InvalidQuery(format!("unknown aggregate function {:?}", s)))
    }
}

/// Comparison used by value filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// Strictly greater than.
    GreaterThan,
    /// Greater than or equal.
    GreaterOrEqual,
    /// Strictly less than.
    LessThan,
    /// Less than or equal.
    LessOrEqual,
}

impl Predicate {
    /// Key used in the filter object.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GreaterThan => "gt",
            Self::GreaterOrEqual => "ge",
            Self::LessThan => "lt",
            Self::LessOrEqual => "le",
        }
    }
}

/// A single value filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filter {
    /// Comparison.
    pub predicate: Predicate,
    /// Threshold.
    pub value: f64,
}

/// Output ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    /// Series name first, then timestamp.
    Series,
    /// Timestamp first, then series name.
    Time,
}

impl OrderBy {
    /// Name used in query text.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Time => "time",
        }
    }
}

/// Converts a UTC time to an engine timestamp.
///
/// # Errors
///
/// Returns `TsdbError::TimestampOutOfRange` for times before the epoch or
/// outside the nanosecond range.
pub fn timestamp_from_utc(time: DateTime<Utc>) -> Result<Timestamp> {
    time.timestamp_nanos_opt()
        .and_then(|nanos| Timestamp::try_from(nanos).ok())
        .ok_or_else(|| TsdbError::TimestampOutOfRange(time.to_string()))
}

/// Converts an engine timestamp to a UTC time, if representable.
pub fn utc_from_timestamp(timestamp: Timestamp) -> Option<DateTime<Utc>> {
    i64::try_from(timestamp)
        .ok()
        .map(DateTime::<Utc>::from_timestamp_nanos)
}

/// Clauses shared by select, join and group-aggregate queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Clauses {
    pub(crate) from: Option<Timestamp>,
    pub(crate) to: Option<Timestamp>,
    pub(crate) where_tag: Option<(String, Vec<String>)>,
    pub(crate) group_by_tag: Vec<String>,
    pub(crate) pivot_by_tag: Vec<String>,
    pub(crate) order_by: Option<OrderBy>,
    pub(crate) filters: Vec<Filter>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
}

impl Clauses {
    /// True when a renderable range is set. A lone `to` can't be expressed.
    pub(crate) fn has_range_bound(&self) -> bool {
        self.from.is_some()
    }

    pub(crate) fn set_from_time(&mut self, time: DateTime<Utc>) -> Result<()> {
        self.from = Some(timestamp_from_utc(time)?);
        Ok(())
    }

    pub(crate) fn set_to_time(&mut self, time: DateTime<Utc>) -> Result<()> {
        self.to = Some(timestamp_from_utc(time)?);
        Ok(())
    }

    pub(crate) fn set_where(&mut self, tag: &str, values: &[&str]) {
        self.where_tag = Some((tag.to_string(), distinct(values)));
    }

    pub(crate) fn add_filter(&mut self, predicate: Predicate, value: f64) -> Result<()> {
        if self.filters.len() == 2 {
            return Err(TsdbError::InvalidQuery(
                "at most two value filters are supported".to_string(),
            ));
        }
        self.filters.push(Filter { predicate, value });
        Ok(())
    }

    pub(crate) fn write_range(&self, root: &mut Map<String, Value>) {
        match (self.from, self.to) {
            (Some(from), Some(to)) => {
                root.insert("range".to_string(), json!({ "from": from, "to": to }));
            }
            (Some(from), None) => {
                root.insert("range".to_string(), json!({ "from": from }));
            }
            _ => {}
        }
    }

    pub(crate) fn write_where(&self, root: &mut Map<String, Value>) {
        if let Some((tag, values)) = &self.where_tag {
            let mut clause = Map::new();
            clause.insert(tag.clone(), json!(values));
            root.insert("where".to_string(), Value::Object(clause));
        }
    }

    pub(crate) fn write_grouping(&self, root: &mut Map<String, Value>) {
        if !self.group_by_tag.is_empty() {
            root.insert("group-by-tag".to_string(), json!(self.group_by_tag));
        }
        if !self.pivot_by_tag.is_empty() {
            root.insert("pivot-by-tag".to_string(), json!(self.pivot_by_tag));
        }
    }

    pub(crate) fn write_output(&self, root: &mut Map<String, Value>) {
        if let Some(order_by) = self.order_by {
            root.insert("order-by".to_string(), json!(order_by.as_str()));
        }
        if !self.filters.is_empty() {
            let mut filter = Map::new();
            for f in &self.filters {
                filter.insert(f.predicate.as_str().to_string(), json!(f.value));
            }
            root.insert("filter".to_string(), Value::Object(filter));
        }
        if let Some(limit) = self.limit {
            root.insert("limit".to_string(), json!(limit));
        }
        if let Some(offset) = self.offset {
            root.insert("offset".to_string(), json!(offset));
        }
    }
}

/// Removes duplicates while keeping first-seen order.
pub(crate) fn distinct(values: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !out.iter().any(|v| v == value) {
            out.push(value.to_string());
        }
    }
    out
}
