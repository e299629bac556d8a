//! Join query: aligns several metrics that share tags.

use super::{distinct, Clauses, OrderBy, Predicate, Query};
use crate::error::{Result, TsdbError};
use crate::sample::Timestamp;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// Query joining series that have the same tags but different metrics.
///
/// Each output row is a tuple with one slot per metric; the row's series name
/// is the compound `m1|m2|m3 tag=value` form.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinQuery {
    metrics: Vec<String>,
    clauses: Clauses,
}

impl JoinQuery {
    /// Starts building a join over `metrics`.
    pub fn builder(metrics: &[&str]) -> JoinQueryBuilder {
        JoinQueryBuilder {
            metrics: distinct(metrics),
            clauses: Clauses::default(),
            error: None,
        }
    }

    /// Returns the joined metrics in slot order.
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }
}

impl Query for JoinQuery {
    fn to_json(&self) -> Value {
        let mut root = Map::new();
        root.insert("join".to_string(), json!(self.metrics));
        self.clauses.write_range(&mut root);
        self.clauses.write_where(&mut root);
        self.clauses.write_output(&mut root);
        Value::Object(root)
    }
}

/// Builder for [`JoinQuery`].
#[derive(Debug)]
pub struct JoinQueryBuilder {
    metrics: Vec<String>,
    clauses: Clauses,
    error: Option<TsdbError>,
}

impl JoinQueryBuilder {
    /// Sets the start of the time range (nanoseconds).
    pub fn from(mut self, from: Timestamp) -> Self {
        self.clauses.from = Some(from);
        self
    }

    /// Sets the end of the time range (nanoseconds).
    pub fn to(mut self, to: Timestamp) -> Self {
        self.clauses.to = Some(to);
        self
    }

    /// Sets both ends of the time range. `from > to` reverses the output order.
    pub fn range(self, from: Timestamp, to: Timestamp) -> Self {
        self.from(from).to(to)
    }

    /// Sets the start of the time range from a UTC time.
    pub fn from_time(mut self, from: DateTime<Utc>) -> Self {
        if let Err(err) = self.clauses.set_from_time(from) {
            self.error.get_or_insert(err);
        }
        self
    }

    /// Sets the end of the time range from a UTC time.
    pub fn to_time(mut self, to: DateTime<Utc>) -> Self {
        if let Err(err) = self.clauses.set_to_time(to) {
            self.error.get_or_insert(err);
        }
        self
    }

    /// Restricts the output to series whose `tag` has one of `values`.
    pub fn where_tag(mut self, tag: &str, values: &[&str]) -> Self {
        self.clauses.set_where(tag, values);
        self
    }

    /// Sets the output order.
    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.clauses.order_by = Some(order_by);
        self
    }

    /// Adds a value filter. At most two filters may be combined.
    pub fn filter(mut self, predicate: Predicate, value: f64) -> Self {
        if let Err(err) = self.clauses.add_filter(predicate, value) {
            self.error.get_or_insert(err);
        }
        self
    }

    /// Limits the number of output rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.clauses.limit = Some(limit);
        self
    }

    /// Skips rows at the start of the output.
    pub fn offset(mut self, offset: u64) -> Self {
        self.clauses.offset = Some(offset);
        self
    }

    /// Builds the query.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::InvalidQuery` if no metrics are given or the start
    /// of the time range is not set.
    pub fn build(self) -> Result<JoinQuery> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.metrics.is_empty() {
            return Err(TsdbError::InvalidQuery(
                "metrics are required to make a join query".to_string(),
            ));
        }
        if self.metrics.len() > crate::sample::MAX_TUPLE_ELEMENTS {
            return Err(TsdbError::InvalidQuery(format!(
                "at most {} metrics can be joined",
                crate::sample::MAX_TUPLE_ELEMENTS
            )));
        }
        if !self.clauses.has_range_bound() {
            return Err(TsdbError::InvalidQuery(
                "from is a mandatory parameter".to_string(),
            ));
        }
        Ok(JoinQuery {
            metrics: self.metrics,
            clauses: self.clauses,
        })
    }
}
