//! Select query: raw data points of one metric.

use super::{distinct, Clauses, OrderBy, Predicate, Query};
use crate::error::{Result, TsdbError};
use crate::sample::Timestamp;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// Query returning the raw data points of a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    metric: String,
    clauses: Clauses,
}

impl SelectQuery {
    /// Starts building a select query for `metric`.
    pub fn builder(metric: impl Into<String>) -> SelectQueryBuilder {
        SelectQueryBuilder {
            metric: metric.into(),
            clauses: Clauses::default(),
            error: None,
        }
    }

    /// Returns the selected metric.
    pub fn metric(&self) -> &str {
        &self.metric
    }
}

impl Query for SelectQuery {
    fn to_json(&self) -> Value {
        let mut root = Map::new();
        root.insert("select".to_string(), json!(self.metric));
        self.clauses.write_range(&mut root);
        self.clauses.write_where(&mut root);
        self.clauses.write_grouping(&mut root);
        self.clauses.write_output(&mut root);
        Value::Object(root)
    }
}

/// Builder for [`SelectQuery`].
#[derive(Debug)]
pub struct SelectQueryBuilder {
    metric: String,
    clauses: Clauses,
    error: Option<TsdbError>,
}

impl SelectQueryBuilder {
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

    /// Merges series after removing the listed tags from their names.
    pub fn group_by_tag(mut self, tags: &[&str]) -> Self {
        self.clauses.group_by_tag = distinct(tags);
        self
    }

    /// Merges series after removing every tag except the listed ones.
    pub fn pivot_by_tag(mut self, tags: &[&str]) -> Self {
        self.clauses.pivot_by_tag = distinct(tags);
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
    /// Returns `TsdbError::InvalidQuery` if the metric is blank or a clause was rejected.
    pub fn build(self) -> Result<SelectQuery> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.metric.trim().is_empty() {
            return Err(TsdbError::InvalidQuery(
                "metric is required to make a select query".to_string(),
            ));
        }
        Ok(SelectQuery {
            metric: self.metric,
            clauses: self.clauses,
        })
    }
}
