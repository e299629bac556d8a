//! Group-aggregate query: downsampling into fixed-width bins.

use super::{distinct, AggregateFunction, Clauses, OrderBy, Predicate, Query};
use crate::error::{Result, TsdbError};
use crate::sample::Timestamp;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Query dividing points into bins of `step` and aggregating each bin.
///
/// Empty bins produce no output. Every row carries one value per function,
/// ordered as the functions were given.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAggregateQuery {
    metrics: Vec<String>,
    step: Duration,
    functions: Vec<AggregateFunction>,
    clauses: Clauses,
}

impl GroupAggregateQuery {
    /// Starts building a group-aggregate query.
    pub fn builder(
        metrics: &[&str],
        step: Duration,
        functions: &[AggregateFunction],
    ) -> GroupAggregateQueryBuilder {
        let mut funcs: Vec<AggregateFunction> = Vec::with_capacity(functions.len());
        for func in functions {
            if !funcs.contains(func) {
                funcs.push(*func);
            }
        }
        GroupAggregateQueryBuilder {
            metrics: distinct(metrics),
            step,
            functions: funcs,
            clauses: Clauses::default(),
            error: None,
        }
    }

    /// Returns the metrics being aggregated.
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    /// Returns the bin width.
    pub fn step(&self) -> Duration {
        self.step
    }

    /// Returns the aggregate functions.
    pub fn functions(&self) -> &[AggregateFunction] {
        &self.functions
    }
}

impl Query for GroupAggregateQuery {
    fn to_json(&self) -> Value {
        let funcs: Vec<&str> = self.functions.iter().map(|f| f.as_str()).collect();
        let mut root = Map::new();
        root.insert(
            "group-aggregate".to_string(),
            json!({
                "metric": self.metrics,
                "step": self.step.as_nanos() as u64,
                "func": funcs,
            }),
        );
        self.clauses.write_range(&mut root);
        self.clauses.write_where(&mut root);
        self.clauses.write_grouping(&mut root);
        self.clauses.write_output(&mut root);
        Value::Object(root)
    }
}

/// Builder for [`GroupAggregateQuery`].
#[derive(Debug)]
pub struct GroupAggregateQueryBuilder {
    metrics: Vec<String>,
    step: Duration,
    functions: Vec<AggregateFunction>,
    clauses: Clauses,
    error: Option<TsdbError>,
}

impl GroupAggregateQueryBuilder {
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
    /// Returns `TsdbError::InvalidQuery` if metrics or functions are missing,
    /// the step is zero, or the start of the time range is not set.
    pub fn build(self) -> Result<GroupAggregateQuery> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.metrics.is_empty() {
            return Err(TsdbError::InvalidQuery(
                "metrics are required to make a group-aggregate query".to_string(),
            ));
        }
        if self.functions.is_empty() {
            return Err(TsdbError::InvalidQuery(
                "functions are required to make a group-aggregate query".to_string(),
            ));
        }
        if self.step.is_zero() {
            return Err(TsdbError::InvalidQuery("step must be positive".to_string()));
        }
        if !self.clauses.has_range_bound() {
            return Err(TsdbError::InvalidQuery(
                "from is a mandatory parameter".to_string(),
            ));
        }
        Ok(GroupAggregateQuery {
            metrics: self.metrics,
            step: self.step,
            functions: self.functions,
            clauses: self.clauses,
        })
    }
}
