//! Aggregate query: one value per series.

use super::{distinct, AggregateFunction, Clauses, Query};
use crate::error::{Result, TsdbError};
use crate::sample::Timestamp;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// Query computing one aggregate per series over the time range.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    metric: String,
    function: AggregateFunction,
    clauses: Clauses,
}

impl AggregateQuery {
    /// Starts building an aggregate of `function` over `metric`.
    pub fn builder(metric: impl Into<String>, function: AggregateFunction) -> AggregateQueryBuilder {
        AggregateQueryBuilder {
            metric: metric.into(),
            function,
            clauses: Clauses::default(),
            error: None,
        }
    }

    /// Returns the aggregated metric.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Returns the aggregate function.
    pub fn function(&self) -> AggregateFunction {
        self.function
    }
}

impl Query for AggregateQuery {
    fn to_json(&self) -> Value {
        let mut aggregate = Map::new();
        aggregate.insert(self.metric.clone(), json!(self.function.as_str()));

        let mut root = Map::new();
        root.insert("aggregate".to_string(), Value::Object(aggregate));
        self.clauses.write_range(&mut root);
        self.clauses.write_grouping(&mut root);
        self.clauses.write_where(&mut root);
        Value::Object(root)
    }
}

/// Builder for [`AggregateQuery`].
#[derive(Debug)]
pub struct AggregateQueryBuilder {
    metric: String,
    function: AggregateFunction,
    clauses: Clauses,
    error: Option<TsdbError>,
}

impl AggregateQueryBuilder {
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

    /// Builds the query.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::InvalidQuery` if the metric is blank or a clause was rejected.
    pub fn build(self) -> Result<AggregateQuery> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.metric.trim().is_empty() {
            return Err(TsdbError::InvalidQuery(
                "metric is required to make an aggregate query".to_string(),
            ));
        }
        Ok(AggregateQuery {
            metric: self.metric,
            function: self.function,
            clauses: self.clauses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_json() {
        let query = AggregateQuery::builder("mem", AggregateFunction::Max)
            .range(1, 2)
            .pivot_by_tag(&["server"])
            .where_tag("server", &["1"])
            .build()
            .unwrap();
        assert_eq!(
            query.to_json(),
            json!({
                "aggregate": { "mem": "max" },
                "range": { "from": 1, "to": 2 },
                "pivot-by-tag": ["server"],
                "where": { "server": ["1"] }
            })
        );
    }

    #[test]
    fn test_aggregate_requires_metric() {
        assert!(AggregateQuery::builder("", AggregateFunction::Count)
            .build()
            .is_err());
    }
}
