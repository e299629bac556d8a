//! Decoded result rows.

use crate::query::{utc_from_timestamp, AggregateFunction};
use crate::sample::Timestamp;
use crate::series::{self, Tag};
use chrono::{DateTime, Utc};

/// One decoded sample.
///
/// `values` has one entry for scalar samples, one entry per slot for tuple
/// samples (NaN for absent slots) and none for series-only samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Resolved series name, absent when the record carries no series id.
    pub series: Option<String>,
    /// Timestamp in nanoseconds, present only alongside the series name.
    pub timestamp: Option<Timestamp>,
    /// Decoded values.
    pub values: Vec<f64>,
}

impl Row {
    /// Returns the series name.
    pub fn series(&self) -> Option<&str> {
        self.series.as_deref()
    }

    /// Returns the timestamp in nanoseconds.
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// Returns the timestamp as a UTC time.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(utc_from_timestamp)
    }

    /// Returns the first value, or NaN if the row has none.
    pub fn value(&self) -> f64 {
        self.values.first().copied().unwrap_or(f64::NAN)
    }

    /// Returns all values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns the first metric of the series name.
    pub fn metric(&self) -> Option<&str> {
        self.series().map(series::metric)
    }

    /// Returns every metric of a compound series name.
    pub fn metrics(&self) -> Vec<&str> {
        self.series().map(series::metrics).unwrap_or_default()
    }

    /// Returns the tags of the series name.
    pub fn tags(&self) -> Vec<Tag> {
        self.series().map(series::tags).unwrap_or_default()
    }

    /// Returns the aggregate functions named in the series, in value order.
    pub fn aggregate_functions(&self) -> Vec<AggregateFunction> {
        self.series()
            .map(series::aggregate_functions)
            .unwrap_or_default()
    }

    /// Returns the value produced by `func`, or NaN if the row has none.
    pub fn value_of(&self, func: AggregateFunction) -> f64 {
        self.aggregate_functions()
            .iter()
            .position(|f| *f == func)
            .and_then(|ix| self.values.get(ix).copied())
            .unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(series: &str, values: Vec<f64>) -> Row {
        Row {
            series: Some(series.to_string()),
            timestamp: Some(1_500_000_000_000_000_000),
            values,
        }
    }

    #[test]
    fn test_scalar_row() {
        let r = row("cpu.load host=a", vec![0.5]);
        assert_eq!(r.value(), 0.5);
        assert_eq!(r.metric(), Some("cpu.load"));
        assert_eq!(r.tags(), vec![Tag::new("host", "a")]);
        assert_eq!(
            r.time().map(|t| t.timestamp()),
            Some(1_500_000_000)
        );
    }

    #[test]
    fn test_group_aggregate_row() {
        let r = row("mem:min|mem:max host=a", vec![1.0, 9.0]);
        assert_eq!(r.value_of(AggregateFunction::Min), 1.0);
        assert_eq!(r.value_of(AggregateFunction::Max), 9.0);
        assert!(r.value_of(AggregateFunction::Sum).is_nan());
    }

    #[test]
    fn test_empty_row() {
        let r = Row::default();
        assert!(r.value().is_nan());
        assert_eq!(r.metric(), None);
        assert!(r.metrics().is_empty());
        assert!(r.tags().is_empty());
        assert_eq!(r.time(), None);
    }
}
