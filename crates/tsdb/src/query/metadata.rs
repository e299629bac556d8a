//! Metadata query: series names known to the engine.

use super::{Clauses, Query};
use crate::error::{Result, TsdbError};
use serde_json::{json, Map, Value};

/// Prefix of the metadata select target.
pub const META_NAMES: &str = "meta:names";

/// Query listing series names, optionally restricted to one metric and a tag filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataQuery {
    metric: Option<String>,
    clauses: Clauses,
}

impl MetadataQuery {
    /// Lists every series.
    pub fn all() -> Self {
        Self::default()
    }

    /// Lists the series of `metric`.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::InvalidQuery` if the metric is blank.
    pub fn metric(metric: &str) -> Result<Self> {
        if metric.trim().is_empty() {
            return Err(TsdbError::InvalidQuery("metric must not be blank".to_string()));
        }
        Ok(Self {
            metric: Some(metric.to_string()),
            clauses: Clauses::default(),
        })
    }

    /// Lists the series of `metric` whose `tag` has one of `values`.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::InvalidQuery` if any argument is blank or empty.
    pub fn metric_with_tag(metric: &str, tag: &str, values: &[&str]) -> Result<Self> {
        let mut query = Self::metric(metric)?;
        if tag.trim().is_empty() {
            return Err(TsdbError::InvalidQuery("tag must not be blank".to_string()));
        }
        if values.is_empty() {
            return Err(TsdbError::InvalidQuery("tag values are required".to_string()));
        }
        query.clauses.set_where(tag, values);
        Ok(query)
    }
}

impl Query for MetadataQuery {
    fn to_json(&self) -> Value {
        let target = match &self.metric {
            Some(metric) => format!("{}:{}", META_NAMES, metric),
            None => META_NAMES.to_string(),
        };
        let mut root = Map::new();
        root.insert("select".to_string(), json!(target));
        self.clauses.write_where(&mut root);
        Value::Object(root)
    }
}
