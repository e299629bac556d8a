//! Series name parsing.
//!
//! A series name is a metric followed by space separated `tag=value` pairs:
//!
//! ```text
//! cpu.load host=a region=eu
//! mem:max host=a              (aggregate output)
//! hdd.usage|cpu.usage host=a  (join output)
//! a:max|b:max host=a          (group-aggregate output)
//! ```

use crate::query::AggregateFunction;
use std::fmt;

/// Longest series name accepted by the write path, in bytes.
pub const MAX_SERIES_NAME_LEN: usize = 1000;

/// A `name=value` pair attached to a series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    /// Tag name.
    pub name: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Creates a new tag.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Splits a series name into its metric part and its tag part.
fn split_head(series: &str) -> (&str, &str) {
    let series = series.trim_start();
    match series.find(' ') {
        Some(ix) => (&series[..ix], &series[ix + 1..]),
        None => (series, ""),
    }
}

/// Splits `metric:func` into the metric and the recognised function.
fn split_function(item: &str) -> (&str, Option<AggregateFunction>) {
    match item.rfind(':') {
        Some(ix) => match item[ix + 1..].parse() {
            Ok(func) => (&item[..ix], Some(func)),
            Err(_) => (item, None),
        },
        None => (item, None),
    }
}

/// Returns the first metric of a series name, without any aggregate suffix.
pub fn metric(series: &str) -> &str {
    let (head, _) = split_head(series);
    let first = head.split('|').next().unwrap_or_default();
    split_function(first).0
}

/// Returns every metric of a compound series name, in slot order.
pub fn metrics(series: &str) -> Vec<&str> {
    let (head, _) = split_head(series);
    if head.is_empty() {
        return Vec::new();
    }
    head.split('|').map(|item| split_function(item).0).collect()
}

/// Returns the aggregate functions named in a series, in slot order.
pub fn aggregate_functions(series: &str) -> Vec<AggregateFunction> {
    let (head, _) = split_head(series);
    head.split('|')
        .filter_map(|item| split_function(item).1)
        .collect()
}

/// Returns the tags of a series name. Tokens without `=` are skipped.
pub fn tags(series: &str) -> Vec<Tag> {
    let (_, rest) = split_head(series);
    rest.split_whitespace()
        .filter_map(|token| token.split_once('='))
        .map(|(name, value)| Tag::new(name, value))
        .collect()
}

/// Normalises a series name to `metric tag=value...` with tags sorted by name.
///
/// Returns `None` if the name has no metric, no tags, or a malformed tag.
pub fn normalize(series: &str) -> Option<String> {
    let mut tokens = series.split_whitespace();
    let metric = tokens.next()?;
    let mut pairs = Vec::new();
    for token in tokens {
        let (name, value) = token.split_once('=')?;
        if name.is_empty() || value.is_empty() {
            return None;
        }
        pairs.push(Tag::new(name, value));
    }
    if pairs.is_empty() {
        return None;
    }
    pairs.sort();
    pairs.dedup_by(|a, b| a.name == b.name);

    let mut out = String::with_capacity(series.len());
    out.push_str(metric);
    for tag in &pairs {
        out.push(' ');
        out.push_str(&tag.to_string());
    }
    Some(out)
}
