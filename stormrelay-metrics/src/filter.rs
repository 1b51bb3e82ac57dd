use std::fmt;

use regex::Regex;

use crate::protocol::MetricValue;

/// An error returned when an allow-list expression cannot be compiled.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// The expression is not a valid regular expression.
    #[error("invalid allow-list expression {pattern:?}")]
    Invalid {
        /// The expression as configured.
        pattern: String,
        /// The parser error.
        #[source]
        source: regex::Error,
    },
}

/// An allow-list of metric names.
///
/// The expression must match the entire dotted metric name, `component.operation`. A match of a
/// substring is not sufficient.
///
/// # Example
///
/// ```
/// use stormrelay_metrics::{MetricFilter, MetricValue};
///
/// let filter = MetricFilter::new(r"foo\..*").unwrap();
/// assert!(filter.matches(&MetricValue::new("foo", "bar", 1.0)));
/// assert!(!filter.matches(&MetricValue::new("xfoo", "bar", 1.0)));
/// ```
#[derive(Clone)]
pub struct MetricFilter {
    pattern: String,
    regex: Regex,
}

impl MetricFilter {
    /// Compiles an allow-list expression.
    pub fn new(pattern: &str) -> Result<Self, FilterError> {
        let invalid = |source| FilterError::Invalid {
            pattern: pattern.to_owned(),
            source,
        };

        // The raw expression must be valid on its own, not only once wrapped into a group.
        Regex::new(pattern).map_err(invalid)?;
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(invalid)?;

        Ok(Self {
            pattern: pattern.to_owned(),
            regex,
        })
    }

    /// Returns the allow-list expression as configured.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns `true` if the full name of `metric` is allowed.
    pub fn matches(&self, metric: &MetricValue) -> bool {
        self.matches_name(&metric.name())
    }

    /// Returns `true` if the entire `name` is allowed.
    pub fn matches_name(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl fmt::Debug for MetricFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MetricFilter").field(&self.pattern).finish()
    }
}
