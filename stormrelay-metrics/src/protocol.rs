use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::name::join_fragments;

/// A single metric value reported for an operation of a component.
///
/// Both the component and the operation are sanitized names, see [`clean`](crate::clean). A
/// metric value is immutable once constructed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    component: String,
    operation: String,
    value: f64,
}

impl MetricValue {
    /// Creates a new metric value.
    pub fn new(component: impl Into<String>, operation: impl Into<String>, value: f64) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            value,
        }
    }

    /// The component that produced this metric.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// The operation within the component, possibly consisting of multiple dotted fragments.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The numeric value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The full dotted metric name, `component.operation`.
    pub fn name(&self) -> String {
        join_fragments([self.component.as_str(), self.operation.as_str()])
    }

    /// Returns the part of the operation after `literal` and the character following it.
    ///
    /// If `literal` does not occur in the operation, the operation is returned unchanged. If
    /// `literal` ends the operation, the result is empty.
    ///
    /// # Example
    ///
    /// ```
    /// use stormrelay_metrics::MetricValue;
    ///
    /// let metric = MetricValue::new("bolt", "execute-count.default", 42.0);
    /// assert_eq!(metric.operation_after("execute-count"), "default");
    /// assert_eq!(metric.operation_after("emit-count"), "execute-count.default");
    /// ```
    pub fn operation_after(&self, literal: &str) -> &str {
        match self.operation.find(literal) {
            Some(index) => {
                let mut rest = self.operation[index + literal.len()..].chars();
                rest.next();
                rest.as_str()
            }
            None => &self.operation,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}={}", self.component, self.operation, self.value)
    }
}

/// The value of a [`RawDataPoint`] as emitted by the host framework.
///
/// Numbers and nested mappings are reported. Any other value, such as strings, booleans, or
/// `null`, is kept as [`DataValue::Other`] and skipped during flattening.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    /// A numeric value.
    Number(f64),
    /// A nested mapping of sub-names to values, in the order emitted by the host.
    Map(IndexMap<String, DataValue>),
    /// Any value without a numeric interpretation.
    Other(serde_json::Value),
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl<K: Into<String>> FromIterator<(K, DataValue)> for DataValue {
    fn from_iter<T: IntoIterator<Item = (K, DataValue)>>(iter: T) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A named raw data point, as emitted by a processing component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDataPoint {
    /// The raw, unsanitized name of the data point.
    pub name: String,
    /// A scalar or an arbitrarily nested mapping.
    pub value: DataValue,
}

impl RawDataPoint {
    /// Creates a new data point.
    pub fn new(name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Information about the task that reports a batch of data points.
///
/// Metrics are emitted per task. Processors must include the worker host, worker port, and task
/// id in the identifiers they generate, otherwise tasks of the same component overwrite each
/// other's values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    /// The raw id of the component that runs the task.
    pub source_component_id: String,
    /// Host name of the worker process.
    pub source_worker_host: String,
    /// Port of the worker process.
    pub source_worker_port: u16,
    /// The task id. System tasks use negative ids.
    pub source_task_id: i32,
    /// Timestamp of the reporting cycle, in milliseconds since the UNIX epoch.
    pub timestamp: i64,
    /// Length of the reporting cycle in seconds.
    ///
    /// Must be at least `1`. This is the time window used to derive capacity metrics.
    pub update_interval_secs: u32,
}

/// One reporting cycle of a task, as read from newline-delimited JSON input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportingCycle {
    /// The reporting task.
    pub task: TaskContext,
    /// The data points of this cycle.
    #[serde(default)]
    pub data_points: Vec<RawDataPoint>,
}
