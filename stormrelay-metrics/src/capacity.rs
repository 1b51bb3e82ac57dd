use indexmap::IndexMap;

use crate::name::join_fragments;
use crate::protocol::MetricValue;

/// Operation prefix of execution counts.
pub const EXECUTE_COUNT: &str = "execute-count";

/// Operation prefix of average execution latencies, in milliseconds.
pub const EXECUTE_LATENCY: &str = "execute-latency";

/// Operation prefix of derived capacity metrics.
pub const EXECUTE_CAPACITY: &str = "execute-capacity";

/// Metrics of one reporting cycle, grouped by sanitized component name.
///
/// Groups keep the order in which components were first seen.
pub type ComponentMetrics = IndexMap<String, Vec<MetricValue>>;

/// Derives capacity metrics for every component in `grouped`.
///
/// Capacity is the share of the reporting window a component spent executing:
///
/// ```text
/// capacity = count * latency / (window_secs * 1000)
/// ```
///
/// For each component, the first metric whose name contains [`EXECUTE_COUNT`] is paired with the
/// first metric whose name contains [`EXECUTE_LATENCY`]. A capacity metric is only emitted if
/// both exist and refer to the same operation suffix, since a component may run several
/// operations with a count and latency each.
///
/// A window of zero is not rejected and yields an infinite or NaN capacity.
///
/// # Example
///
/// ```
/// use stormrelay_metrics::{compute_capacity_metrics, ComponentMetrics, MetricValue};
///
/// let mut grouped = ComponentMetrics::new();
/// grouped.insert("bolt".to_owned(), vec![
///     MetricValue::new("bolt", "execute-count.default", 100.0),
///     MetricValue::new("bolt", "execute-latency.default", 5.0),
/// ]);
///
/// let capacity = compute_capacity_metrics(&grouped, 10);
/// assert_eq!(capacity, [MetricValue::new("bolt", "execute-capacity.default", 0.05)]);
/// ```
pub fn compute_capacity_metrics(grouped: &ComponentMetrics, window_secs: u32) -> Vec<MetricValue> {
    grouped
        .iter()
        .filter_map(|(component, metrics)| capacity_metric(component, metrics, window_secs))
        .collect()
}

fn capacity_metric(component: &str, metrics: &[MetricValue], window_secs: u32) -> Option<MetricValue> {
    let count = find_first(metrics, EXECUTE_COUNT)?;
    let latency = find_first(metrics, EXECUTE_LATENCY)?;

    let suffix = count.operation_after(EXECUTE_COUNT);
    let latency_suffix = latency.operation_after(EXECUTE_LATENCY);
    if suffix != latency_suffix {
        stormrelay_log::trace!(
            component,
            count = suffix,
            latency = latency_suffix,
            "skipping capacity for unpaired operations",
        );
        return None;
    }

    let capacity = count.value() * latency.value() / (f64::from(window_secs) * 1000.0);
    let operation = join_fragments([EXECUTE_CAPACITY, suffix]);
    Some(MetricValue::new(component, operation, capacity))
}

fn find_first<'a>(metrics: &'a [MetricValue], literal: &str) -> Option<&'a MetricValue> {
    metrics.iter().find(|metric| metric.name().contains(literal))
}
