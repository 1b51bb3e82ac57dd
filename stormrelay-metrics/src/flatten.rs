use crate::name::{clean, join_fragments};
use crate::protocol::{DataValue, MetricValue, RawDataPoint};

/// Expands a raw data point into metric values of the given component.
///
/// A numeric data point yields a single metric named after the sanitized data point name. Nested
/// mappings are expanded recursively, joining the keys on the path to each numeric leaf into a
/// dotted operation name. Values that are neither numbers nor mappings are skipped.
///
/// The output follows the traversal order of the input mappings.
///
/// # Example
///
/// ```
/// use stormrelay_metrics::{flatten, DataValue, RawDataPoint};
///
/// let value: DataValue = serde_json::from_str(r#"{"default": 12, "__ack": 3}"#).unwrap();
/// let metrics = flatten(&RawDataPoint::new("emit-count", value), "spout");
///
/// let names: Vec<_> = metrics.iter().map(|m| m.name()).collect();
/// assert_eq!(names, ["spout.emit-count.default", "spout.emit-count.ack"]);
/// ```
pub fn flatten(data_point: &RawDataPoint, component: &str) -> Vec<MetricValue> {
    let mut metrics = Vec::new();
    flatten_into(&data_point.name, &data_point.value, component, &mut metrics);
    metrics
}

// No depth guard: the host serializes metric payloads from acyclic values.
fn flatten_into(name: &str, value: &DataValue, component: &str, metrics: &mut Vec<MetricValue>) {
    match value {
        DataValue::Number(number) => {
            metrics.push(MetricValue::new(component, clean(name), *number));
        }
        DataValue::Map(map) => {
            let prefix = clean(name);
            for (key, sub_value) in map {
                match sub_value {
                    DataValue::Number(number) => {
                        let operation = join_fragments([prefix.as_str(), clean(key).as_str()]);
                        metrics.push(MetricValue::new(component, operation, *number));
                    }
                    // Sub-names are joined raw, the leaf sanitizes the full path.
                    DataValue::Map(_) => {
                        let nested_name = join_fragments([name, key.as_str()]);
                        flatten_into(&nested_name, sub_value, component, metrics);
                    }
                    DataValue::Other(_) => (),
                }
            }
        }
        DataValue::Other(_) => (),
    }
}
