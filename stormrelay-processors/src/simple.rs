use std::sync::Arc;

use stormrelay_metrics::{
    BuildError, GaugeRegistry, MetricProcessor, MetricValue, ProcessError, ProcessorContext,
    TaskContext, join_fragments,
};
use stormrelay_statsd::metric;

use crate::statsd::ProcessorGauges;

/// Returns the hierarchical identifier of a metric reported by a task.
///
/// The identifier follows the hierarchy `host.port.component.task.operation`. Aggregation across
/// tasks is left to the backend.
///
/// # Example
///
/// ```
/// use stormrelay_metrics::{MetricValue, TaskContext};
///
/// let task = TaskContext {
///     source_component_id: "splitter".to_owned(),
///     source_worker_host: "worker-1".to_owned(),
///     source_worker_port: 6700,
///     source_task_id: 3,
///     timestamp: 0,
///     update_interval_secs: 60,
/// };
///
/// let metric = MetricValue::new("splitter", "execute-count.default", 10.0);
/// assert_eq!(
///     stormrelay_processors::task_metric_name(&metric, &task),
///     "worker-1.6700.splitter.3.execute-count.default",
/// );
/// ```
pub fn task_metric_name(metric: &MetricValue, task: &TaskContext) -> String {
    join_fragments([
        task.source_worker_host.as_str(),
        task.source_worker_port.to_string().as_str(),
        metric.component(),
        task.source_task_id.to_string().as_str(),
        metric.operation(),
    ])
}

/// Stores every metric as a gauge in the shared [`GaugeRegistry`].
///
/// Gauges are named with [`task_metric_name`]. The registry can be inspected or exported by other
/// parts of the relay.
#[derive(Debug)]
pub struct SimpleProcessor {
    gauges: Arc<GaugeRegistry>,
}

impl SimpleProcessor {
    /// Creates a processor that writes to `gauges`.
    pub fn new(gauges: Arc<GaugeRegistry>) -> Self {
        Self { gauges }
    }

    /// Creates a boxed processor from configuration.
    pub fn create(context: &ProcessorContext<'_>) -> Result<Box<dyn MetricProcessor>, BuildError> {
        Ok(Box::new(Self::new(Arc::clone(context.gauges))))
    }
}

impl MetricProcessor for SimpleProcessor {
    fn name(&self, metric: &MetricValue, task: &TaskContext) -> String {
        task_metric_name(metric, task)
    }

    fn process(&self, metric: &MetricValue, task: &TaskContext) -> Result<(), ProcessError> {
        set_gauge(&self.gauges, &self.name(metric, task), metric.value());
        Ok(())
    }
}

/// Sets a gauge in the registry and reports the registry size.
pub(crate) fn set_gauge(gauges: &GaugeRegistry, name: &str, value: f64) {
    gauges.set(name, value);
    metric!(gauge(ProcessorGauges::RegisteredGauges) = gauges.len() as u64);
}
