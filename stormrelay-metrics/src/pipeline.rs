use std::error::Error;
use std::fmt;
use std::sync::Arc;

use stormrelay_statsd::metric;

use crate::capacity::{ComponentMetrics, compute_capacity_metrics};
use crate::config::ReporterConfig;
use crate::filter::{FilterError, MetricFilter};
use crate::flatten::flatten;
use crate::gauge::GaugeRegistry;
use crate::name::clean;
use crate::processor::{BuildError, MetricProcessor, ProcessorContext, ProcessorRegistry};
use crate::protocol::{MetricValue, RawDataPoint, TaskContext};
use crate::statsd::{MetricCounters, MetricTimers};

/// An error returned when the [`ReportingPipeline`] cannot be constructed.
///
/// These errors are fatal. The task reporting metrics must not be started without a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The allow-list expression is invalid.
    #[error("invalid metric filter")]
    Filter(#[from] FilterError),
    /// The processor could not be constructed.
    #[error("failed to create metric processor")]
    Processor(#[from] BuildError),
}

/// Turns the raw data points of a reporting cycle into metrics and forwards them to a processor.
///
/// The pipeline keeps no state between cycles and can be shared between tasks that report
/// concurrently.
pub struct ReportingPipeline {
    filter: MetricFilter,
    processor: Box<dyn MetricProcessor>,
}

impl ReportingPipeline {
    /// Creates a pipeline from an allow-list and a processor.
    pub fn new(filter: MetricFilter, processor: Box<dyn MetricProcessor>) -> Self {
        Self { filter, processor }
    }

    /// Creates a pipeline from configuration.
    ///
    /// The processor is resolved from `registry` by the configured identifier. Processors that
    /// expose their values receive a handle to `gauges`.
    pub fn from_config(
        config: &ReporterConfig,
        registry: &ProcessorRegistry,
        gauges: &Arc<GaugeRegistry>,
    ) -> Result<Self, PipelineError> {
        let filter = MetricFilter::new(&config.allowed_metrics)?;

        let context = ProcessorContext {
            topology: &config.topology,
            options: &config.options,
            gauges,
        };
        let processor = registry.build(&config.processor, &context)?;

        stormrelay_log::info!(
            processor = %config.processor,
            allowed_metrics = %config.allowed_metrics,
            "created reporting pipeline",
        );

        Ok(Self::new(filter, processor))
    }

    /// Returns the allow-list of this pipeline.
    pub fn filter(&self) -> &MetricFilter {
        &self.filter
    }

    /// Computes the metrics of one reporting cycle that pass the allow-list.
    ///
    /// Flattened metrics come first in the order of the data points, followed by derived
    /// capacity metrics.
    pub fn collect_metrics(
        &self,
        data_points: &[RawDataPoint],
        task: &TaskContext,
    ) -> Vec<MetricValue> {
        let component = clean(&task.source_component_id);
        self.collect_component_metrics(&component, data_points, task)
    }

    fn collect_component_metrics(
        &self,
        component: &str,
        data_points: &[RawDataPoint],
        task: &TaskContext,
    ) -> Vec<MetricValue> {
        let mut grouped = ComponentMetrics::new();
        for data_point in data_points {
            grouped
                .entry(component.to_owned())
                .or_default()
                .extend(flatten(data_point, component));
        }

        let capacity = compute_capacity_metrics(&grouped, task.update_interval_secs);

        let flattened_count = grouped.values().map(Vec::len).sum::<usize>();
        metric!(
            counter(MetricCounters::Flattened) += flattened_count as u64,
            component = component,
        );
        metric!(
            counter(MetricCounters::CapacityDerived) += capacity.len() as u64,
            component = component,
        );

        let total = flattened_count + capacity.len();
        let metrics: Vec<_> = grouped
            .into_values()
            .flatten()
            .chain(capacity)
            .filter(|metric| self.filter.matches(metric))
            .collect();

        metric!(
            counter(MetricCounters::Filtered) += (total - metrics.len()) as u64,
            component = component,
        );

        metrics
    }

    /// Handles one reporting cycle of a task.
    ///
    /// Every metric that passes the allow-list is passed to the processor along with `task`.
    /// A metric that fails to process is logged and does not affect the remaining metrics.
    pub fn handle_cycle(&self, data_points: &[RawDataPoint], task: &TaskContext) {
        let component = clean(&task.source_component_id);

        metric!(timer(MetricTimers::CycleDuration), component = component.as_str(), {
            let metrics = self.collect_component_metrics(&component, data_points, task);

            let mut processed = 0u64;
            let mut failed = 0u64;

            for metric in &metrics {
                match self.processor.process(metric, task) {
                    Ok(()) => processed += 1,
                    Err(error) => {
                        failed += 1;
                        stormrelay_log::error!(
                            error = &error as &dyn Error,
                            metric = %metric.name(),
                            task_id = task.source_task_id,
                            "failed to process metric",
                        );
                    }
                }
            }

            stormrelay_log::trace!(
                component = %component,
                task_id = task.source_task_id,
                processed,
                failed,
                "handled reporting cycle",
            );

            metric!(
                counter(MetricCounters::Processed) += processed,
                component = component.as_str(),
            );
            metric!(
                counter(MetricCounters::ProcessingFailed) += failed,
                component = component.as_str(),
            );
        })
    }
}

impl fmt::Debug for ReportingPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportingPipeline")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}
