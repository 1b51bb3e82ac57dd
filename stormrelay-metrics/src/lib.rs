//! Metric reshaping and dispatch for stream-processing topologies.
//!
//! Processing components of a topology periodically emit raw data points: execution counts,
//! latencies, queue statistics, or custom values. Data point values are either numbers or
//! arbitrarily nested mappings. This crate turns the data points of one reporting cycle into a flat
//! list of [`MetricValue`]s and forwards them to a [`MetricProcessor`].
//!
//! # Pipeline
//!
//! The [`ReportingPipeline`] handles one reporting cycle of a task at a time:
//!
//!  1. The name of the reporting component is sanitized with [`clean`].
//!  2. Every data point is [flattened](flatten) into metric values with dotted operation names.
//!  3. A capacity metric is [derived](compute_capacity_metrics) from pairs of execution count and
//!     execution latency.
//!  4. Metrics that do not match the allow-list of the [`MetricFilter`] are dropped.
//!  5. The remaining metrics are passed to the processor one by one.
//!
//! ```
//! use std::sync::Arc;
//!
//! use stormrelay_metrics::{
//!     GaugeRegistry, MetricFilter, MetricProcessor, MetricValue, ProcessError, RawDataPoint,
//!     ReportingPipeline, TaskContext,
//! };
//!
//! struct Print;
//!
//! impl MetricProcessor for Print {
//!     fn name(&self, metric: &MetricValue, task: &TaskContext) -> String {
//!         format!("{}.{}", task.source_task_id, metric.name())
//!     }
//!
//!     fn process(&self, metric: &MetricValue, task: &TaskContext) -> Result<(), ProcessError> {
//!         stormrelay_log::info!("{} = {}", self.name(metric, task), metric.value());
//!         Ok(())
//!     }
//! }
//!
//! let pipeline = ReportingPipeline::new(MetricFilter::new(".*").unwrap(), Box::new(Print));
//!
//! let task = TaskContext {
//!     source_component_id: "splitter".to_owned(),
//!     source_worker_host: "worker-1".to_owned(),
//!     source_worker_port: 6700,
//!     source_task_id: 3,
//!     timestamp: 1_700_000_000_000,
//!     update_interval_secs: 60,
//! };
//!
//! pipeline.handle_cycle(&[RawDataPoint::new("__receive/population", 4.0)], &task);
//! ```
//!
//! # Processors
//!
//! Processors are registered in a [`ProcessorRegistry`] under an identifier and constructed once
//! at startup from the [`ReporterConfig`]. Processors that expose metric values for introspection
//! share a [`GaugeRegistry`] that is owned by the caller.
//!
//! # Publishing metrics
//!
//! Components that keep their own counters, meters, histograms, and timers register them with a
//! [`MetricsFacade`]. The facade publishes all of them as a single data point with a nested
//! value, which the pipeline flattens into one metric per statistic.
#![warn(missing_docs)]

mod capacity;
mod config;
mod facade;
mod filter;
mod flatten;
mod gauge;
mod name;
mod pipeline;
mod processor;
mod protocol;
mod statsd;

pub use capacity::*;
pub use config::*;
pub use facade::*;
pub use filter::*;
pub use flatten::*;
pub use gauge::*;
pub use name::*;
pub use pipeline::*;
pub use processor::*;
pub use protocol::*;
