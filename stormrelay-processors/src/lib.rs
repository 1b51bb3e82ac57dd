//! Metric backends for the stormrelay reporting pipeline.
//!
//! Every processor in this crate includes the worker host, worker port, and task id in the
//! identifiers it generates, so tasks of the same component never overwrite each other's values.
//! The processors are registered by [`builtin_registry`]:
//!
//! | Identifier | Processor             | Backend                                                |
//! |------------|-----------------------|--------------------------------------------------------|
//! | `simple`   | [`SimpleProcessor`]   | Shared gauge registry, hierarchical names.             |
//! | `jmx`      | [`JmxProcessor`]      | Shared gauge registry, JMX-style object names.         |
//! | `graphite` | [`GraphiteProcessor`] | Shared gauge registry, periodically sent to Graphite.  |
//! | `statsd`   | [`StatsdProcessor`]   | StatsD gauges, sent immediately.                       |
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use stormrelay_metrics::{GaugeRegistry, ReporterConfig, ReportingPipeline};
//!
//! let gauges = Arc::new(GaugeRegistry::new());
//! let registry = stormrelay_processors::builtin_registry();
//!
//! let config = ReporterConfig {
//!     processor: "jmx".to_owned(),
//!     ..Default::default()
//! };
//!
//! let pipeline = ReportingPipeline::from_config(&config, &registry, &gauges).unwrap();
//! ```
#![warn(missing_docs)]

mod graphite;
mod jmx;
mod simple;
mod statsd;
mod statsd_backend;

#[cfg(test)]
mod testutils;

use stormrelay_metrics::ProcessorRegistry;

pub use self::graphite::*;
pub use self::jmx::*;
pub use self::simple::{SimpleProcessor, task_metric_name};
pub use self::statsd_backend::*;

/// Returns a registry with all processors of this crate.
pub fn builtin_registry() -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    registry
        .register("simple", SimpleProcessor::create)
        .register("jmx", JmxProcessor::create)
        .register("graphite", GraphiteProcessor::create)
        .register("statsd", StatsdProcessor::create);
    registry
}
