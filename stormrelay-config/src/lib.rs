//! Configuration for the stormrelay CLI.
//!
//! The configuration is stored in a `config.yml` file within a config folder. All sections are
//! optional and fall back to their defaults:
//!
//! ```yaml
//! logging:
//!   level: info
//! metrics:
//!   statsd: 127.0.0.1:8125
//! reporter:
//!   topology: words
//!   allowed_metrics: "counter\\..*"
//!   processor: graphite
//!   options:
//!     metric.reporter.graphite.report.host: graphite.internal
//! ```
#![warn(missing_docs)]

mod config;

pub use self::config::*;
