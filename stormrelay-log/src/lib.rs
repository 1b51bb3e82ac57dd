//! Logging for stormrelay, built on [`tracing`].
//!
//! Call [`init`] once at startup. [`LogConfig`] deserializes from the `logging` section of the
//! config file:
//!
//! ```
//! let config = stormrelay_log::LogConfig {
//!     level: stormrelay_log::Level::Debug,
//!     ..Default::default()
//! };
//!
//! stormrelay_log::init(&config);
//! stormrelay_log::debug!(processor = "jmx", "reporting pipeline ready");
//! ```
//!
//! # Conventions
//!
//! Messages start lowercase and have no trailing punctuation. Values that describe the event,
//! such as a metric name or a task id, go into structured fields rather than the message.
//!
//! - [`error!`]: a metric could not be processed or a backend is unreachable.
//! - [`warn!`]: input was malformed and has been skipped.
//! - [`info!`]: startup and shutdown of the relay and its processors.
//! - [`debug!`] and [`trace!`]: per-cycle details.
//!
//! Errors are logged as the `error` field, which prints the whole chain of sources:
//!
//! ```
//! use std::error::Error;
//!
//! let error = std::io::Error::other("connection refused");
//! stormrelay_log::error!(error = &error as &dyn Error, "failed to send gauges");
//! ```
//!
//! Where a field does not fit, [`LogError`] formats the same chain. Tests call [`init_test!`] to
//! route the output of the calling crate to the test runner, or [`with_captured_logs`] to assert
//! on the lines a closure logs.
#![warn(missing_docs)]

mod setup;
pub use setup::*;

mod test;
pub use test::*;

mod utils;
pub use utils::*;

#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};
