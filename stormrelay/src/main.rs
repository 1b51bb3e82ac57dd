//! Stormrelay reports the built-in metrics of stream-processing tasks to metric backends.
//!
//! Every reporting cycle of a task carries a batch of raw data points. Stormrelay sanitizes their
//! names, flattens nested values into scalar metrics, derives the capacity of each component,
//! drops metrics outside of the configured allow-list, and hands the rest to a metric processor.
//!
//! # Workspace Crates
//!
//! Stormrelay is split into the following workspace crates:
//!
//!  - `stormrelay`: Main entry point and command line interface.
//!  - [`stormrelay-config`]: Static configuration for the CLI.
//!  - [`stormrelay-log`]: Logging setup and facade.
//!  - [`stormrelay-metrics`]: The reporting pipeline and the metric processor contract.
//!  - [`stormrelay-processors`]: Metric backends.
//!  - [`stormrelay-statsd`]: StatsD client for internal measurements.
//!
//! [`stormrelay-config`]: ../stormrelay_config/index.html
//! [`stormrelay-log`]: ../stormrelay_log/index.html
//! [`stormrelay-metrics`]: ../stormrelay_metrics/index.html
//! [`stormrelay-processors`]: ../stormrelay_processors/index.html
//! [`stormrelay-statsd`]: ../stormrelay_statsd/index.html

mod cli;
mod cliapp;
mod replay;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            stormrelay_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
