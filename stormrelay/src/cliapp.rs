//! This module implements the definition of the command line app.

use std::path::PathBuf;

use clap::{Arg, ArgAction, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Reports metrics of stream-processing tasks to metric backends.";

pub fn make_app() -> Command {
    Command::new("stormrelay")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("run")
                .about("Run the reporting pipeline")
                .after_help(
                    "This reads reporting cycles as newline-delimited JSON and reports their \
                     metrics to the configured processor.  Cycles are read from standard \
                     input unless an input file is given.  Malformed lines are logged and \
                     skipped.",
                )
                .arg(
                    Arg::new("input")
                        .long("input")
                        .short('i')
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .help("Read reporting cycles from this file instead of stdin."),
                )
                .arg(
                    Arg::new("dump")
                        .long("dump")
                        .action(ArgAction::SetTrue)
                        .help("Print all registered gauges as JSON when the input ends."),
                )
                .arg(
                    Arg::new("topology")
                        .long("topology")
                        .value_name("NAME")
                        .env("STORMRELAY_TOPOLOGY")
                        .help("The topology whose metrics are reported."),
                )
                .arg(
                    Arg::new("allowed_metrics")
                        .long("allowed-metrics")
                        .value_name("REGEX")
                        .env("STORMRELAY_ALLOWED_METRICS")
                        .help("Regular expression for the full names of reported metrics."),
                )
                .arg(
                    Arg::new("processor")
                        .long("processor")
                        .value_name("NAME")
                        .env("STORMRELAY_PROCESSOR")
                        .help("The metric processor, one of simple, jmx, graphite or statsd."),
                )
                .arg(
                    Arg::new("log_level")
                        .long("log-level")
                        .value_name("LEVEL")
                        .env("STORMRELAY_LOG_LEVEL")
                        .help("The log level, overriding the config file."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the stormrelay config")
                .after_help(
                    "This command creates a config folder with a default config file \
                     and prints the config that stormrelay would use.",
                )
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("init")
                        .about("Initialize a new config")
                        .after_help(
                            "This writes a config file with default values into the \
                             config folder, unless one exists already.",
                        ),
                )
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config, including defaults \
                             for values missing in the config file.  The debug \
                             format shows how stormrelay interprets each value.",
                        )
                        .arg(
                            Arg::new("format")
                                .short('f')
                                .long("format")
                                .value_parser(["debug", "yaml"])
                                .default_value("yaml")
                                .help("The output format"),
                        ),
                ),
        )
}
