use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ArgMatches;
use stormrelay_config::{Config, OverridableConfig};
use stormrelay_metrics::{GaugeRegistry, ReportingPipeline};

use crate::cliapp::make_app;
use crate::{replay, setup};

/// Config folder used when `--config` is not passed.
const DEFAULT_CONFIG_PATH: &str = ".stormrelay";

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();
    let config_path = matches
        .get_one::<PathBuf>("config")
        .map_or(Path::new(DEFAULT_CONFIG_PATH), PathBuf::as_path);

    match matches.subcommand() {
        Some(("config", matches)) => manage_config(config_path, matches),
        Some(("run", matches)) => {
            let mut config = Config::from_path(config_path)?;
            config.apply_override(extract_config_args(matches))?;
            run(config, matches)
        }
        _ => unreachable!(),
    }
}

/// Extracts config overrides from command line arguments and their environment variables.
pub fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    OverridableConfig {
        topology: matches.get_one("topology").cloned(),
        allowed_metrics: matches.get_one("allowed_metrics").cloned(),
        processor: matches.get_one("processor").cloned(),
        log_level: matches.get_one("log_level").cloned(),
    }
}

pub fn manage_config(config_path: &Path, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("init", _)) => init_config(config_path),
        Some(("show", matches)) => {
            let config = Config::from_path(config_path)?;
            let format = matches
                .get_one::<String>("format")
                .map_or("yaml", String::as_str);
            setup::dump_config(&config, format)
        }
        _ => unreachable!(),
    }
}

#[allow(clippy::print_stdout)]
pub fn init_config(config_path: &Path) -> Result<()> {
    if Config::config_exists(config_path) {
        println!("A config exists already in {}", config_path.display());
        return Ok(());
    }

    let config = Config::with_defaults(config_path);
    config.save()?;
    println!("Written config to {}", config.path().display());
    Ok(())
}

pub fn run(config: Config, matches: &ArgMatches) -> Result<()> {
    setup::init_logging(&config);
    setup::dump_spawn_infos(&config);
    setup::init_metrics(&config)?;

    let gauges = Arc::new(GaugeRegistry::new());
    let registry = stormrelay_processors::builtin_registry();
    let pipeline = ReportingPipeline::from_config(config.reporter(), &registry, &gauges)
        .context("failed to set up the reporting pipeline")?;

    let summary = match matches.get_one::<PathBuf>("input") {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open input file {}", path.display()))?;
            replay::replay(BufReader::new(file), &pipeline)
        }
        None => replay::replay(io::stdin().lock(), &pipeline),
    }
    .context("failed to read reporting cycles")?;

    stormrelay_log::info!(
        cycles = summary.cycles,
        skipped = summary.skipped,
        "input exhausted, shutting down"
    );

    // Stops background reporters before the final dump.
    drop(pipeline);

    if matches.get_flag("dump") {
        setup::dump_gauges(&gauges)?;
    }

    Ok(())
}
