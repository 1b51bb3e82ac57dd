use anyhow::Result;
use stormrelay_config::Config;
use stormrelay_metrics::GaugeRegistry;
use stormrelay_statsd::StatsdConfig;

/// Initialize the logging system.
pub fn init_logging(config: &Config) {
    stormrelay_log::init(config.logging());
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        stormrelay_log::info!("launching stormrelay without config folder");
    } else {
        stormrelay_log::info!(
            "launching stormrelay from config folder {}",
            config.path().display()
        );
    }

    let reporter = config.reporter();
    stormrelay_log::info!("  topology: {}", reporter.topology);
    stormrelay_log::info!("  processor: {}", reporter.processor);
    stormrelay_log::info!("  allowed metrics: {}", reporter.allowed_metrics);
    stormrelay_log::info!("  log level: {}", config.logging().level);
}

/// Prints the config in the given format, either `yaml` or `debug`.
#[allow(clippy::print_stdout)]
pub fn dump_config(config: &Config, format: &str) -> Result<()> {
    match format {
        "debug" => println!("{config:#?}"),
        _ => print!("{}", config.to_yaml_string()?),
    }
    Ok(())
}

/// Prints a snapshot of all registered gauges as JSON.
#[allow(clippy::print_stdout)]
pub fn dump_gauges(gauges: &GaugeRegistry) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&gauges.snapshot())?);
    Ok(())
}

/// Initialize the metric system.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(host) = config.statsd_addr() else {
        return Ok(());
    };

    let mut default_tags = config.metrics_default_tags().clone();
    if let Some(hostname_tag) = config.metrics_hostname_tag()
        && let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok())
    {
        default_tags.insert(hostname_tag.to_owned(), hostname);
    }
    stormrelay_statsd::init(StatsdConfig {
        prefix: config.metrics_prefix().to_owned(),
        host: host.to_owned(),
        buffer_size: config.statsd_buffer_size(),
        default_tags,
        sample_rate: config.metrics_sample_rate().into(),
    })?;

    Ok(())
}
