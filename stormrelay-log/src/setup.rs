use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

// Import CRATE_NAMES, which lists all crates in the workspace.
include!(concat!(env!("OUT_DIR"), "/constants.gen.rs"));

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  stormrelay::setup > reporting to processor simple
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2020-12-04T12:10:32Z [stormrelay::setup] INFO: reporting to processor simple
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2020-12-04T12:11:08.729716Z","level":"INFO","target":"stormrelay::setup","fields":{"message":"reporting to processor simple"}}
    /// ```
    Json,
}

/// The logging level parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelParseError(String);

impl fmt::Display for LevelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as level: expected one of "error", "warn", "info", "debug", "trace", "off""#,
            self.0
        )
    }
}

impl std::error::Error for LevelParseError {}

/// The maximum level of log messages emitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// The "error" level.
    Error,
    /// The "warn" level.
    Warn,
    /// The "info" level.
    Info,
    /// The "debug" level.
    Debug,
    /// The "trace" level.
    Trace,
    /// No logging at all.
    Off,
}

impl Level {
    /// Returns the tracing [`LevelFilter`].
    pub const fn level_filter(&self) -> LevelFilter {
        match self {
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
            Level::Off => LevelFilter::OFF,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
            Level::Off => "off",
        };
        f.write_str(name)
    }
}

impl FromStr for Level {
    type Err = LevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => Level::Error,
            s if s.eq_ignore_ascii_case("error") => Level::Error,
            s if s.eq_ignore_ascii_case("warn") => Level::Warn,
            s if s.eq_ignore_ascii_case("info") => Level::Info,
            s if s.eq_ignore_ascii_case("debug") => Level::Debug,
            s if s.eq_ignore_ascii_case("trace") => Level::Trace,
            s if s.eq_ignore_ascii_case("off") => Level::Off,
            s => return Err(LevelParseError(s.into())),
        };

        Ok(result)
    }
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for stormrelay.
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,

    /// When set to `true`, backtraces are forced on.
    ///
    /// Otherwise, backtraces can be enabled by setting the `RUST_BACKTRACE` variable to `full`.
    pub enable_backtraces: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: LogFormat::Auto,
            enable_backtraces: false,
        }
    }
}

/// Builds the default filter: third-party crates at INFO, workspace crates at `level`.
fn default_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::new("info");

    for name in CRATE_NAMES {
        if let Ok(directive) = format!("{name}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    filter
}

/// Initialize the logging system.
///
/// If the `RUST_LOG` environment variable is set, it takes precedence over the configured level.
/// Calling this function more than once has no effect.
///
/// # Example
///
/// ```
/// let log_config = stormrelay_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// stormrelay_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        // SAFETY: Logging is initialized during startup before any other threads are spawned.
        unsafe { env::set_var("RUST_BACKTRACE", "full") };
    }

    let filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => default_filter(config.level),
    };

    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let format = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => {
            format.compact().without_time().with_ansi(true).boxed()
        }
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            format.with_ansi(false).boxed()
        }
        (LogFormat::Json, _) => format
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(filter))
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_roundtrip() {
        for level in ["error", "warn", "info", "debug", "trace", "off"] {
            let parsed: Level = level.parse().unwrap();
            assert_eq!(parsed.to_string(), level);
        }
    }

    #[test]
    fn test_level_case_insensitive() {
        assert_eq!("DEBUG".parse::<Level>().unwrap(), Level::Debug);
    }

    #[test]
    fn test_level_invalid() {
        let error = "verbose".parse::<Level>().unwrap_err();
        assert!(error.to_string().starts_with(r#"error parsing "verbose" as level"#));
    }

    #[test]
    fn test_log_config_defaults() {
        let config: LogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.format, LogFormat::Auto);
        assert!(!config.enable_backtraces);
    }

    #[test]
    fn test_log_config_parse() {
        let config: LogConfig =
            serde_json::from_str(r#"{"level": "trace", "format": "json"}"#).unwrap();
        assert_eq!(config.level, Level::Trace);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level.level_filter(), LevelFilter::TRACE);
    }
}
