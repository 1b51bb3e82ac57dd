use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stormrelay_log::{Level, LogConfig};
use stormrelay_metrics::{MetricFilter, ReporterConfig};

type BoxedError = Box<dyn Error + Send + Sync + 'static>;

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    inner: Option<BoxedError>,
}

impl ConfigError {
    #[inline]
    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: Into<BoxedError>,
    {
        Self {
            source: ConfigErrorSource::None,
            kind,
            inner: Some(inner.into()),
        }
    }

    #[inline]
    fn for_field<E>(inner: E, field: &'static str) -> Self
    where
        E: Into<BoxedError>,
    {
        Self::wrap(inner, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file<P: AsRef<Path>>(mut self, p: P) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::FieldOverride(name.to_owned());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigErrorSource::None => self.kind.fmt(f),
            ConfigErrorSource::File(file_name) => {
                write!(f, "{} (file {})", self.kind, file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, "{} (field {})", self.kind, name),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner
            .as_deref()
            .map(|error| error as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to save a file.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

enum ConfigFormat {
    Yaml,
}

impl ConfigFormat {
    fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yml",
        }
    }
}

trait ConfigObject: DeserializeOwned + Serialize {
    /// The format in which to serialize this configuration.
    fn format() -> ConfigFormat;

    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the config file, including the file extension.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.{}", Self::name(), Self::format().extension()))
    }

    /// Loads the config file from a file within the given directory location.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        match Self::format() {
            ConfigFormat::Yaml => serde_yaml::from_reader(io::BufReader::new(f))
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path)),
        }
    }

    /// Writes the configuration object to the given writer.
    fn write<W: Write>(&self, writer: &mut W) -> Result<(), ConfigError> {
        match Self::format() {
            ConfigFormat::Yaml => serde_yaml::to_writer(writer, self)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile)),
        }
    }

    /// Writes the configuration to a file within the given directory location.
    fn save(&self, base: &Path) -> Result<(), ConfigError> {
        let path = Self::path(base);
        let mut options = fs::OpenOptions::new();
        options.write(true).truncate(true).create(true);

        // Remove all non-user permissions for the newly created file
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut f = options
            .open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(&path))?;

        self.write(&mut f).map_err(|e| e.file(&path))?;
        f.write_all(b"\n").ok();

        Ok(())
    }
}

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The topology whose metrics are reported.
    pub topology: Option<String>,
    /// Regular expression for metric names to report.
    pub allowed_metrics: Option<String>,
    /// Identifier of the metric processor.
    pub processor: Option<String>,
    /// The log level.
    pub log_level: Option<String>,
}

/// Controls the self-instrumentation of the relay.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Metrics {
    /// Hostname and port of the statsd server.
    ///
    /// Defaults to `None`, which disables self-instrumentation.
    statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    ///
    /// Defaults to `"stormrelay"`.
    prefix: String,
    /// Default tags to apply to all metrics.
    default_tags: BTreeMap<String, String>,
    /// Tag name to report the hostname to for each metric. Defaults to not sending such a tag.
    hostname_tag: Option<String>,
    /// Size of the buffer used to batch metrics before sending them.
    buffer_size: Option<usize>,
    /// Global sample rate for all emitted metrics between `0.0` and `1.0`.
    ///
    /// Defaults to `1.0` (100%).
    sample_rate: f32,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: "stormrelay".into(),
            default_tags: BTreeMap::new(),
            hostname_tag: None,
            buffer_size: None,
            sample_rate: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ConfigValues {
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    metrics: Metrics,
    #[serde(default)]
    reporter: ReporterConfig,
}

impl ConfigObject for ConfigValues {
    fn format() -> ConfigFormat {
        ConfigFormat::Yaml
    }

    fn name() -> &'static str {
        "config"
    }
}

/// Config struct.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = absolute_path(path.as_ref());

        Ok(Config {
            values: ConfigValues::load(&path)?,
            path,
        })
    }

    /// Creates a config with default values for the given config folder.
    ///
    /// Nothing is written until [`save`](Self::save) is called.
    pub fn with_defaults<P: AsRef<Path>>(path: P) -> Config {
        Config {
            values: ConfigValues::default(),
            path: absolute_path(path.as_ref()),
        }
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        })
    }

    /// Checks if the config folder contains a config file.
    pub fn config_exists<P: AsRef<Path>>(path: P) -> bool {
        fs::metadata(ConfigValues::path(path.as_ref())).is_ok()
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters)
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let reporter = &mut self.values.reporter;

        if let Some(topology) = overrides.topology {
            if topology.is_empty() {
                return Err(ConfigError::for_field("topology must not be empty", "topology"));
            }
            reporter.topology = topology;
        }

        if let Some(allowed_metrics) = overrides.allowed_metrics {
            MetricFilter::new(&allowed_metrics)
                .map_err(|err| ConfigError::for_field(err, "allowed_metrics"))?;
            reporter.allowed_metrics = allowed_metrics;
        }

        if let Some(processor) = overrides.processor {
            if processor.is_empty() {
                return Err(ConfigError::for_field(
                    "processor must not be empty",
                    "processor",
                ));
            }
            reporter.processor = processor;
        }

        if let Some(log_level) = overrides.log_level {
            self.values.logging.level = log_level
                .parse::<Level>()
                .map_err(|err| ConfigError::for_field(err, "log_level"))?;
        }

        Ok(self)
    }

    /// Writes the config to the config folder.
    pub fn save(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.path).map_err(|e| {
            ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(&self.path)
        })?;
        self.values.save(&self.path)
    }

    /// Returns the filename of the config file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dumps out a YAML string of the values.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the configuration of the reporting pipeline.
    pub fn reporter(&self) -> &ReporterConfig {
        &self.values.reporter
    }

    /// Returns the socket addresses for statsd.
    ///
    /// If stats is disabled, `None` is returned.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Returns the prefix that should be added to all metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags for statsd metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the name of the hostname tag that should be attached to each outgoing metric.
    pub fn metrics_hostname_tag(&self) -> Option<&str> {
        self.values.metrics.hostname_tag.as_deref()
    }

    /// Returns the size of the buffer used to batch statsd metrics.
    pub fn statsd_buffer_size(&self) -> Option<usize> {
        self.values.metrics.buffer_size
    }

    /// Returns the global sample rate for all metrics.
    pub fn metrics_sample_rate(&self) -> f32 {
        self.values.metrics.sample_rate
    }
}

fn absolute_path(path: &Path) -> PathBuf {
    env::current_dir()
        .map(|x| x.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
