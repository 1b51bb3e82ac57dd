use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::gauge::GaugeRegistry;
use crate::protocol::{MetricValue, TaskContext};

/// An error returned when a single metric could not be processed.
///
/// Processing errors are never fatal. The pipeline logs them and continues with the remaining
/// metrics of the reporting cycle.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Writing to the backend failed.
    #[error("failed to write to the metrics backend")]
    Io(#[from] io::Error),
    /// The backend rejected the metric.
    #[error("metrics backend error")]
    Backend(#[source] Box<dyn Error + Send + Sync>),
}

/// An error returned when a processor cannot be constructed.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No processor is registered under the configured identifier.
    #[error("unknown metric processor {0:?}")]
    UnknownProcessor(String),
    /// A required processor option is not configured.
    #[error("missing processor option {0:?}")]
    MissingOption(&'static str),
    /// A processor option has a value that cannot be used.
    #[error("invalid processor option {key:?}: {reason}")]
    InvalidOption {
        /// The configuration key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// A resource required by the processor could not be set up.
    #[error("failed to set up metric processor")]
    Io(#[from] io::Error),
}

/// A backend that receives the metrics of every reporting cycle.
///
/// The pipeline calls [`process`](Self::process) once for every metric that passes the
/// allow-list. Implementations are shared between all tasks of a worker process, which may report
/// concurrently, and must be synchronized internally.
///
/// Metrics are emitted per task. The identifier returned by [`name`](Self::name) must include the
/// worker host, worker port, and task id. Otherwise, tasks of the same component overwrite each
/// other's values in the backend.
pub trait MetricProcessor: Send + Sync {
    /// Returns the backend-specific identifier of `metric`.
    fn name(&self, metric: &MetricValue, task: &TaskContext) -> String;

    /// Reports a single metric to the backend.
    fn process(&self, metric: &MetricValue, task: &TaskContext) -> Result<(), ProcessError>;
}

impl<P: MetricProcessor + ?Sized> MetricProcessor for Box<P> {
    fn name(&self, metric: &MetricValue, task: &TaskContext) -> String {
        (**self).name(metric, task)
    }

    fn process(&self, metric: &MetricValue, task: &TaskContext) -> Result<(), ProcessError> {
        (**self).process(metric, task)
    }
}

impl<P: MetricProcessor + ?Sized> MetricProcessor for Arc<P> {
    fn name(&self, metric: &MetricValue, task: &TaskContext) -> String {
        (**self).name(metric, task)
    }

    fn process(&self, metric: &MetricValue, task: &TaskContext) -> Result<(), ProcessError> {
        (**self).process(metric, task)
    }
}

/// Free-form options passed through to the configured processor.
///
/// The relay does not interpret these options. Host frameworks commonly pass every value as a
/// string, so numeric options are accepted both as JSON numbers and as strings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessorOptions(BTreeMap<String, serde_json::Value>);

impl ProcessorOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option, replacing a previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the raw value of an option.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Returns `true` if no options are configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an option as string.
    ///
    /// Other values are converted to their JSON representation. Returns `None` if the option is
    /// missing or `null`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(value) => Some(value.clone()),
            value => Some(value.to_string()),
        }
    }

    /// Returns an option as string, failing if it is not configured.
    pub fn require_string(&self, key: &'static str) -> Result<String, BuildError> {
        self.get_string(key).ok_or(BuildError::MissingOption(key))
    }

    /// Parses an option from its textual representation.
    ///
    /// Returns `Ok(None)` if the option is not configured.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, BuildError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(value) = self.get_string(key) else {
            return Ok(None);
        };

        value
            .trim()
            .parse()
            .map(Some)
            .map_err(|error: T::Err| BuildError::InvalidOption {
                key: key.to_owned(),
                reason: error.to_string(),
            })
    }
}

impl<K, V> FromIterator<(K, V)> for ProcessorOptions
where
    K: Into<String>,
    V: Into<serde_json::Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Everything a processor needs to be constructed.
#[derive(Clone, Copy, Debug)]
pub struct ProcessorContext<'a> {
    /// Name of the topology whose metrics are reported.
    pub topology: &'a str,
    /// Options configured for the processor.
    pub options: &'a ProcessorOptions,
    /// The gauge registry shared by all processors of this relay.
    pub gauges: &'a Arc<GaugeRegistry>,
}

/// Constructs a processor from its configuration.
pub type ProcessorFactory =
    fn(&ProcessorContext<'_>) -> Result<Box<dyn MetricProcessor>, BuildError>;

/// Maps processor identifiers to their factories.
///
/// The processor is resolved once at startup from the configured identifier.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use stormrelay_metrics::{
///     BuildError, GaugeRegistry, MetricProcessor, MetricValue, ProcessError, ProcessorContext,
///     ProcessorOptions, ProcessorRegistry, TaskContext,
/// };
///
/// struct Discard;
///
/// impl MetricProcessor for Discard {
///     fn name(&self, metric: &MetricValue, _task: &TaskContext) -> String {
///         metric.name()
///     }
///
///     fn process(&self, _metric: &MetricValue, _task: &TaskContext) -> Result<(), ProcessError> {
///         Ok(())
///     }
/// }
///
/// fn discard(_: &ProcessorContext<'_>) -> Result<Box<dyn MetricProcessor>, BuildError> {
///     Ok(Box::new(Discard))
/// }
///
/// let mut registry = ProcessorRegistry::new();
/// registry.register("discard", discard);
///
/// let context = ProcessorContext {
///     topology: "words",
///     options: &ProcessorOptions::new(),
///     gauges: &Arc::new(GaugeRegistry::new()),
/// };
///
/// assert!(registry.build("discard", &context).is_ok());
/// assert!(registry.build("missing", &context).is_err());
/// ```
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    factories: BTreeMap<String, ProcessorFactory>,
}

impl ProcessorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory, replacing any previous factory with the same identifier.
    pub fn register(&mut self, key: impl Into<String>, factory: ProcessorFactory) -> &mut Self {
        self.factories.insert(key.into(), factory);
        self
    }

    /// Iterates the registered identifiers in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Constructs the processor registered under `key`.
    pub fn build(
        &self,
        key: &str,
        context: &ProcessorContext<'_>,
    ) -> Result<Box<dyn MetricProcessor>, BuildError> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| BuildError::UnknownProcessor(key.to_owned()))?;

        factory(context)
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Named(&'static str);

    impl MetricProcessor for Named {
        fn name(&self, metric: &MetricValue, _task: &TaskContext) -> String {
            format!("{}:{}", self.0, metric.name())
        }

        fn process(&self, _metric: &MetricValue, _task: &TaskContext) -> Result<(), ProcessError> {
            Ok(())
        }
    }

    fn first(_: &ProcessorContext<'_>) -> Result<Box<dyn MetricProcessor>, BuildError> {
        Ok(Box::new(Named("first")))
    }

    fn second(_: &ProcessorContext<'_>) -> Result<Box<dyn MetricProcessor>, BuildError> {
        Ok(Box::new(Named("second")))
    }

    fn needs_host(context: &ProcessorContext<'_>) -> Result<Box<dyn MetricProcessor>, BuildError> {
        context.options.require_string("host")?;
        Ok(Box::new(Named("host")))
    }

    fn task() -> TaskContext {
        TaskContext {
            source_component_id: "bolt".to_owned(),
            source_worker_host: "localhost".to_owned(),
            source_worker_port: 6700,
            source_task_id: 1,
            timestamp: 0,
            update_interval_secs: 60,
        }
    }

    #[test]
    fn test_registry_build() {
        let mut registry = ProcessorRegistry::new();
        registry.register("first", first).register("second", second);

        let options = ProcessorOptions::new();
        let gauges = Arc::new(GaugeRegistry::new());
        let context = ProcessorContext {
            topology: "t",
            options: &options,
            gauges: &gauges,
        };

        let processor = registry.build("second", &context).unwrap();
        let metric = MetricValue::new("bolt", "op", 1.0);
        assert_eq!(processor.name(&metric, &task()), "second:bolt.op");
        assert_eq!(format!("{registry:?}"), r#"{"first", "second"}"#);
    }

    #[test]
    fn test_registry_replace() {
        let mut registry = ProcessorRegistry::new();
        registry.register("p", first).register("p", second);

        let options = ProcessorOptions::new();
        let gauges = Arc::new(GaugeRegistry::new());
        let context = ProcessorContext {
            topology: "t",
            options: &options,
            gauges: &gauges,
        };

        let processor = registry.build("p", &context).unwrap();
        let metric = MetricValue::new("bolt", "op", 1.0);
        assert_eq!(processor.name(&metric, &task()), "second:bolt.op");
    }

    #[test]
    fn test_registry_unknown() {
        let registry = ProcessorRegistry::new();
        let options = ProcessorOptions::new();
        let gauges = Arc::new(GaugeRegistry::new());
        let context = ProcessorContext {
            topology: "t",
            options: &options,
            gauges: &gauges,
        };

        let error = registry.build("org.example.Missing", &context).err().unwrap();
        assert_eq!(
            error.to_string(),
            r#"unknown metric processor "org.example.Missing""#
        );
    }

    #[test]
    fn test_registry_factory_error() {
        let mut registry = ProcessorRegistry::new();
        registry.register("needs_host", needs_host);

        let mut options = ProcessorOptions::new();
        let gauges = Arc::new(GaugeRegistry::new());
        let context = ProcessorContext {
            topology: "t",
            options: &options,
            gauges: &gauges,
        };
        assert!(matches!(
            registry.build("needs_host", &context),
            Err(BuildError::MissingOption("host"))
        ));

        options.insert("host", "graphite.local");
        let context = ProcessorContext {
            topology: "t",
            options: &options,
            gauges: &gauges,
        };
        assert!(registry.build("needs_host", &context).is_ok());
    }

    #[test]
    fn test_options_strings_and_numbers() {
        let options: ProcessorOptions = serde_json::from_value(json!({
            "port": "2003",
            "period": 30,
            "host": "graphite",
            "empty": null,
        }))
        .unwrap();

        assert_eq!(options.parse::<u16>("port").unwrap(), Some(2003));
        assert_eq!(options.parse::<u64>("period").unwrap(), Some(30));
        assert_eq!(options.get_string("host").as_deref(), Some("graphite"));
        assert_eq!(options.get_string("empty"), None);
        assert_eq!(options.parse::<u16>("missing").unwrap(), None);
    }

    #[test]
    fn test_options_invalid_number() {
        let options: ProcessorOptions = [("port", "http")].into_iter().collect();
        let error = options.parse::<u16>("port").unwrap_err();
        assert_eq!(
            error.to_string(),
            r#"invalid processor option "port": invalid digit found in string"#
        );
    }

    #[test]
    fn test_options_trimmed() {
        let options: ProcessorOptions = [("period", " 10 ")].into_iter().collect();
        assert_eq!(options.parse::<u64>("period").unwrap(), Some(10));
    }
}
