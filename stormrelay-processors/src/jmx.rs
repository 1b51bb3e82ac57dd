use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use stormrelay_metrics::{
    BuildError, GaugeRegistry, MetricProcessor, MetricValue, ProcessError, ProcessorContext,
    TaskContext,
};

use crate::simple::set_gauge;

/// Domain of all object names created by the [`JmxProcessor`].
pub const JMX_DOMAIN: &str = "storm";

/// Characters that may not appear in the domain, keys, or unquoted values of an object name.
const RESERVED: &[char] = &[':', ',', '=', '"', '*', '?', '\n'];

/// An error returned when parsing an [`ObjectName`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ObjectNameError {
    /// The name has no `:` separating the domain from the properties.
    #[error("missing domain separator in object name")]
    MissingDomain,
    /// The domain contains reserved characters.
    #[error("invalid object name domain {0:?}")]
    InvalidDomain(String),
    /// The name has no properties.
    #[error("object name has no properties")]
    NoProperties,
    /// A property is not of the form `key=value`.
    #[error("malformed object name property {0:?}")]
    MalformedProperty(String),
    /// A property key is empty or contains reserved characters.
    #[error("invalid object name key {0:?}")]
    InvalidKey(String),
    /// A property value is empty or contains reserved characters.
    #[error("invalid value {value:?} for object name key {key:?}")]
    InvalidValue {
        /// The property key.
        key: String,
        /// The rejected value.
        value: String,
    },
    /// A key appears more than once.
    #[error("duplicate object name key {0:?}")]
    DuplicateKey(String),
}

/// A JMX-style object name, `domain:key=value,key=value`.
///
/// Properties keep the order in which they were given. The [canonical
/// name](Self::canonical_name) lists them sorted by key, so that two names with the same
/// properties in different order compare equal. Quoted values are not supported.
///
/// # Example
///
/// ```
/// use stormrelay_processors::ObjectName;
///
/// let name: ObjectName = "storm:type=gauge,name=latency".parse().unwrap();
/// assert_eq!(name.canonical_name(), "storm:name=latency,type=gauge");
/// assert_eq!(name.get("type"), Some("gauge"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectName {
    domain: String,
    properties: Vec<(String, String)>,
}

impl ObjectName {
    /// Returns the domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the value of a property.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the name with properties sorted by key.
    pub fn canonical_name(&self) -> String {
        let mut properties: Vec<_> = self.properties.iter().collect();
        properties.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut name = format!("{}:", self.domain);
        for (index, (key, value)) in properties.into_iter().enumerate() {
            if index > 0 {
                name.push(',');
            }
            name.push_str(key);
            name.push('=');
            name.push_str(value);
        }
        name
    }
}

impl FromStr for ObjectName {
    type Err = ObjectNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, properties) = s.split_once(':').ok_or(ObjectNameError::MissingDomain)?;

        if domain.contains(RESERVED) {
            return Err(ObjectNameError::InvalidDomain(domain.to_owned()));
        }

        if properties.is_empty() {
            return Err(ObjectNameError::NoProperties);
        }

        let mut parsed: Vec<(String, String)> = Vec::new();
        for property in properties.split(',') {
            let (key, value) = property
                .split_once('=')
                .ok_or_else(|| ObjectNameError::MalformedProperty(property.to_owned()))?;

            if key.is_empty() || key.contains(RESERVED) {
                return Err(ObjectNameError::InvalidKey(key.to_owned()));
            }

            if value.is_empty() || value.contains(RESERVED) {
                return Err(ObjectNameError::InvalidValue {
                    key: key.to_owned(),
                    value: value.to_owned(),
                });
            }

            if parsed.iter().any(|(k, _)| k == key) {
                return Err(ObjectNameError::DuplicateKey(key.to_owned()));
            }

            parsed.push((key.to_owned(), value.to_owned()));
        }

        Ok(Self {
            domain: domain.to_owned(),
            properties: parsed,
        })
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.domain)?;
        for (index, (key, value)) in self.properties.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// Stores every metric in the shared [`GaugeRegistry`] under a JMX-style object name.
///
/// Object names have the form:
///
/// ```text
/// storm:topology=<topology>,component=<component>,operation=<operation>,host-port-task=<host>-<port>-<task>
/// ```
///
/// Gauges are registered under the canonical form of this name.
#[derive(Debug)]
pub struct JmxProcessor {
    topology: String,
    gauges: Arc<GaugeRegistry>,
}

impl JmxProcessor {
    /// Creates a processor for a topology that writes to `gauges`.
    pub fn new(topology: impl Into<String>, gauges: Arc<GaugeRegistry>) -> Self {
        Self {
            topology: topology.into(),
            gauges,
        }
    }

    /// Creates a boxed processor from configuration.
    pub fn create(context: &ProcessorContext<'_>) -> Result<Box<dyn MetricProcessor>, BuildError> {
        stormrelay_log::info!(topology = context.topology, "exposing metrics as jmx object names");
        Ok(Box::new(Self::new(
            context.topology,
            Arc::clone(context.gauges),
        )))
    }

    /// Formats the object name of a metric without validating it.
    pub fn mbean_name(&self, metric: &MetricValue, task: &TaskContext) -> String {
        format!(
            "{JMX_DOMAIN}:topology={},component={},operation={},host-port-task={}-{}-{}",
            self.topology,
            metric.component(),
            metric.operation(),
            task.source_worker_host,
            task.source_worker_port,
            task.source_task_id,
        )
    }

    /// Returns the parsed object name of a metric.
    pub fn object_name(
        &self,
        metric: &MetricValue,
        task: &TaskContext,
    ) -> Result<ObjectName, ObjectNameError> {
        self.mbean_name(metric, task).parse()
    }
}

impl MetricProcessor for JmxProcessor {
    fn name(&self, metric: &MetricValue, task: &TaskContext) -> String {
        match self.object_name(metric, task) {
            Ok(object_name) => object_name.canonical_name(),
            Err(_) => self.mbean_name(metric, task),
        }
    }

    fn process(&self, metric: &MetricValue, task: &TaskContext) -> Result<(), ProcessError> {
        let object_name = self
            .object_name(metric, task)
            .map_err(|error| ProcessError::Backend(Box::new(error)))?;

        set_gauge(&self.gauges, &object_name.canonical_name(), metric.value());
        Ok(())
    }
}
