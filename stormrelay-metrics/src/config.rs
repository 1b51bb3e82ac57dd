use serde::{Deserialize, Serialize};

use crate::processor::ProcessorOptions;

/// Parameters used by the [`ReportingPipeline`](crate::ReportingPipeline).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Name of the topology whose metrics are reported.
    ///
    /// Processors use this to namespace their identifiers. Defaults to `"topology"`.
    pub topology: String,

    /// Regular expression that the full name of a metric must match to be reported.
    ///
    /// The expression must match the entire dotted name, `component.operation`. Defaults to
    /// `".*"`, which reports all metrics.
    pub allowed_metrics: String,

    /// Identifier of the processor that receives the metrics.
    ///
    /// Defaults to `"simple"`.
    pub processor: String,

    /// Options passed through to the processor.
    ///
    /// The keys are interpreted by the processor only, for instance the host and port of a
    /// metrics backend.
    #[serde(skip_serializing_if = "ProcessorOptions::is_empty")]
    pub options: ProcessorOptions,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            topology: "topology".to_owned(),
            allowed_metrics: ".*".to_owned(),
            processor: "simple".to_owned(),
            options: ProcessorOptions::default(),
        }
    }
}
