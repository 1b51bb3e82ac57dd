use stormrelay_statsd::GaugeMetric;

/// Gauge metrics of the metric processors.
pub enum ProcessorGauges {
    /// The number of gauges in the shared gauge registry.
    ///
    /// Reported by processors that store metric values in the registry after every update.
    RegisteredGauges,
}

impl GaugeMetric for ProcessorGauges {
    fn name(&self) -> &'static str {
        match *self {
            Self::RegisteredGauges => "reporter.gauges.registered",
        }
    }
}
