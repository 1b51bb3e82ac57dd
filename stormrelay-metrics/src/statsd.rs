use stormrelay_statsd::{CounterMetric, TimerMetric};

/// Counter metrics of the reporting pipeline.
///
/// All counters are tagged by the sanitized component name.
pub enum MetricCounters {
    /// Incremented by the number of metric values flattened from the raw data points of a cycle.
    Flattened,

    /// Incremented for every derived capacity metric.
    CapacityDerived,

    /// Incremented for every metric dropped because it does not match the allow-list.
    Filtered,

    /// Incremented for every metric the processor accepted.
    Processed,

    /// Incremented for every metric the processor failed to process.
    ProcessingFailed,
}

impl CounterMetric for MetricCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::Flattened => "reporter.metrics.flattened",
            Self::CapacityDerived => "reporter.metrics.capacity",
            Self::Filtered => "reporter.metrics.filtered",
            Self::Processed => "reporter.metrics.processed",
            Self::ProcessingFailed => "reporter.metrics.failed",
        }
    }
}

/// Timer metrics of the reporting pipeline.
pub enum MetricTimers {
    /// Time in milliseconds spent handling one reporting cycle.
    ///
    /// This includes the time spent in the processor. Tagged by the sanitized component name.
    CycleDuration,
}

impl TimerMetric for MetricTimers {
    fn name(&self) -> &'static str {
        match *self {
            Self::CycleDuration => "reporter.cycle.duration",
        }
    }
}
