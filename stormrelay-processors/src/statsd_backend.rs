use std::io;
use std::net::UdpSocket;

use cadence::prelude::*;
use cadence::{MetricSink, StatsdClient, UdpMetricSink};
use stormrelay_metrics::{
    BuildError, MetricProcessor, MetricValue, ProcessError, ProcessorContext, TaskContext,
    join_fragments,
};

use crate::simple::task_metric_name;

/// Option naming the StatsD host. Required.
pub const STATSD_HOST: &str = "metric.reporter.statsd.host";

/// Option naming the StatsD port.
pub const STATSD_PORT: &str = "metric.reporter.statsd.port";

const DEFAULT_STATSD_PORT: u16 = 8125;

/// Sends every metric as a StatsD gauge.
///
/// Gauges are named `Storm.<topology>.<host>.<port>.<component>.<task>.<operation>`. Unlike the
/// registry-backed processors, values are sent immediately and a failure to send is reported for
/// the affected metric.
#[derive(Debug)]
pub struct StatsdProcessor {
    client: StatsdClient,
}

impl StatsdProcessor {
    /// Creates a processor that sends to a sink.
    pub fn with_sink<T>(topology: &str, sink: T) -> Self
    where
        T: MetricSink + Sync + Send + std::panic::RefUnwindSafe + 'static,
    {
        let prefix = join_fragments(["Storm", topology]);
        Self {
            client: StatsdClient::from_sink(&prefix, sink),
        }
    }

    /// Creates a boxed processor from configuration.
    pub fn create(context: &ProcessorContext<'_>) -> Result<Box<dyn MetricProcessor>, BuildError> {
        let host = context.options.require_string(STATSD_HOST)?;
        let port = context
            .options
            .parse(STATSD_PORT)?
            .unwrap_or(DEFAULT_STATSD_PORT);

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        let sink = UdpMetricSink::from((host.as_str(), port), socket)
            .map_err(|error| BuildError::Io(io::Error::other(error)))?;

        stormrelay_log::info!(%host, port, "sending metrics to statsd");
        Ok(Box::new(Self::with_sink(context.topology, sink)))
    }
}

impl MetricProcessor for StatsdProcessor {
    fn name(&self, metric: &MetricValue, task: &TaskContext) -> String {
        task_metric_name(metric, task)
    }

    fn process(&self, metric: &MetricValue, task: &TaskContext) -> Result<(), ProcessError> {
        let name = self.name(metric, task);
        self.client
            .gauge(&name, metric.value())
            .map(drop)
            .map_err(|error| ProcessError::Backend(Box::new(error)))
    }
}
