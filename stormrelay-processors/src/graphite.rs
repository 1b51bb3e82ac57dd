use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender};
use stormrelay_metrics::{
    BuildError, GaugeRegistry, MetricProcessor, MetricValue, ProcessError, ProcessorContext,
    TaskContext, join_fragments,
};

use crate::simple::SimpleProcessor;

/// Option naming the Graphite host. Required.
pub const GRAPHITE_HOST: &str = "metric.reporter.graphite.report.host";

/// Option naming the Graphite plaintext port.
pub const GRAPHITE_PORT: &str = "metric.reporter.graphite.report.port";

/// Option setting the interval between two reports to Graphite, in seconds.
pub const REPORT_PERIOD_IN_SEC: &str = "metric.reporter.graphite.report.period.sec";

const DEFAULT_GRAPHITE_PORT: u16 = 2003;
const DEFAULT_REPORT_PERIOD_SEC: u64 = 30;

/// Upper bound for connecting to and writing to Graphite.
const NETWORK_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection and scheduling parameters of the [`GraphiteReporter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphiteConfig {
    /// Host name or address of the Graphite server.
    pub host: String,
    /// Port of the plaintext protocol.
    pub port: u16,
    /// Interval between two reports.
    pub period: Duration,
    /// Prefix of all reported paths, `Storm.<topology>`.
    pub prefix: String,
}

impl GraphiteConfig {
    /// Reads the Graphite parameters from processor options.
    pub fn from_context(context: &ProcessorContext<'_>) -> Result<Self, BuildError> {
        let options = context.options;

        let host = options.require_string(GRAPHITE_HOST)?;
        let port = options
            .parse(GRAPHITE_PORT)?
            .unwrap_or(DEFAULT_GRAPHITE_PORT);
        let period_secs = options
            .parse(REPORT_PERIOD_IN_SEC)?
            .unwrap_or(DEFAULT_REPORT_PERIOD_SEC);

        if period_secs == 0 {
            return Err(BuildError::InvalidOption {
                key: REPORT_PERIOD_IN_SEC.to_owned(),
                reason: "report period must be at least one second".to_owned(),
            });
        }

        Ok(Self {
            host,
            port,
            period: Duration::from_secs(period_secs),
            prefix: join_fragments(["Storm", context.topology]),
        })
    }
}

/// Formats gauge values in the Graphite plaintext protocol.
///
/// Every gauge produces one line, `<prefix>.<name> <value> <timestamp>`. Spaces in names are
/// replaced with dashes.
pub fn format_lines(prefix: &str, values: &BTreeMap<String, f64>, timestamp: u64) -> String {
    let mut lines = String::new();
    for (name, value) in values {
        let path = join_fragments([prefix, name.replace(' ', "-").as_str()]);
        // Writing to a string cannot fail.
        let _ = writeln!(lines, "{path} {value} {timestamp}");
    }
    lines
}

/// Periodically writes the contents of a [`GaugeRegistry`] to Graphite.
#[derive(Debug)]
pub struct GraphiteReporter {
    config: GraphiteConfig,
    gauges: Arc<GaugeRegistry>,
}

impl GraphiteReporter {
    /// Creates a reporter for the given registry.
    pub fn new(config: GraphiteConfig, gauges: Arc<GaugeRegistry>) -> Self {
        Self { config, gauges }
    }

    /// Sends all gauges to Graphite over a new connection.
    ///
    /// Returns the number of reported gauges. Connecting and writing are bounded by a timeout.
    pub fn report_once(&self) -> io::Result<usize> {
        let values = self.gauges.snapshot();
        if values.is_empty() {
            return Ok(0);
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        let lines = format_lines(&self.config.prefix, &values, timestamp);

        let stream = self.connect()?;
        stream.set_write_timeout(Some(NETWORK_TIMEOUT))?;

        let mut writer = BufWriter::new(stream);
        writer.write_all(lines.as_bytes())?;
        writer.flush()?;

        Ok(values.len())
    }

    fn connect(&self) -> io::Result<TcpStream> {
        let mut last_error = None;

        for addr in (self.config.host.as_str(), self.config.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, NETWORK_TIMEOUT) {
                Ok(stream) => return Ok(stream),
                Err(error) => last_error = Some(error),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("graphite host {} did not resolve", self.config.host),
            )
        }))
    }

    /// Reports on every tick until `shutdown` is closed.
    fn run(self, shutdown: Receiver<()>) {
        let ticker = crossbeam_channel::tick(self.config.period);

        loop {
            crossbeam_channel::select! {
                recv(ticker) -> _ => match self.report_once() {
                    Ok(count) => stormrelay_log::trace!(count, "reported gauges to graphite"),
                    Err(error) => stormrelay_log::error!(
                        error = &error as &dyn std::error::Error,
                        host = %self.config.host,
                        port = self.config.port,
                        "failed to report gauges to graphite",
                    ),
                },
                recv(shutdown) -> _ => break,
            }
        }

        stormrelay_log::debug!("graphite reporter stopped");
    }
}

/// Names metrics like the [`SimpleProcessor`] and reports the registry to Graphite periodically.
///
/// A background thread sends all gauges of the shared registry every report period. The thread is
/// stopped and joined when the processor is dropped.
#[derive(Debug)]
pub struct GraphiteProcessor {
    inner: SimpleProcessor,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl GraphiteProcessor {
    /// Starts the background reporter and creates the processor.
    pub fn start(config: GraphiteConfig, gauges: Arc<GaugeRegistry>) -> io::Result<Self> {
        stormrelay_log::info!(
            host = %config.host,
            port = config.port,
            period_secs = config.period.as_secs(),
            "reporting gauges to graphite",
        );

        let reporter = GraphiteReporter::new(config, Arc::clone(&gauges));
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded(0);

        let handle = thread::Builder::new()
            .name("graphite-reporter".to_owned())
            .spawn(move || reporter.run(shutdown_rx))?;

        Ok(Self {
            inner: SimpleProcessor::new(gauges),
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    /// Creates a boxed processor from configuration.
    pub fn create(context: &ProcessorContext<'_>) -> Result<Box<dyn MetricProcessor>, BuildError> {
        let config = GraphiteConfig::from_context(context)?;
        let processor = Self::start(config, Arc::clone(context.gauges))?;
        Ok(Box::new(processor))
    }
}

impl MetricProcessor for GraphiteProcessor {
    fn name(&self, metric: &MetricValue, task: &TaskContext) -> String {
        self.inner.name(metric, task)
    }

    fn process(&self, metric: &MetricValue, task: &TaskContext) -> Result<(), ProcessError> {
        self.inner.process(metric, task)
    }
}

impl Drop for GraphiteProcessor {
    fn drop(&mut self) {
        // Disconnecting the channel wakes up the reporter thread.
        drop(self.shutdown.take());

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                stormrelay_log::error!("graphite reporter thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;
    use std::time::Instant;

    use stormrelay_metrics::ProcessorOptions;

    use super::*;
    use crate::testutils::task;

    fn context<'a>(
        options: &'a ProcessorOptions,
        gauges: &'a Arc<GaugeRegistry>,
    ) -> ProcessorContext<'a> {
        ProcessorContext {
            topology: "words",
            options,
            gauges,
        }
    }

    #[test]
    fn test_config_defaults() {
        let options: ProcessorOptions = [(GRAPHITE_HOST, "graphite.local")].into_iter().collect();
        let gauges = Arc::new(GaugeRegistry::new());

        let config = GraphiteConfig::from_context(&context(&options, &gauges)).unwrap();
        assert_eq!(
            config,
            GraphiteConfig {
                host: "graphite.local".to_owned(),
                port: 2003,
                period: Duration::from_secs(30),
                prefix: "Storm.words".to_owned(),
            }
        );
    }

    #[test]
    fn test_config_from_strings() {
        let options: ProcessorOptions = [
            (GRAPHITE_HOST, "someHost"),
            (GRAPHITE_PORT, "1234"),
            (REPORT_PERIOD_IN_SEC, "13"),
        ]
        .into_iter()
        .collect();
        let gauges = Arc::new(GaugeRegistry::new());

        let config = GraphiteConfig::from_context(&context(&options, &gauges)).unwrap();
        assert_eq!(config.host, "someHost");
        assert_eq!(config.port, 1234);
        assert_eq!(config.period, Duration::from_secs(13));
    }

    #[test]
    fn test_config_missing_host() {
        let options = ProcessorOptions::new();
        let gauges = Arc::new(GaugeRegistry::new());

        let error = GraphiteConfig::from_context(&context(&options, &gauges)).unwrap_err();
        assert_eq!(
            error.to_string(),
            r#"missing processor option "metric.reporter.graphite.report.host""#
        );
    }

    #[test]
    fn test_config_zero_period() {
        let options: ProcessorOptions = [(GRAPHITE_HOST, "h"), (REPORT_PERIOD_IN_SEC, "0")]
            .into_iter()
            .collect();
        let gauges = Arc::new(GaugeRegistry::new());

        let error = GraphiteConfig::from_context(&context(&options, &gauges)).unwrap_err();
        assert!(matches!(error, BuildError::InvalidOption { .. }));
    }

    #[test]
    fn test_format_lines() {
        let values = BTreeMap::from([
            ("worker-1.6700.split.3.execute-count.default".to_owned(), 12.0),
            ("worker-1.6700.split.3.latency with space".to_owned(), 0.25),
        ]);

        let lines = format_lines("Storm.words", &values, 1_700_000_000);
        insta::assert_snapshot!(lines, @r###"
        Storm.words.worker-1.6700.split.3.execute-count.default 12 1700000000
        Storm.words.worker-1.6700.split.3.latency-with-space 0.25 1700000000
        "###);
    }

    #[test]
    fn test_report_once() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let gauges = Arc::new(GaugeRegistry::new());
        gauges.set("worker-1.6700.split.3.emit-count", 7.0);

        let config = GraphiteConfig {
            host: "127.0.0.1".to_owned(),
            port,
            period: Duration::from_secs(60),
            prefix: "Storm.words".to_owned(),
        };
        let reporter = GraphiteReporter::new(config, gauges);
        assert_eq!(reporter.report_once().unwrap(), 1);

        let (mut stream, _) = listener.accept().unwrap();
        let mut received = String::new();
        stream.read_to_string(&mut received).unwrap();

        assert!(received.starts_with("Storm.words.worker-1.6700.split.3.emit-count 7 "));
        assert!(received.ends_with('\n'));
    }

    #[test]
    fn test_report_once_empty_registry() {
        let config = GraphiteConfig {
            // Never contacted when there is nothing to report.
            host: "graphite.invalid".to_owned(),
            port: 2003,
            period: Duration::from_secs(60),
            prefix: "Storm.words".to_owned(),
        };
        let reporter = GraphiteReporter::new(config, Arc::new(GaugeRegistry::new()));
        assert_eq!(reporter.report_once().unwrap(), 0);
    }

    #[test]
    fn test_processor_reports_and_stops() {
        stormrelay_log::init_test!();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let gauges = Arc::new(GaugeRegistry::new());
        let config = GraphiteConfig {
            host: "127.0.0.1".to_owned(),
            port,
            period: Duration::from_millis(50),
            prefix: "Storm.words".to_owned(),
        };
        let processor = GraphiteProcessor::start(config, Arc::clone(&gauges)).unwrap();

        let metric = MetricValue::new("counter", "execute-count.default", 3.0);
        processor.process(&metric, &task(1)).unwrap();
        assert_eq!(
            processor.name(&metric, &task(1)),
            "worker-1.6700.counter.1.execute-count.default"
        );

        let (mut stream, _) = listener.accept().unwrap();
        let mut received = String::new();
        stream.read_to_string(&mut received).unwrap();
        assert!(received.starts_with("Storm.words.worker-1.6700.counter.1.execute-count.default 3 "));

        let start = Instant::now();
        drop(processor);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
