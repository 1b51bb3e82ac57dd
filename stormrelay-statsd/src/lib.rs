//! StatsD instrumentation of stormrelay itself.
//!
//! Reported metrics go to the configured metric processor. This crate covers a different concern:
//! counters and timings that describe the relay, such as the number of metrics dropped by the
//! allow-list or the duration of a reporting cycle. They are sent to a StatsD server through
//! [`cadence`].
//!
//! # Declaring Metrics
//!
//! Metrics are declared as enums implementing [`CounterMetric`], [`GaugeMetric`], or
//! [`TimerMetric`]. The trait only provides the name, but it pins each metric to one type, so a
//! counter can never be sent as a timer.
//!
//! ```
//! use stormrelay_statsd::{metric, CounterMetric};
//!
//! enum CycleCounters {
//!     Dropped,
//! }
//!
//! impl CounterMetric for CycleCounters {
//!     fn name(&self) -> &'static str {
//!         match self {
//!             Self::Dropped => "cycle.dropped",
//!         }
//!     }
//! }
//!
//! metric!(counter(CycleCounters::Dropped) += 2, component = "split");
//! ```
//!
//! # Installing a Client
//!
//! Until a client is installed, the [`metric!`] macro does nothing. [`init`] connects to a
//! StatsD server over UDP and installs the client for all threads:
//!
//! ```no_run
//! use stormrelay_statsd::StatsdConfig;
//!
//! stormrelay_statsd::init(StatsdConfig {
//!     prefix: "stormrelay".to_owned(),
//!     host: "127.0.0.1:8125".to_owned(),
//!     buffer_size: None,
//!     default_tags: Default::default(),
//!     sample_rate: 0.5,
//! })
//! .unwrap();
//! ```
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use cadence::{BufferedUdpMetricSink, Metric, MetricBuilder, QueuingMetricSink, StatsdClient};
use parking_lot::RwLock;
use rand::Rng;

/// Fits a single datagram into common MTUs.
const DEFAULT_BUFFER_SIZE: usize = 1432;

/// Fraction of metrics that are sent, clamped to `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleRate(f64);

impl SampleRate {
    /// Returns the rate as a fraction.
    pub fn get(self) -> f64 {
        self.0
    }

    /// Randomly decides whether a single metric is sent.
    pub fn admits(self) -> bool {
        match self.0 {
            rate if rate >= 1.0 => true,
            rate if rate <= 0.0 => false,
            rate => rand::rng().random_bool(rate),
        }
    }
}

impl From<f64> for SampleRate {
    fn from(value: f64) -> Self {
        // NaN is not clamped by `f64::clamp`.
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }
}

/// Errors returned by [`init`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The statsd host could not be resolved.
    #[error("failed to resolve statsd host {0}")]
    Resolve(String, #[source] io::Error),
    /// The statsd host resolved to no addresses.
    #[error("statsd host {0} did not resolve to any address")]
    NoAddress(String),
    /// The local socket or sink could not be created.
    #[error("failed to create statsd sink")]
    Sink(#[source] io::Error),
}

/// Configuration for [`init`].
#[derive(Clone, Debug)]
pub struct StatsdConfig {
    /// Prefix of all metric names.
    pub prefix: String,
    /// Address of the StatsD server, `host:port`.
    pub host: String,
    /// Size of the buffer used to batch metrics into datagrams.
    pub buffer_size: Option<usize>,
    /// Tags added to every metric.
    pub default_tags: BTreeMap<String, String>,
    /// Fraction of metrics that are sent.
    pub sample_rate: f64,
}

/// A StatsD client with default tags and a sample rate.
#[derive(Debug)]
pub struct InstrumentationClient {
    statsd: StatsdClient,
    default_tags: BTreeMap<String, String>,
    sample_rate: SampleRate,
}

impl InstrumentationClient {
    /// Creates a client around a cadence client.
    pub fn new(
        statsd: StatsdClient,
        default_tags: BTreeMap<String, String>,
        sample_rate: impl Into<SampleRate>,
    ) -> Self {
        Self {
            statsd,
            default_tags,
            sample_rate: sample_rate.into(),
        }
    }

    /// Returns the cadence client used to build metrics.
    pub fn statsd(&self) -> &StatsdClient {
        &self.statsd
    }

    /// Sends a metric built on [`statsd`](Self::statsd) with the default tags attached.
    ///
    /// Failures to send are logged and otherwise ignored.
    #[inline]
    pub fn send<'a, T>(&'a self, builder: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        if !self.sample_rate.admits() {
            return;
        }

        let mut builder = self
            .default_tags
            .iter()
            .fold(builder, |builder, (k, v)| builder.with_tag(k, v));

        if self.sample_rate.get() < 1.0 {
            builder = builder.with_sampling_rate(self.sample_rate.get());
        }

        if let Err(error) = builder.try_send() {
            stormrelay_log::error!(
                error = &error as &dyn std::error::Error,
                "failed to send internal metric",
            );
        }
    }
}

/// The client shared by all threads.
static GLOBAL_CLIENT: RwLock<Option<Arc<InstrumentationClient>>> = RwLock::new(None);

thread_local! {
    /// Per-thread copy of the global client, replaced temporarily in tests.
    static THREAD_CLIENT: RefCell<Option<Arc<InstrumentationClient>>> =
        RefCell::new(GLOBAL_CLIENT.read().clone());
}

#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;
}

/// Installs a client for all threads.
///
/// Threads that already sent a metric keep their previous client, the calling thread switches
/// immediately.
pub fn install(client: InstrumentationClient) {
    let client = Arc::new(client);
    *GLOBAL_CLIENT.write() = Some(Arc::clone(&client));
    THREAD_CLIENT.with(|cell| cell.replace(Some(client)));
}

/// Removes the global client, so that threads started afterwards send no metrics.
pub fn uninstall() {
    *GLOBAL_CLIENT.write() = None;
}

/// Connects to a StatsD server and installs the client.
pub fn init(config: StatsdConfig) -> Result<(), Error> {
    let addr = config
        .host
        .to_socket_addrs()
        .map_err(|e| Error::Resolve(config.host.clone(), e))?
        .next()
        .ok_or_else(|| Error::NoAddress(config.host.clone()))?;

    let sample_rate = SampleRate::from(config.sample_rate);
    stormrelay_log::info!(%addr, sample_rate = sample_rate.get(), "reporting internal metrics to statsd");
    if sample_rate.get() == 0.0 {
        stormrelay_log::warn!("statsd sample rate is 0, no internal metrics will be sent");
    }

    let socket = UdpSocket::bind("0.0.0.0:0").map_err(Error::Sink)?;
    socket.set_nonblocking(true).map_err(Error::Sink)?;

    let buffer_size = config.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
    let sink = BufferedUdpMetricSink::with_capacity(addr, socket, buffer_size)
        .map_err(|e| Error::Sink(io::Error::other(e)))?;

    install(InstrumentationClient::new(
        StatsdClient::from_sink(&config.prefix, QueuingMetricSink::from(sink)),
        config.default_tags,
        sample_rate,
    ));

    Ok(())
}

/// Calls `f` with the client of the current thread, or returns the default if none is installed.
///
/// Prefer the [`metric!`] macro.
#[inline]
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&InstrumentationClient) -> R,
    R: Default,
{
    THREAD_CLIENT.with(|cell| match cell.borrow().as_deref() {
        Some(client) => f(client),
        None => R::default(),
    })
}

/// Runs `f` with a client that records metrics on the current thread, and returns them.
#[cfg(any(test, feature = "test"))]
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    with_capturing_test_client_sample_rate(1.0, f)
}

/// Like [`with_capturing_test_client`], with a custom sample rate.
#[cfg(any(test, feature = "test"))]
pub fn with_capturing_test_client_sample_rate(sample_rate: f64, f: impl FnOnce()) -> Vec<String> {
    let (rx, sink) = cadence::SpyMetricSink::new();
    let client = InstrumentationClient::new(
        StatsdClient::from_sink("", sink),
        BTreeMap::new(),
        sample_rate,
    );

    THREAD_CLIENT.with(|cell| {
        let previous = cell.replace(Some(Arc::new(client)));
        f();
        cell.replace(previous);
    });

    rx.iter()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .collect()
}

/// A duration, sent in milliseconds.
///
/// ```
/// use stormrelay_statsd::{metric, TimerMetric};
///
/// struct CycleDuration;
///
/// impl TimerMetric for CycleDuration {
///     fn name(&self) -> &'static str {
///         "cycle.duration"
///     }
/// }
///
/// # fn report() {}
/// let started = std::time::Instant::now();
/// report();
/// metric!(timer(CycleDuration) = started.elapsed());
///
/// // Or time a block, which evaluates to the block's value.
/// let count = metric!(timer(CycleDuration), component = "split", { 3 });
/// assert_eq!(count, 3);
/// ```
pub trait TimerMetric {
    /// Returns the metric name.
    fn name(&self) -> &'static str;
}

/// A number of events, aggregated by the StatsD server.
pub trait CounterMetric {
    /// Returns the metric name.
    fn name(&self) -> &'static str;
}

/// The current value of a quantity.
///
/// ```
/// use stormrelay_statsd::{metric, GaugeMetric};
///
/// struct RegisteredGauges;
///
/// impl GaugeMetric for RegisteredGauges {
///     fn name(&self) -> &'static str {
///         "gauges.registered"
///     }
/// }
///
/// metric!(gauge(RegisteredGauges) = 12u64);
/// ```
pub trait GaugeMetric {
    /// Returns the metric name.
    fn name(&self) -> &'static str;
}

/// Sends an internal metric through the client of the current thread.
///
/// Tags follow the value as `key = value` pairs. Counter increments of zero are not sent.
#[macro_export]
macro_rules! metric {
    (counter($id:expr) += $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {{
        let value = $value;
        if value != 0 {
            $crate::with_client(|client| {
                use $crate::_pred::*;
                client.send(
                    client
                        .statsd()
                        .count_with_tags($crate::CounterMetric::name(&$id), value)
                        $(.with_tag(stringify!($($k).*), $v))*
                )
            })
        }
    }};

    (gauge($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send(
                client
                    .statsd()
                    .gauge_with_tags($crate::GaugeMetric::name(&$id), $value)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    // Durations are sent as distributions of milliseconds.
    (timer($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            let millis = $value.as_nanos() as f64 / 1e6;
            client.send(
                client
                    .statsd()
                    .distribution_with_tags($crate::TimerMetric::name(&$id), millis)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    (timer($id:expr), $($($k:ident).* = $v:expr,)* $block:block) => {{
        let started = std::time::Instant::now();
        let result = $block;
        $crate::metric!(timer($id) = started.elapsed() $(, $($k).* = $v)*);
        result
    }};
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cadence::NopMetricSink;

    use super::*;

    enum Counters {
        Filtered,
    }

    impl CounterMetric for Counters {
        fn name(&self) -> &'static str {
            match self {
                Self::Filtered => "metrics.filtered",
            }
        }
    }

    struct Registered;

    impl GaugeMetric for Registered {
        fn name(&self) -> &'static str {
            "gauges.registered"
        }
    }

    struct Cycle;

    impl TimerMetric for Cycle {
        fn name(&self) -> &'static str {
            "cycle.duration"
        }
    }

    #[test]
    fn test_counter_with_tags() {
        let captures = with_capturing_test_client(|| {
            metric!(counter(Counters::Filtered) += 4u64, component = "split");
            metric!(counter(Counters::Filtered) += 1u64, component = "count", task.id = "3");
        });

        assert_eq!(
            captures,
            [
                "metrics.filtered:4|c|#component:split",
                "metrics.filtered:1|c|#component:count,task.id:3",
            ]
        );
    }

    #[test]
    fn test_counter_zero_is_skipped() {
        let captures = with_capturing_test_client(|| {
            metric!(counter(Counters::Filtered) += 0u64);
        });
        assert!(captures.is_empty());
    }

    #[test]
    fn test_gauge() {
        let captures = with_capturing_test_client(|| {
            metric!(gauge(Registered) = 7u64);
        });
        assert_eq!(captures, ["gauges.registered:7|g"]);
    }

    #[test]
    fn test_timer_in_milliseconds() {
        let captures = with_capturing_test_client(|| {
            metric!(timer(Cycle) = Duration::from_millis(1500), component = "split");
        });
        assert_eq!(captures, ["cycle.duration:1500|d|#component:split"]);
    }

    #[test]
    fn test_timed_block_returns_value() {
        let mut value = 0;
        let captures = with_capturing_test_client(|| {
            value = metric!(timer(Cycle), component = "split", { 42 });
        });

        assert_eq!(value, 42);
        assert_eq!(captures.len(), 1);
        assert!(captures[0].starts_with("cycle.duration:"));
        assert!(captures[0].ends_with("|d|#component:split"));
    }

    #[test]
    fn test_zero_sample_rate_sends_nothing() {
        let captures = with_capturing_test_client_sample_rate(0.0, || {
            metric!(counter(Counters::Filtered) += 1u64);
        });
        assert!(captures.is_empty());
    }

    #[test]
    fn test_install_switches_current_thread() {
        let before = with_client(|client| format!("{client:?}"));
        install(InstrumentationClient::new(
            StatsdClient::from_sink("installed", NopMetricSink),
            BTreeMap::new(),
            1.0,
        ));
        let after = with_client(|client| format!("{client:?}"));
        uninstall();

        assert_ne!(before, after);
    }

    #[test]
    fn test_sample_rate_clamped() {
        assert_eq!(SampleRate::from(1.5).get(), 1.0);
        assert_eq!(SampleRate::from(-1.0).get(), 0.0);
        assert_eq!(SampleRate::from(f64::NAN).get(), 0.0);
        assert!(SampleRate::from(1.0).admits());
        assert!(!SampleRate::from(0.0).admits());
    }
}
