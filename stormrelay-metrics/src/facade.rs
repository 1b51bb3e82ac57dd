use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rand::Rng;

use crate::protocol::{DataValue, RawDataPoint};

/// Name of the data point published by a [`MetricsFacade`].
///
/// Flattened metrics of the facade are named `<component>.YammerFacadeMetric.<instrument>`, which
/// existing dashboards rely on.
pub const FACADE_METRIC_NAME: &str = "YammerFacadeMetric";

/// Interval at which meter rates decay.
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Number of values a histogram samples for its percentiles.
const RESERVOIR_SIZE: usize = 1028;

/// A counter that can be incremented and decremented.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    /// Adds one.
    pub fn inc(&self) {
        self.inc_by(1);
    }

    /// Adds `n`, which may be negative.
    pub fn inc_by(&self, n: i64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Subtracts one.
    pub fn dec(&self) {
        self.inc_by(-1);
    }

    /// Returns the current count.
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Exponentially weighted moving average of an event rate per second.
#[derive(Debug)]
struct Ewma {
    alpha: f64,
    rate: Option<f64>,
    uncounted: u64,
}

impl Ewma {
    fn minutes(minutes: f64) -> Self {
        Self {
            alpha: 1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0 / minutes).exp(),
            rate: None,
            uncounted: 0,
        }
    }

    fn tick(&mut self) {
        let instant_rate = self.uncounted as f64 / TICK_INTERVAL.as_secs_f64();
        self.uncounted = 0;
        self.rate = Some(match self.rate {
            Some(rate) => rate + self.alpha * (instant_rate - rate),
            None => instant_rate,
        });
    }

    fn rate(&self) -> f64 {
        self.rate.unwrap_or(0.0)
    }
}

#[derive(Debug)]
struct MeterState {
    count: u64,
    start: Instant,
    last_tick: Instant,
    rates: [Ewma; 3],
}

impl MeterState {
    fn tick_until(&mut self, now: Instant) {
        while now.saturating_duration_since(self.last_tick) >= TICK_INTERVAL {
            for ewma in &mut self.rates {
                ewma.tick();
            }
            self.last_tick += TICK_INTERVAL;
        }
    }
}

/// The values of a [`Meter`] at one point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeterSnapshot {
    /// Number of marked events.
    pub count: u64,
    /// Events per second since the meter was created.
    pub mean_rate: f64,
    /// Events per second, averaged over one minute.
    pub one_minute_rate: f64,
    /// Events per second, averaged over five minutes.
    pub five_minute_rate: f64,
    /// Events per second, averaged over fifteen minutes.
    pub fifteen_minute_rate: f64,
}

/// Measures the rate of events.
///
/// Moving averages are updated in ticks of five seconds. Elapsed ticks are applied lazily on the
/// next mark or snapshot.
#[derive(Debug)]
pub struct Meter {
    state: Mutex<MeterState>,
}

impl Meter {
    /// Creates a meter starting now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(start: Instant) -> Self {
        Self {
            state: Mutex::new(MeterState {
                count: 0,
                start,
                last_tick: start,
                rates: [Ewma::minutes(1.0), Ewma::minutes(5.0), Ewma::minutes(15.0)],
            }),
        }
    }

    /// Marks one event.
    pub fn mark(&self) {
        self.mark_n(1);
    }

    /// Marks `n` events.
    pub fn mark_n(&self, n: u64) {
        self.mark_at(n, Instant::now());
    }

    fn mark_at(&self, n: u64, now: Instant) {
        let mut state = self.state.lock();
        state.tick_until(now);
        state.count += n;
        for ewma in &mut state.rates {
            ewma.uncounted += n;
        }
    }

    /// Returns the current count and rates.
    pub fn snapshot(&self) -> MeterSnapshot {
        self.snapshot_at(Instant::now())
    }

    fn snapshot_at(&self, now: Instant) -> MeterSnapshot {
        let mut state = self.state.lock();
        state.tick_until(now);

        let elapsed = now.saturating_duration_since(state.start).as_secs_f64();
        let mean_rate = if elapsed > 0.0 {
            state.count as f64 / elapsed
        } else {
            0.0
        };

        let [one, five, fifteen] = &state.rates;
        MeterSnapshot {
            count: state.count,
            mean_rate,
            one_minute_rate: one.rate(),
            five_minute_rate: five.rate(),
            fifteen_minute_rate: fifteen.rate(),
        }
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct HistogramState {
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    sum_squared_deviations: f64,
    samples: Vec<f64>,
}

/// The values of a [`Histogram`] at one point in time.
///
/// All fields are zero for an empty histogram.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistogramSnapshot {
    /// Number of recorded values.
    pub count: u64,
    /// Smallest recorded value.
    pub min: f64,
    /// Largest recorded value.
    pub max: f64,
    /// Arithmetic mean of all recorded values.
    pub mean: f64,
    /// Sample standard deviation of all recorded values.
    pub stddev: f64,
    /// 50th percentile of the sampled values.
    pub median: f64,
    /// 75th percentile of the sampled values.
    pub p75: f64,
    /// 95th percentile of the sampled values.
    pub p95: f64,
    /// 99th percentile of the sampled values.
    pub p99: f64,
}

/// Records the distribution of values.
///
/// Count, extremes, mean, and standard deviation cover every recorded value. Percentiles are
/// computed from a uniform random sample of at most 1028 values.
#[derive(Debug, Default)]
pub struct Histogram {
    state: Mutex<HistogramState>,
}

impl Histogram {
    /// Creates an empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value.
    pub fn update(&self, value: f64) {
        let mut state = self.state.lock();
        state.count += 1;

        if state.count == 1 {
            state.min = value;
            state.max = value;
        } else {
            state.min = state.min.min(value);
            state.max = state.max.max(value);
        }

        let delta = value - state.mean;
        state.mean += delta / state.count as f64;
        state.sum_squared_deviations += delta * (value - state.mean);

        if state.samples.len() < RESERVOIR_SIZE {
            state.samples.push(value);
        } else {
            let index = rand::rng().random_range(0..state.count);
            if index < RESERVOIR_SIZE as u64 {
                state.samples[index as usize] = value;
            }
        }
    }

    /// Returns the current statistics.
    pub fn snapshot(&self) -> HistogramSnapshot {
        let state = self.state.lock();

        let mut sorted = state.samples.clone();
        sorted.sort_by(f64::total_cmp);

        let stddev = match state.count {
            0 | 1 => 0.0,
            count => (state.sum_squared_deviations / (count - 1) as f64).sqrt(),
        };

        HistogramSnapshot {
            count: state.count,
            min: state.min,
            max: state.max,
            mean: state.mean,
            stddev,
            median: quantile(&sorted, 0.5),
            p75: quantile(&sorted, 0.75),
            p95: quantile(&sorted, 0.95),
            p99: quantile(&sorted, 0.99),
        }
    }
}

/// Interpolates the quantile `q` of sorted values at position `q * (n + 1)`.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) else {
        return 0.0;
    };

    let position = q * (sorted.len() + 1) as f64;
    if position < 1.0 {
        return first;
    }
    if position >= sorted.len() as f64 {
        return last;
    }

    let index = position as usize;
    let lower = sorted[index - 1];
    let upper = sorted[index];
    lower + position.fract() * (upper - lower)
}

/// Records durations in milliseconds.
#[derive(Debug, Default)]
pub struct Timer {
    histogram: Histogram,
}

impl Timer {
    /// Creates an empty timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a duration.
    pub fn update(&self, duration: Duration) {
        self.histogram.update(duration.as_secs_f64() * 1000.0);
    }

    /// Runs `f` and records how long it took.
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.update(start.elapsed());
        result
    }

    /// Returns the statistics of the recorded durations in milliseconds.
    pub fn snapshot(&self) -> HistogramSnapshot {
        self.histogram.snapshot()
    }
}

type GaugeFn = dyn Fn() -> f64 + Send + Sync;

enum Instrument {
    Counter(Arc<Counter>),
    Meter(Arc<Meter>),
    Histogram(Arc<Histogram>),
    Timer(Arc<Timer>),
    Gauge(Box<GaugeFn>),
}

impl Instrument {
    fn kind(&self) -> &'static str {
        match self {
            Self::Counter(_) => "counter",
            Self::Meter(_) => "meter",
            Self::Histogram(_) => "histogram",
            Self::Timer(_) => "timer",
            Self::Gauge(_) => "gauge",
        }
    }

    fn value(&self) -> DataValue {
        match self {
            Self::Counter(counter) => DataValue::Number(counter.count() as f64),
            Self::Meter(meter) => {
                let snapshot = meter.snapshot();
                DataValue::from_iter([
                    ("count", DataValue::Number(snapshot.count as f64)),
                    ("meanRate", DataValue::Number(snapshot.mean_rate)),
                    ("1MinuteRate", DataValue::Number(snapshot.one_minute_rate)),
                    ("5MinuteRate", DataValue::Number(snapshot.five_minute_rate)),
                    ("15MinuteRate", DataValue::Number(snapshot.fifteen_minute_rate)),
                ])
            }
            Self::Histogram(histogram) => {
                let snapshot = histogram.snapshot();
                DataValue::from_iter([
                    ("75percentile", DataValue::Number(snapshot.p75)),
                    ("95percentile", DataValue::Number(snapshot.p95)),
                    ("99percentile", DataValue::Number(snapshot.p99)),
                    ("median", DataValue::Number(snapshot.median)),
                    ("mean", DataValue::Number(snapshot.mean)),
                    ("min", DataValue::Number(snapshot.min)),
                    ("max", DataValue::Number(snapshot.max)),
                    ("stddev", DataValue::Number(snapshot.stddev)),
                ])
            }
            Self::Timer(timer) => {
                let snapshot = timer.snapshot();
                DataValue::from_iter([
                    ("count", DataValue::Number(snapshot.count as f64)),
                    ("median", DataValue::Number(snapshot.median)),
                    ("75percentile", DataValue::Number(snapshot.p75)),
                    ("95percentile", DataValue::Number(snapshot.p95)),
                    ("99percentile", DataValue::Number(snapshot.p99)),
                ])
            }
            Self::Gauge(gauge) => DataValue::Number(gauge()),
        }
    }
}

/// An error returned when a name is already registered as a different kind of instrument.
#[derive(Debug, thiserror::Error)]
#[error("metric {name:?} is already registered as a {existing}")]
pub struct FacadeError {
    name: String,
    existing: &'static str,
}

/// Instruments of a processing component, published as a single data point.
///
/// A component creates counters, meters, histograms, timers, and gauges by name and updates them
/// while it runs. When the host collects metrics, [`data_point`](Self::data_point) serializes all
/// instruments into one [`RawDataPoint`] named [`FACADE_METRIC_NAME`] with a nested value. The
/// [`ReportingPipeline`](crate::ReportingPipeline) flattens it like any other data point.
///
/// Instruments are never reset by collection. Requesting an existing name returns the instrument
/// registered first.
///
/// # Example
///
/// ```
/// use stormrelay_metrics::{MetricsFacade, flatten};
///
/// let facade = MetricsFacade::new();
/// facade.counter("emitted").unwrap().inc_by(3);
/// facade.register_gauge("pending", || 7.0).unwrap();
///
/// let metrics = flatten(&facade.data_point(), "bolt");
/// let names: Vec<_> = metrics.iter().map(|m| m.name()).collect();
/// assert_eq!(
///     names,
///     ["bolt.YammerFacadeMetric.emitted", "bolt.YammerFacadeMetric.pending"]
/// );
/// ```
#[derive(Default)]
pub struct MetricsFacade {
    instruments: RwLock<IndexMap<String, Instrument>>,
}

impl MetricsFacade {
    /// Creates a facade without instruments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counter `name`, creating it if necessary.
    pub fn counter(&self, name: &str) -> Result<Arc<Counter>, FacadeError> {
        self.get_or_create(
            name,
            || Instrument::Counter(Arc::default()),
            |instrument| match instrument {
                Instrument::Counter(counter) => Some(Arc::clone(counter)),
                _ => None,
            },
        )
    }

    /// Returns the meter `name`, creating it if necessary.
    pub fn meter(&self, name: &str) -> Result<Arc<Meter>, FacadeError> {
        self.get_or_create(
            name,
            || Instrument::Meter(Arc::default()),
            |instrument| match instrument {
                Instrument::Meter(meter) => Some(Arc::clone(meter)),
                _ => None,
            },
        )
    }

    /// Returns the histogram `name`, creating it if necessary.
    pub fn histogram(&self, name: &str) -> Result<Arc<Histogram>, FacadeError> {
        self.get_or_create(
            name,
            || Instrument::Histogram(Arc::default()),
            |instrument| match instrument {
                Instrument::Histogram(histogram) => Some(Arc::clone(histogram)),
                _ => None,
            },
        )
    }

    /// Returns the timer `name`, creating it if necessary.
    pub fn timer(&self, name: &str) -> Result<Arc<Timer>, FacadeError> {
        self.get_or_create(
            name,
            || Instrument::Timer(Arc::default()),
            |instrument| match instrument {
                Instrument::Timer(timer) => Some(Arc::clone(timer)),
                _ => None,
            },
        )
    }

    /// Registers a gauge that calls `gauge` on every collection.
    ///
    /// If a gauge is already registered under `name`, it is kept and `gauge` is dropped.
    pub fn register_gauge<F>(&self, name: &str, gauge: F) -> Result<(), FacadeError>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.get_or_create(
            name,
            || Instrument::Gauge(Box::new(gauge)),
            |instrument| match instrument {
                Instrument::Gauge(_) => Some(()),
                _ => None,
            },
        )
    }

    fn get_or_create<T>(
        &self,
        name: &str,
        create: impl FnOnce() -> Instrument,
        extract: impl FnOnce(&Instrument) -> Option<T>,
    ) -> Result<T, FacadeError> {
        let mut instruments = self.instruments.write();
        let instrument = instruments.entry(name.to_owned()).or_insert_with(create);
        extract(instrument).ok_or_else(|| FacadeError {
            name: name.to_owned(),
            existing: instrument.kind(),
        })
    }

    /// Returns the number of registered instruments.
    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    /// Returns `true` if no instrument has been registered.
    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }

    /// Serializes all instruments into a mapping in registration order.
    ///
    /// Counters and gauges are numbers. Meters, histograms, and timers are mappings of their
    /// statistics.
    pub fn value(&self) -> DataValue {
        self.instruments
            .read()
            .iter()
            .map(|(name, instrument)| (name.as_str(), instrument.value()))
            .collect()
    }

    /// Returns the data point to publish for the current reporting cycle.
    pub fn data_point(&self) -> RawDataPoint {
        RawDataPoint::new(FACADE_METRIC_NAME, self.value())
    }
}

impl fmt::Debug for MetricsFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instruments = self.instruments.read();
        f.debug_map()
            .entries(
                instruments
                    .iter()
                    .map(|(name, instrument)| (name, instrument.kind())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::filter::MetricFilter;
    use crate::pipeline::ReportingPipeline;
    use crate::processor::{MetricProcessor, ProcessError};
    use crate::protocol::{MetricValue, TaskContext};

    struct Discard;

    impl MetricProcessor for Discard {
        fn name(&self, metric: &MetricValue, _task: &TaskContext) -> String {
            metric.name()
        }

        fn process(&self, _metric: &MetricValue, _task: &TaskContext) -> Result<(), ProcessError> {
            Ok(())
        }
    }

    fn task() -> TaskContext {
        TaskContext {
            source_component_id: "__bolt".to_owned(),
            source_worker_host: "worker-1".to_owned(),
            source_worker_port: 6700,
            source_task_id: 2,
            timestamp: 0,
            update_interval_secs: 60,
        }
    }

    #[test]
    fn test_counter() {
        let counter = Counter::default();
        counter.inc();
        counter.inc_by(5);
        counter.dec();
        assert_eq!(counter.count(), 5);
    }

    #[test]
    fn test_meter_rates() {
        let start = Instant::now();
        let meter = Meter::starting_at(start);

        meter.mark_at(60, start);
        let first = meter.snapshot_at(start + TICK_INTERVAL);
        assert_eq!(
            first,
            MeterSnapshot {
                count: 60,
                mean_rate: 12.0,
                one_minute_rate: 12.0,
                five_minute_rate: 12.0,
                fifteen_minute_rate: 12.0,
            }
        );

        let second = meter.snapshot_at(start + 2 * TICK_INTERVAL);
        let decayed = 12.0 * (-5.0f64 / 60.0).exp();
        assert!((second.one_minute_rate - decayed).abs() < 1e-9);
        assert!(second.one_minute_rate < second.five_minute_rate);
        assert!(second.five_minute_rate < second.fifteen_minute_rate);
        assert_eq!(second.mean_rate, 6.0);
    }

    #[test]
    fn test_meter_without_ticks() {
        let start = Instant::now();
        let meter = Meter::starting_at(start);
        meter.mark_at(3, start);

        let snapshot = meter.snapshot_at(start);
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.mean_rate, 0.0);
        assert_eq!(snapshot.one_minute_rate, 0.0);
    }

    #[test]
    fn test_histogram() {
        let histogram = Histogram::new();
        for value in [4.0, 1.0, 3.0, 2.0] {
            histogram.update(value);
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count, 4);
        assert_eq!(snapshot.min, 1.0);
        assert_eq!(snapshot.max, 4.0);
        assert!((snapshot.mean - 2.5).abs() < 1e-12);
        assert_eq!(snapshot.median, 2.5);
        assert_eq!(snapshot.p75, 3.75);
        assert_eq!(snapshot.p95, 4.0);
        assert_eq!(snapshot.p99, 4.0);
        assert!((snapshot.stddev - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_histogram_empty() {
        let snapshot = Histogram::new().snapshot();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.median, 0.0);
        assert_eq!(snapshot.stddev, 0.0);
    }

    #[test]
    fn test_histogram_reservoir_is_bounded() {
        let histogram = Histogram::new();
        for value in 0..5000 {
            histogram.update(f64::from(value));
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count, 5000);
        assert_eq!(snapshot.max, 4999.0);
        assert_eq!(histogram.state.lock().samples.len(), RESERVOIR_SIZE);
    }

    #[test]
    fn test_timer_records_milliseconds() {
        let timer = Timer::new();
        timer.update(Duration::from_millis(250));
        assert_eq!(timer.time(|| 7), 7);

        let snapshot = timer.snapshot();
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.max, 250.0);
    }

    #[test]
    fn test_same_name_returns_same_instrument() {
        let facade = MetricsFacade::new();
        facade.counter("acks").unwrap().inc();
        facade.counter("acks").unwrap().inc();

        assert_eq!(facade.len(), 1);
        assert_eq!(facade.counter("acks").unwrap().count(), 2);
    }

    #[test]
    fn test_kind_mismatch() {
        let facade = MetricsFacade::new();
        facade.counter("acks").unwrap();

        let error = facade.histogram("acks").unwrap_err();
        assert_eq!(
            error.to_string(),
            r#"metric "acks" is already registered as a counter"#
        );
    }

    #[test]
    fn test_first_gauge_wins() {
        let facade = MetricsFacade::new();
        facade.register_gauge("pending", || 1.0).unwrap();
        facade.register_gauge("pending", || 2.0).unwrap();

        assert_eq!(
            facade.value(),
            DataValue::from_iter([("pending", DataValue::Number(1.0))])
        );
    }

    #[test]
    fn test_flattened_through_pipeline() {
        let facade = MetricsFacade::new();
        facade.counter("emitted").unwrap().inc_by(3);
        let latency = facade.histogram("latency").unwrap();
        for value in [4.0, 1.0, 3.0, 2.0] {
            latency.update(value);
        }
        facade.meter("acks").unwrap().mark_n(2);
        facade.timer("flush").unwrap().update(Duration::from_millis(10));
        facade.register_gauge("pending", || 7.0).unwrap();

        let pipeline = ReportingPipeline::new(MetricFilter::new(".*").unwrap(), Box::new(Discard));
        let metrics = pipeline.collect_metrics(&[facade.data_point()], &task());

        let names: Vec<_> = metrics.iter().map(MetricValue::name).collect();
        insta::assert_debug_snapshot!(names, @r###"
        [
            "bolt.YammerFacadeMetric.emitted",
            "bolt.YammerFacadeMetric.latency.75percentile",
            "bolt.YammerFacadeMetric.latency.95percentile",
            "bolt.YammerFacadeMetric.latency.99percentile",
            "bolt.YammerFacadeMetric.latency.median",
            "bolt.YammerFacadeMetric.latency.mean",
            "bolt.YammerFacadeMetric.latency.min",
            "bolt.YammerFacadeMetric.latency.max",
            "bolt.YammerFacadeMetric.latency.stddev",
            "bolt.YammerFacadeMetric.acks.count",
            "bolt.YammerFacadeMetric.acks.meanRate",
            "bolt.YammerFacadeMetric.acks.1MinuteRate",
            "bolt.YammerFacadeMetric.acks.5MinuteRate",
            "bolt.YammerFacadeMetric.acks.15MinuteRate",
            "bolt.YammerFacadeMetric.flush.count",
            "bolt.YammerFacadeMetric.flush.median",
            "bolt.YammerFacadeMetric.flush.75percentile",
            "bolt.YammerFacadeMetric.flush.95percentile",
            "bolt.YammerFacadeMetric.flush.99percentile",
            "bolt.YammerFacadeMetric.pending",
        ]
        "###);

        let value_of = |name: &str| {
            metrics
                .iter()
                .find(|metric| metric.name() == name)
                .map(MetricValue::value)
        };
        assert_eq!(value_of("bolt.YammerFacadeMetric.emitted"), Some(3.0));
        assert_eq!(
            value_of("bolt.YammerFacadeMetric.latency.95percentile"),
            Some(4.0)
        );
        assert_eq!(value_of("bolt.YammerFacadeMetric.acks.count"), Some(2.0));
        assert_eq!(value_of("bolt.YammerFacadeMetric.pending"), Some(7.0));
    }
}
