use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use stormrelay_metrics::{
    DataValue, MetricFilter, MetricProcessor, MetricValue, ProcessError, RawDataPoint,
    ReportingPipeline, TaskContext, flatten,
};

/// Builds a mapping with `width` keys per level, nested `depth` levels deep.
fn nested_value(width: usize, depth: usize) -> DataValue {
    if depth == 0 {
        return DataValue::Number(1.0);
    }

    (0..width)
        .map(|index| (format!("__stream/{index}:x"), nested_value(width, depth - 1)))
        .collect()
}

struct Discard;

impl MetricProcessor for Discard {
    fn name(&self, metric: &MetricValue, _task: &TaskContext) -> String {
        metric.name()
    }

    fn process(&self, metric: &MetricValue, _task: &TaskContext) -> Result<(), ProcessError> {
        black_box(metric);
        Ok(())
    }
}

fn bench_flatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten");

    for (width, depth) in [(10, 1), (100, 1), (10, 3)] {
        let data_point = RawDataPoint::new("__execute-latency", nested_value(width, depth));
        let input_name = format!("{width}x{depth}");

        group.bench_with_input(
            BenchmarkId::from_parameter(input_name),
            &data_point,
            |b, data_point| b.iter(|| flatten(black_box(data_point), "bolt")),
        );
    }

    group.finish();
}

fn bench_handle_cycle(c: &mut Criterion) {
    let task = TaskContext {
        source_component_id: "__system".to_owned(),
        source_worker_host: "worker-1".to_owned(),
        source_worker_port: 6700,
        source_task_id: 4,
        timestamp: 1_700_000_000_000,
        update_interval_secs: 60,
    };

    let mut data_points = vec![
        RawDataPoint::new("execute-count", nested_value(20, 1)),
        RawDataPoint::new("execute-latency", nested_value(20, 1)),
    ];
    data_points.extend((0..50).map(|index| RawDataPoint::new(format!("gauge-{index}"), 3.0)));

    let mut group = c.benchmark_group("handle_cycle");

    for pattern in [".*", r"system\.execute-.*"] {
        let pipeline = ReportingPipeline::new(
            MetricFilter::new(pattern).unwrap(),
            Box::new(Discard),
        );

        group.bench_with_input(
            BenchmarkId::from_parameter(pattern),
            &pipeline,
            |b, pipeline| b.iter(|| pipeline.handle_cycle(black_box(&data_points), &task)),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_flatten, bench_handle_cycle);
criterion_main!(benches);
