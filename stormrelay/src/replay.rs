use std::error::Error;
use std::io::{self, BufRead};

use stormrelay_metrics::{ReportingCycle, ReportingPipeline};

/// Number of reporting cycles read from an input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Cycles passed to the pipeline.
    pub cycles: usize,
    /// Malformed lines that were skipped.
    pub skipped: usize,
}

/// Feeds newline-delimited JSON reporting cycles into the pipeline.
///
/// Blank lines are ignored. Lines that do not parse as a [`ReportingCycle`] are logged and
/// skipped. Only read errors abort the replay.
pub fn replay<R: BufRead>(reader: R, pipeline: &ReportingPipeline) -> io::Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<ReportingCycle>(&line) {
            Ok(cycle) => {
                pipeline.handle_cycle(&cycle.data_points, &cycle.task);
                summary.cycles += 1;
            }
            Err(error) => {
                stormrelay_log::warn!(
                    error = &error as &dyn Error,
                    line = index + 1,
                    "skipping malformed reporting cycle"
                );
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use stormrelay_metrics::{GaugeRegistry, MetricFilter};
    use stormrelay_processors::SimpleProcessor;

    use super::*;

    fn pipeline(gauges: &Arc<GaugeRegistry>) -> ReportingPipeline {
        ReportingPipeline::new(
            MetricFilter::new(".*").unwrap(),
            Box::new(SimpleProcessor::new(Arc::clone(gauges))),
        )
    }

    #[test]
    fn test_replay_cycles() {
        stormrelay_log::init_test!();

        let gauges = Arc::new(GaugeRegistry::new());
        let input = r#"{"task":{"source_component_id":"__split","source_worker_host":"w1","source_worker_port":6700,"source_task_id":3,"timestamp":0,"update_interval_secs":10},"data_points":[{"name":"__execute-count","value":{"default":100}},{"name":"__execute-latency","value":{"default":0.5}}]}

not json
{"task":{"source_component_id":"count","source_worker_host":"w1","source_worker_port":6700,"source_task_id":4,"timestamp":0,"update_interval_secs":10},"data_points":[{"name":"emit-count","value":"n/a"},{"name":"ack-count","value":2}]}
"#;

        let summary = replay(Cursor::new(input), &pipeline(&gauges)).unwrap();

        assert_eq!(
            summary,
            ReplaySummary {
                cycles: 2,
                skipped: 1
            }
        );
        insta::assert_debug_snapshot!(gauges.snapshot(), @r###"
        {
            "w1.6700.count.4.ack-count": 2.0,
            "w1.6700.split.3.execute-capacity.default": 0.005,
            "w1.6700.split.3.execute-count.default": 100.0,
            "w1.6700.split.3.execute-latency.default": 0.5,
        }
        "###);
    }

    #[test]
    fn test_replay_warns_on_malformed_line() {
        let gauges = Arc::new(GaugeRegistry::new());
        let input = "\n{\"task\": 1}\n";

        let (summary, lines) =
            stormrelay_log::with_captured_logs(|| replay(Cursor::new(input), &pipeline(&gauges)));

        assert_eq!(summary.unwrap().skipped, 1);
        let skipped: Vec<_> = lines
            .iter()
            .filter(|line| line.contains("skipping malformed reporting cycle"))
            .collect();
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].trim_start().starts_with("WARN"));
        assert!(skipped[0].contains("line=2"));
    }

    #[test]
    fn test_replay_empty() {
        let gauges = Arc::new(GaugeRegistry::new());
        let summary = replay(Cursor::new(""), &pipeline(&gauges)).unwrap();

        assert_eq!(summary, ReplaySummary::default());
        assert!(gauges.is_empty());
    }

    #[test]
    fn test_replay_missing_data_points() {
        let gauges = Arc::new(GaugeRegistry::new());
        let input = r#"{"task":{"source_component_id":"split","source_worker_host":"w1","source_worker_port":6700,"source_task_id":1,"timestamp":0,"update_interval_secs":10}}"#;

        let summary = replay(Cursor::new(input), &pipeline(&gauges)).unwrap();

        assert_eq!(summary.cycles, 1);
        assert!(gauges.is_empty());
    }
}
