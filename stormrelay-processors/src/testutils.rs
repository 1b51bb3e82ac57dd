use stormrelay_metrics::TaskContext;

pub fn task(task_id: i32) -> TaskContext {
    TaskContext {
        source_component_id: "__counter".to_owned(),
        source_worker_host: "worker-1".to_owned(),
        source_worker_port: 6700,
        source_task_id: task_id,
        timestamp: 1_700_000_000_000,
        update_interval_secs: 60,
    }
}
