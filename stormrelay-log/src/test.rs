use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

#[doc(hidden)]
pub fn __init_test(module_path: &'static str) {
    let crate_name = module_path.split("::").next().unwrap_or(module_path);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("{crate_name}=trace")))
        .with_test_writer()
        .with_target(true)
        .compact()
        .try_init()
        .ok();
}

/// Initialize the logger for testing.
///
/// This logs to the stdout registered by the Rust test runner, and only captures logs from the
/// calling crate.
///
/// # Example
///
/// ```
/// stormrelay_log::init_test!();
/// ```
#[macro_export]
macro_rules! init_test {
    () => {
        $crate::__init_test(::std::module_path!());
    };
}

#[derive(Clone, Debug, Default)]
struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a subscriber scoped to the current thread and returns the lines it logged.
///
/// All levels are captured. Lines use the compact format without timestamps or colors, for
/// instance ` WARN stormrelay::replay: skipping malformed reporting cycle line=2`.
pub fn with_captured_logs<F, R>(f: F) -> (R, Vec<String>)
where
    F: FnOnce() -> R,
{
    let writer = CaptureWriter::default();
    let make_writer = {
        let writer = writer.clone();
        move || writer.clone()
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("trace"))
        .with_writer(make_writer)
        .with_ansi(false)
        .without_time()
        .compact()
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let lines = String::from_utf8_lossy(&writer.0.lock())
        .lines()
        .map(str::to_owned)
        .collect();

    (result, lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_logs() {
        let (value, lines) = with_captured_logs(|| {
            crate::warn!(line = 2, "skipping input");
            crate::debug!("cycle done");
            42
        });

        assert_eq!(value, 42);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].trim_start().starts_with("WARN"));
        assert!(lines[0].contains("skipping input line=2"));
        assert!(lines[1].trim_start().starts_with("DEBUG"));
    }
}
