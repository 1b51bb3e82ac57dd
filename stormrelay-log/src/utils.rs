use std::error::Error;
use std::fmt;

/// Logs an error, or prints it to `stderr` while logging is not initialized.
///
/// Used for errors that abort the process, which may happen before [`init`](crate::init).
///
/// # Example
///
/// ```
/// let error: Box<dyn std::error::Error> = "config directory not found".into();
/// stormrelay_log::ensure_error(error);
/// ```
#[allow(clippy::print_stderr)]
pub fn ensure_error<E: AsRef<dyn Error>>(error: E) {
    let error = LogError(error.as_ref());
    if tracing::event_enabled!(tracing::Level::ERROR) {
        crate::error!("{error}");
    } else {
        eprintln!("error: {error}");
    }
}

/// Displays an [`Error`] followed by its sources, one per line.
///
/// ```
/// use stormrelay_log::LogError;
///
/// let error = std::io::Error::other("connection refused");
/// assert_eq!(LogError(&error).to_string(), "connection refused");
/// ```
pub struct LogError<'a, E: Error + ?Sized>(pub &'a E);

impl<E: Error + ?Sized> fmt::Display for LogError<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;

        let mut source = self.0.source();
        while let Some(cause) = source {
            write!(f, "\n  caused by: {cause}")?;
            source = cause.source();
        }
        Ok(())
    }
}
