//! Sanitization and joining of metric name fragments.

/// The canonical separator between metric name fragments.
pub const FRAGMENT_SEPARATOR: &str = ".";

/// Marker that is removed from name fragments entirely.
const NOISE: &str = "__";

/// Removes restricted characters from a metric name fragment.
///
/// Applied in order, to all occurrences:
///
///  1. The double underscore marker is deleted.
///  2. Path separators (`/`) become dots.
///  3. Colons become underscores, since downstream naming schemes (such as JMX object names)
///     reserve them.
///
/// # Example
///
/// ```
/// use stormrelay_metrics::clean;
///
/// assert_eq!(clean("__system"), "system");
/// assert_eq!(clean("a/b:c"), "a.b_c");
/// ```
pub fn clean(fragment: &str) -> String {
    fragment
        .replace(NOISE, "")
        .replace('/', FRAGMENT_SEPARATOR)
        .replace(':', "_")
}

/// Joins metric name fragments with the [canonical separator](FRAGMENT_SEPARATOR).
///
/// The fragments are not sanitized. Empty fragments keep their position, so they produce
/// consecutive separators.
///
/// # Example
///
/// ```
/// use stormrelay_metrics::join_fragments;
///
/// assert_eq!(join_fragments(["execute-count", "default"]), "execute-count.default");
/// assert_eq!(join_fragments(["a", "", "b"]), "a..b");
/// ```
pub fn join_fragments<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut joined = String::new();

    for (index, fragment) in fragments.into_iter().enumerate() {
        if index > 0 {
            joined.push_str(FRAGMENT_SEPARATOR);
        }
        joined.push_str(fragment.as_ref());
    }

    joined
}
