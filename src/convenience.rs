//! Severity-specific entry points and display helpers.
//!
//! Each macro formats its arguments with `format!` and forwards to the
//! matching [`Reporter`](crate::Reporter) method. The first argument is any
//! expression that derefs to a `Reporter` (`&Reporter`, `Arc<Reporter>`).
//!
//! ```rust
//! use fault_ring::{report_error, report_info, Reporter, ReporterConfig};
//!
//! let reporter = Reporter::new(ReporterConfig::default().with_verbosity(0)).unwrap();
//! let path = "/var/spool/queue";
//! report_error!(reporter, "cannot open {}", path);
//! report_info!(reporter, "{} jobs pending", 3);
//! assert_eq!(reporter.errors(), vec!["cannot open /var/spool/queue"]);
//! ```

use std::borrow::Cow;

/// Length used by [`truncate`] callers that have no preference.
pub const DEFAULT_TRUNCATE_LEN: usize = 80;

/// Marker appended to truncated strings.
pub const TRUNCATION_MARKER: &str = "...";

/// Cut `text` to its first `len` characters and append `...`. Strings of
/// at most `len` characters are returned unchanged.
///
/// ```rust
/// use fault_ring::truncate;
///
/// assert_eq!(truncate("a very long string indeed", 10), "a very lon...");
/// assert_eq!(truncate("short", 10), "short");
/// ```
pub fn truncate(text: &str, len: usize) -> Cow<'_, str> {
    match text.char_indices().nth(len) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&text[..cut]);
            out.push_str(TRUNCATION_MARKER);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(text),
    }
}

/// Escape `&<>"'` for inline HTML output.
///
/// ```rust
/// use fault_ring::html_escape;
///
/// assert_eq!(html_escape("f(\"<b>\")"), "f(&quot;&lt;b&gt;&quot;)");
/// ```
pub fn html_escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Report a fatal fault and exit the process.
#[macro_export]
macro_rules! report_fatal {
    ($reporter:expr, $($arg:tt)+) => {
        $reporter.trigger_fatal(&::std::format!($($arg)+))
    };
}

/// Record an error.
#[macro_export]
macro_rules! report_error {
    ($reporter:expr, $($arg:tt)+) => {
        $reporter.add_error(&::std::format!($($arg)+))
    };
}

/// Record a warning.
#[macro_export]
macro_rules! report_warn {
    ($reporter:expr, $($arg:tt)+) => {
        $reporter.add_warning(&::std::format!($($arg)+))
    };
}

/// Record an informational message.
#[macro_export]
macro_rules! report_info {
    ($reporter:expr, $($arg:tt)+) => {
        $reporter.add_info(&::std::format!($($arg)+))
    };
}

/// Record a debug message.
#[macro_export]
macro_rules! report_debug {
    ($reporter:expr, $($arg:tt)+) => {
        $reporter.add_debug(&::std::format!($($arg)+))
    };
}

/// Record use of a deprecated path.
#[macro_export]
macro_rules! report_deprecated {
    ($reporter:expr, $($arg:tt)+) => {
        $reporter.add_deprecated(&::std::format!($($arg)+))
    };
}

/// File an internal report with a synthetic backtrace.
#[macro_export]
macro_rules! report_internal {
    ($reporter:expr, $($arg:tt)+) => {
        $reporter.report(&::std::format!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Reporter, ReporterConfig, Severity, SyntheticStack};
    use std::sync::Arc;

    #[test]
    fn truncate_long_and_short() {
        let long = "a very long string indeed!";
        assert_eq!(long.chars().count(), 26);
        assert_eq!(truncate(long, 10), "a very lon...");
        assert!(matches!(truncate("12345", 10), Cow::Borrowed("12345")));
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("ééééé", 2), "éé...");
        assert_eq!(truncate("", 0), "");
        assert_eq!(truncate("x", 0), "...");
    }

    #[test]
    fn html_escape_covers_markup() {
        assert_eq!(
            html_escape("<script>alert('x') & \"y\"</script>"),
            "&lt;script&gt;alert(&#39;x&#39;) &amp; &quot;y&quot;&lt;/script&gt;"
        );
        assert!(matches!(html_escape("plain [a:1]"), Cow::Borrowed(_)));
    }

    #[test]
    fn macros_forward_to_reporter() {
        let reporter = Reporter::new(ReporterConfig::default().with_verbosity(0))
            .unwrap()
            .with_stack_source(Arc::new(SyntheticStack::default()));
        report_error!(reporter, "code {}", 7);
        report_warn!(&reporter, "slow {}", "disk");
        report_info!(reporter, "fyi");
        report_debug!(reporter, "x={}", 1);
        report_internal!(reporter, "odd {}", "state");
        let severities: Vec<Severity> = reporter.peek(None).iter().map(|r| r.severity).collect();
        assert_eq!(
            severities,
            vec![
                Severity::Error,
                Severity::Warning,
                Severity::Info,
                Severity::Debug,
                Severity::Report
            ]
        );
        assert_eq!(reporter.peek(None)[0].message.as_ref(), "code 7");
    }
}
