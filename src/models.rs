//! Data model: faults as they arrive, records as they are stored.
//!
//! # Lifecycle
//!
//! ```text
//! Fault ──handle_fault──▶ LastOccurrence (repeat collapsing)
//!   │
//!   └──append──▶ ErrorRecord (message ring, immutable except downgrade)
//! ```
//!
//! Records use `Arc<str>` so that non-destructive reads of the ring clone
//! reference counts, not text.

use crate::{Cause, Severity};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Error Record
// ============================================================================

/// One classified occurrence stored in the message ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Post-format message, possibly prefixed with caller attribution.
    pub message: Arc<str>,
    /// Classification.
    pub severity: Severity,
    /// Resolved attribution (`Class::method` or `function`).
    pub caller: Arc<str>,
    /// Rendered backtrace, present only when the verbosity gate was met.
    pub backtrace: Option<Arc<str>>,
}

impl ErrorRecord {
    /// Record with unknown attribution and no backtrace, as handed to
    /// `merge`/`set_buffer` by hosts restoring a saved buffer.
    pub fn new(message: impl Into<Arc<str>>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            caller: Arc::from(crate::UNKNOWN_CALLER),
            backtrace: None,
        }
    }

    /// Set the attribution.
    pub fn with_caller(mut self, caller: impl Into<Arc<str>>) -> Self {
        self.caller = caller.into();
        self
    }
}

impl fmt::Display for ErrorRecord {
    /// `SEVERITY: message`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity.display_name(), self.message)
    }
}

/// A record whose severity arrived as a raw value (e.g. deserialized from a
/// saved buffer) and has not been validated yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    /// Message text.
    pub message: String,
    /// Unvalidated severity bits.
    pub severity: u8,
}

impl RawRecord {
    /// Raw record.
    pub fn new(message: impl Into<String>, severity: u8) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

impl From<&ErrorRecord> for RawRecord {
    fn from(record: &ErrorRecord) -> Self {
        Self::new(record.message.as_ref(), record.severity.bits())
    }
}

// ============================================================================
// Fault
// ============================================================================

/// A raw runtime fault entering the handler.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Fault {
    /// Kind of fault.
    pub severity: Severity,
    /// Message text.
    pub message: String,
    /// Originating file.
    pub file: Option<String>,
    /// Originating line.
    pub line: Option<u32>,
    /// Causing object (Exception and Report faults).
    pub cause: Option<Cause>,
}

impl Fault {
    /// Fault without location or cause.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Set the originating location.
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Attach the causing object.
    pub fn caused_by(mut self, cause: Cause) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Exception fault re-expressing `cause`: file, line and message are
    /// taken from the cause, which is attached as context.
    pub fn from_cause(cause: Cause) -> Self {
        Self {
            severity: Severity::Exception,
            message: cause.message.clone(),
            file: cause.file.clone(),
            line: cause.line,
            cause: Some(cause),
        }
    }

    /// `[file:line]` location suffix, empty when the file is unknown.
    pub fn location(&self) -> String {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => format!("[{}:{}]", file, line),
            (Some(file), None) => format!("[{}]", file),
            _ => String::new(),
        }
    }
}

/// Borrowed view of a fault after caller resolution, handed to report
/// filters and message callbacks.
#[derive(Clone, Copy, Debug)]
pub struct FaultView<'a> {
    /// Kind of fault.
    pub severity: Severity,
    /// Message text.
    pub message: &'a str,
    /// Originating file.
    pub file: Option<&'a str>,
    /// Originating line.
    pub line: Option<u32>,
    /// Resolved attribution.
    pub caller: &'a str,
    /// Causing object, if any.
    pub cause: Option<&'a Cause>,
}

impl<'a> FaultView<'a> {
    /// View of `fault` attributed to `caller`.
    pub fn new(fault: &'a Fault, caller: &'a str) -> Self {
        Self {
            severity: fault.severity,
            message: &fault.message,
            file: fault.file.as_deref(),
            line: fault.line,
            caller,
            cause: fault.cause.as_ref(),
        }
    }
}

// ============================================================================
// Last Occurrence
// ============================================================================

/// Sticky record of the most recently handled raw fault.
///
/// Exists only to collapse tight error loops into one record plus a
/// "repeated N times" log line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LastOccurrence {
    /// Originating file.
    pub file: Option<String>,
    /// Originating line.
    pub line: Option<u32>,
    /// Kind.
    pub severity: Severity,
    /// Message text.
    pub message: String,
    /// Number of identical faults collapsed since this one was stored.
    pub repeat_count: u32,
}

impl LastOccurrence {
    /// Snapshot of `fault` with a zero repeat counter.
    pub fn of(fault: &Fault) -> Self {
        Self {
            file: fault.file.clone(),
            line: fault.line,
            severity: fault.severity,
            message: fault.message.clone(),
            repeat_count: 0,
        }
    }

    /// Whether `fault` repeats this occurrence. With `match_message`, the
    /// message text must be identical too.
    pub fn is_repeat(&self, fault: &Fault, match_message: bool) -> bool {
        self.line == fault.line
            && self.file == fault.file
            && self.severity == fault.severity
            && (!match_message || self.message == fault.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_display_is_severity_prefixed() {
        let record = ErrorRecord::new("disk full", Severity::Error);
        assert_eq!(record.to_string(), "ERROR: disk full");
        assert_eq!(record.caller.as_ref(), "unknown");
    }

    #[test]
    fn fault_location_formats() {
        assert_eq!(Fault::new(Severity::Error, "x").location(), "");
        assert_eq!(
            Fault::new(Severity::Error, "x").at("db.rs", 9).location(),
            "[db.rs:9]"
        );
    }

    #[test]
    fn from_cause_copies_origin() {
        let cause = Cause {
            class: "io::Error".into(),
            message: "refused".into(),
            ..Cause::default()
        }
        .at("net.rs", 12);
        let fault = Fault::from_cause(cause);
        assert_eq!(fault.severity, Severity::Exception);
        assert_eq!(fault.message, "refused");
        assert_eq!(fault.line, Some(12));
        assert!(fault.cause.is_some());
    }

    #[test]
    fn repeat_detection_ignores_message_by_default() {
        let first = Fault::new(Severity::Warning, "a").at("f.rs", 1);
        let second = Fault::new(Severity::Warning, "b").at("f.rs", 1);
        let last = LastOccurrence::of(&first);
        assert!(last.is_repeat(&second, false));
        assert!(!last.is_repeat(&second, true));
        assert!(!last.is_repeat(&Fault::new(Severity::Error, "a").at("f.rs", 1), false));
    }
}
