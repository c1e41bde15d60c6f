//! # Fault Ring
//!
//! In-process fault reporting: classification, deduplication, bounded
//! backtraces and a queryable buffer of recent messages.
//!
//! ## Design
//!
//! 1. **One context object.** All mutable state (the message ring, counters,
//!    the last occurrence, the mute lock) lives in a [`Reporter`] that the
//!    host constructs once and shares. Nothing is global except the panic
//!    hook installed by [`install`].
//! 2. **Faults never propagate.** Every fault is recovered inside the
//!    handler; the only unrecoverable path is explicit fatal reporting.
//! 3. **Traces never leak.** Backtraces render argument *types* for
//!    objects, cap the values visited per frame, and collapse deep nesting.
//! 4. **Quiet loops.** A fault repeating at the same site is stored once and
//!    summarised as `[last message repeated N times]` in the log.
//!
//! ## Quick Start
//!
//! ```rust
//! use fault_ring::{Reporter, ReporterConfig, Severity, SeverityMask};
//!
//! let reporter = Reporter::new(ReporterConfig::default().with_verbosity(0)).unwrap();
//!
//! reporter.add_error("disk full");
//! reporter.add_warning("retrying");
//!
//! let errors = reporter.flush(Some(SeverityMask::ERROR));
//! assert_eq!(errors.len(), 1);
//! assert_eq!(reporter.worst_severity(), Severity::Warning);
//! ```
//!
//! ## Runtime Faults
//!
//! ```rust
//! use fault_ring::{Disposition, Reporter, ReporterConfig, Severity};
//!
//! let reporter = Reporter::new(ReporterConfig::default().with_verbosity(0)).unwrap();
//! let d = reporter.handle_error(Severity::Warning, "short read", Some("src/io.rs"), Some(12));
//! assert_eq!(d, Disposition::Reported);
//!
//! // The same site again is folded into the first occurrence.
//! let d = reporter.handle_error(Severity::Warning, "short read", Some("src/io.rs"), Some(12));
//! assert_eq!(d, Disposition::Collapsed);
//! ```
//!
//! ## Features
//!
//! - `trusted_debug`: detailed-debug backtrace rendering on by default

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::io;
use std::result;
use thiserror::Error;

pub mod backtrace;
pub mod caller;
pub mod config;
pub mod convenience;
pub mod frames;
pub mod hook;
pub mod logging;
pub mod models;
pub mod notify;
pub mod reporter;
pub mod ring_buffer;
pub mod severity;
pub mod suppression;

pub use backtrace::BacktraceRenderer;
pub use caller::*;
pub use config::*;
pub use convenience::*;
pub use frames::*;
pub use hook::install;
pub use logging::{LogFile, LogSink, MemoryLog, MemorySink, OutputSink};
pub use models::*;
pub use notify::{Notification, NotificationTransport, RecordingTransport, RequestContext};
pub use reporter::*;
pub use ring_buffer::{AppendOutcome, MessageRing};
pub use severity::*;
pub use suppression::*;

/// Type alias for results carrying a [`ReporterError`].
pub type Result<T> = result::Result<T, ReporterError>;

/// Failures on the configuration and registration surfaces.
///
/// Fault handling itself never returns these; sink and transport failures
/// are logged through `tracing` and swallowed.
#[derive(Debug, Error)]
pub enum ReporterError {
    /// A raw severity value that is not exactly one recognised kind.
    #[error("invalid error class {0:#04x}")]
    InvalidSeverity(u8),

    /// A suppression file glob that does not compile.
    #[error("invalid file pattern `{pattern}`")]
    InvalidPattern {
        /// The glob as given.
        pattern: String,
        /// Compilation failure of the translated expression.
        #[source]
        source: regex::Error,
    },

    /// The persistent log could not be opened or written.
    #[error("log sink: {0}")]
    LogSink(#[from] io::Error),

    /// A backtrace offset past the end of the stack.
    #[error("{offset}: stack depth out of bounds (depth {depth})")]
    InvalidOffset {
        /// Requested offset.
        offset: usize,
        /// Frames available.
        depth: usize,
    },

    /// A notification transport failed to deliver.
    #[error("notification transport: {0}")]
    Transport(String),
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn error_messages() {
        assert_eq!(
            ReporterError::InvalidSeverity(0x18).to_string(),
            "invalid error class 0x18"
        );
        assert_eq!(
            ReporterError::InvalidOffset { offset: 4, depth: 2 }.to_string(),
            "4: stack depth out of bounds (depth 2)"
        );
    }

    #[test]
    fn pattern_error_keeps_source() {
        let err = FileGlob::new("[oops").unwrap_err();
        assert!(err.to_string().contains("[oops"));
        assert!(err.source().is_some());
    }

    #[test]
    fn io_errors_convert() {
        let err: ReporterError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, ReporterError::LogSink(_)));
    }

    #[test]
    fn reporter_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Reporter>();
        assert_send_sync::<MessageRing>();
    }
}
