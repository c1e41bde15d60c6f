//! Severity classification - maps fault kinds to names and bitmask groups.
//!
//! Every record in the message ring carries exactly one [`Severity`]. The
//! numeric value of each kind doubles as a single-bit mask so the ring can
//! track "worst severity seen" with a bitwise OR and filter with a bitwise
//! AND.
//!
//! # Ordering
//!
//! ```text
//! Ok(0x00) < Debug(0x01) < Deprecated(0x02) < Info(0x04)
//!          < Warning(0x08) < Error(0x10) < Fatal(0x20)
//!
//! Exception(0x40)  Report(0x80)   <- out-of-band markers
//! ```
//!
//! `Exception` and `Report` are not part of the severity ladder used by
//! [`worst_severity`](crate::MessageRing::worst_severity), but they still
//! compare numerically so downgrade clamping treats them as "above" any
//! ceiling on the ladder.
//!
//! # Verbosity gate
//!
//! Whether a record is echoed to the console (and gets a rendered backtrace)
//! depends on the runtime verbosity:
//!
//! ```text
//! verbose(sev) = verbosity > 0 && VERBOSE_LEVELS - verbosity < log2(sev)
//! ```
//!
//! With the default verbosity of 1 only Error and above pass the gate.

use crate::ReporterError;
use bitflags::bitflags;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

/// Number of verbosity steps between "errors only" and "everything".
pub const VERBOSE_LEVELS: u8 = 4;

// ============================================================================
// Severity Mask
// ============================================================================

bitflags! {
    /// Bitmask over severities, used for buffer filters, callback
    /// registration, suppression rules and the host reporting mask.
    ///
    /// `Ok` has no bit: it can never be selected by a filter and never
    /// contributes to the accumulator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SeverityMask: u8 {
        /// Debug output.
        const DEBUG = 0x01;
        /// Deprecated paths.
        const DEPRECATED = 0x02;
        /// Informational.
        const INFO = 0x04;
        /// Warnings.
        const WARNING = 0x08;
        /// Errors.
        const ERROR = 0x10;
        /// Fatal faults.
        const FATAL = 0x20;
        /// Exceptions.
        const EXCEPTION = 0x40;
        /// Internal reports.
        const REPORT = 0x80;
    }
}

impl SeverityMask {
    /// Every severity, the default reporting mask and emit ceiling.
    pub const ALL: Self = Self::all();

    /// Whether `severity` has its bit set in this mask.
    #[inline]
    pub const fn admits(self, severity: Severity) -> bool {
        self.bits() & severity.bits() != 0
    }
}

impl From<Severity> for SeverityMask {
    #[inline]
    fn from(severity: Severity) -> Self {
        severity.mask()
    }
}

// ============================================================================
// Severity
// ============================================================================

/// Classification of a reported fault.
///
/// The discriminant is the bit value. Ordering follows the numeric value,
/// so `Severity::Fatal > Severity::Error` holds and downgrade clamping can
/// use plain comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Severity {
    /// Success marker, recorded by `add_success`.
    #[default]
    Ok = 0x00,
    /// Developer chatter.
    Debug = 0x01,
    /// Use of a deprecated path.
    Deprecated = 0x02,
    /// Informational.
    Info = 0x04,
    /// Recoverable problem, subject to muting.
    Warning = 0x08,
    /// Recorded failure, does not stop control flow.
    Error = 0x10,
    /// Terminates the process after best-effort reporting.
    Fatal = 0x20,
    /// Fault carrying a causing object with its own captured trace.
    Exception = 0x40,
    /// Developer-triggered out-of-band report.
    Report = 0x80,
}

impl Severity {
    /// Every kind, lowest first.
    pub const ALL: [Severity; 9] = [
        Severity::Ok,
        Severity::Debug,
        Severity::Deprecated,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Fatal,
        Severity::Exception,
        Severity::Report,
    ];

    /// Raw bit value.
    #[inline]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Single-bit mask for this kind (empty for `Ok`).
    #[inline]
    pub const fn mask(self) -> SeverityMask {
        SeverityMask::from_bits_retain(self.bits())
    }

    /// Convert a raw value back into a kind.
    ///
    /// Returns `None` for values that are not exactly one recognised kind
    /// (multi-bit masks included).
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(Self::Ok),
            0x01 => Some(Self::Debug),
            0x02 => Some(Self::Deprecated),
            0x04 => Some(Self::Info),
            0x08 => Some(Self::Warning),
            0x10 => Some(Self::Error),
            0x20 => Some(Self::Fatal),
            0x40 => Some(Self::Exception),
            0x80 => Some(Self::Report),
            _ => None,
        }
    }

    /// Whether this kind sits on the ordered ladder (everything except the
    /// `Exception` and `Report` markers).
    #[inline]
    pub const fn is_ordered(self) -> bool {
        !matches!(self, Self::Exception | Self::Report)
    }

    /// Upper-case display name used in console lines and notification
    /// subjects.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Debug => "DEBUG",
            Self::Deprecated => "DEPRECATED",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Exception => "EXCEPTION",
            Self::Report => "INTERNAL REPORT",
        }
    }

    /// Lower-case type name (`""` for `Ok`).
    pub const fn error_type(self) -> &'static str {
        match self {
            Self::Ok => "",
            Self::Debug => "debug",
            Self::Deprecated => "deprecated",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Exception => "exception",
            Self::Report => "report",
        }
    }

    /// Base-2 log of the bit value, `None` for `Ok`.
    #[inline]
    pub const fn level(self) -> Option<u32> {
        self.bits().checked_ilog2()
    }

    /// Verbosity gate: whether this kind is echoed (with backtrace) at the
    /// given verbosity.
    pub const fn is_verbose_at(self, verbosity: u8) -> bool {
        if verbosity == 0 {
            return false;
        }
        match self.level() {
            Some(level) => (VERBOSE_LEVELS as i32 - verbosity as i32) < level as i32,
            None => false,
        }
    }

    /// Clamp this kind to at most `ceiling`. Never raises.
    #[inline]
    pub fn clamp_to(self, ceiling: Severity) -> Severity {
        if self > ceiling { ceiling } else { self }
    }
}

impl PartialOrd for Severity {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.bits().cmp(&other.bits())
    }
}

impl TryFrom<u8> for Severity {
    type Error = ReporterError;

    fn try_from(bits: u8) -> Result<Self, ReporterError> {
        Self::from_bits(bits).ok_or(ReporterError::InvalidSeverity(bits))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Display name for a raw value that may not be a recognised kind.
///
/// Unknown values render as `UNKNOWN (<hex>)`.
pub fn raw_display_name(bits: u8) -> Cow<'static, str> {
    match Severity::from_bits(bits) {
        Some(severity) => Cow::Borrowed(severity.display_name()),
        None => Cow::Owned(format!("UNKNOWN ({:x})", bits)),
    }
}
