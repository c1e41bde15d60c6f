//! The message ring: an ordered, drainable log of classified records.
//!
//! Despite the name this is not a fixed-capacity circular buffer. Records
//! accumulate until they are flushed or cleared. Alongside the records the
//! ring owns three pieces of buffer-wide state that are always reset
//! together:
//!
//! - per-severity counters (accepted appends since the last clear)
//! - the severity accumulator (bitwise OR of every appended kind)
//! - the tail position used for duplicate detection and `last_message`
//!
//! # Append gate
//!
//! ```text
//! append(message, severity)
//!   ├─ warnings muted and severity == Warning ──▶ Suppressed
//!   ├─ severity above the emit ceiling ────────▶ Suppressed
//!   ├─ (message, severity) equals the tail ────▶ AlreadyReported
//!   └─ push, count, accumulate ───────────────▶ Recorded
//! ```
//!
//! The ring performs no locking and no I/O. [`Reporter`](crate::Reporter)
//! keeps it behind its mutex and handles attribution and console echo.

use crate::{ErrorRecord, RawRecord, Result, Severity, SeverityMask};
use std::fmt::Write as _;

/// Result of an append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was stored.
    Recorded,
    /// Identical to the tail record; nothing stored.
    AlreadyReported,
    /// Swallowed by muting or the emit ceiling.
    Suppressed,
}

impl AppendOutcome {
    /// Whether a record was stored.
    #[inline]
    pub fn is_recorded(self) -> bool {
        self == Self::Recorded
    }
}

const COUNTER_SLOTS: usize = Severity::ALL.len();

#[inline]
fn slot(severity: Severity) -> usize {
    severity.level().map_or(0, |level| level as usize + 1)
}

/// Ordered record buffer with counters and the severity accumulator.
#[derive(Debug, Clone)]
pub struct MessageRing {
    records: Vec<ErrorRecord>,
    counters: [usize; COUNTER_SLOTS],
    accumulator: SeverityMask,
    current_index: Option<usize>,
    warnings_muted: bool,
    emit_ceiling: Severity,
}

impl Default for MessageRing {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            counters: [0; COUNTER_SLOTS],
            accumulator: SeverityMask::empty(),
            current_index: None,
            warnings_muted: false,
            emit_ceiling: Severity::Report,
        }
    }
}

impl MessageRing {
    /// Empty ring admitting every severity.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Gate
    // ------------------------------------------------------------------

    /// Whether warnings are currently swallowed.
    #[inline]
    pub fn warnings_muted(&self) -> bool {
        self.warnings_muted
    }

    /// Mute or unmute warnings. Ownership of the mute is tracked by the
    /// reporter; the ring only applies it.
    pub fn set_warnings_muted(&mut self, muted: bool) {
        self.warnings_muted = muted;
    }

    /// Current emit ceiling.
    #[inline]
    pub fn emit_ceiling(&self) -> Severity {
        self.emit_ceiling
    }

    /// Replace the emit ceiling, returning the previous one.
    pub fn set_emit_ceiling(&mut self, ceiling: Severity) -> Severity {
        std::mem::replace(&mut self.emit_ceiling, ceiling)
    }

    /// Outcome an append of `(message, severity)` would have without
    /// storing anything. `None` means it would be recorded.
    pub fn check(&self, message: &str, severity: Severity) -> Option<AppendOutcome> {
        if self.warnings_muted && severity == Severity::Warning {
            return Some(AppendOutcome::Suppressed);
        }
        if severity > self.emit_ceiling {
            return Some(AppendOutcome::Suppressed);
        }
        let tail = self.current_index.and_then(|i| self.records.get(i));
        if let Some(tail) = tail {
            if tail.severity == severity && tail.message.as_ref() == message {
                return Some(AppendOutcome::AlreadyReported);
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Append
    // ------------------------------------------------------------------

    /// Append a fully built record through the gate.
    pub fn push(&mut self, record: ErrorRecord) -> AppendOutcome {
        if let Some(outcome) = self.check(&record.message, record.severity) {
            return outcome;
        }
        self.insert(record)
    }

    /// Store `record` past the tail check only; mute and ceiling are the
    /// caller's concern.
    fn insert(&mut self, record: ErrorRecord) -> AppendOutcome {
        let tail = self.current_index.and_then(|i| self.records.get(i));
        if let Some(tail) = tail {
            if tail.severity == record.severity && tail.message == record.message {
                return AppendOutcome::AlreadyReported;
            }
        }
        self.counters[slot(record.severity)] += 1;
        self.accumulator |= record.severity.mask();
        self.records.push(record);
        self.current_index = Some(self.records.len() - 1);
        AppendOutcome::Recorded
    }

    /// Append a bare message with unknown attribution.
    pub fn append(&mut self, message: &str, severity: Severity) -> AppendOutcome {
        self.push(ErrorRecord::new(message, severity))
    }

    /// Checked append for severities arriving as raw values.
    ///
    /// # Errors
    ///
    /// [`ReporterError::InvalidSeverity`](crate::ReporterError::InvalidSeverity) if `bits` is not exactly one
    /// recognised kind. Nothing is stored in that case.
    pub fn append_raw(&mut self, message: &str, bits: u8) -> Result<AppendOutcome> {
        let severity = Severity::try_from(bits)?;
        Ok(self.append(message, severity))
    }

    /// Re-append `records` through the normal gate, keeping their
    /// attribution and backtraces.
    pub fn merge<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = ErrorRecord>,
    {
        for record in records {
            self.push(record);
        }
    }

    /// Re-append raw records, validating each severity. An unrecognised
    /// severity is reported through `tracing` and the message is stored
    /// under Warning.
    pub fn merge_raw<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = RawRecord>,
    {
        for raw in records {
            match Severity::from_bits(raw.severity) {
                Some(severity) => {
                    self.append(&raw.message, severity);
                }
                None => {
                    tracing::warn!(
                        severity = %crate::raw_display_name(raw.severity),
                        message = %raw.message,
                        "invalid error class in merged record"
                    );
                    self.append(&raw.message, Severity::Warning);
                }
            }
        }
    }

    /// Clear the ring, then merge `records`.
    pub fn set_buffer<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = ErrorRecord>,
    {
        self.clear(None);
        self.merge(records);
    }

    // ------------------------------------------------------------------
    // Drain
    // ------------------------------------------------------------------

    /// Records whose severity intersects `filter` (all records for `None`),
    /// oldest first. Non-destructive.
    pub fn peek(&self, filter: Option<SeverityMask>) -> Vec<ErrorRecord> {
        match filter {
            None => self.records.clone(),
            Some(mask) => self
                .records
                .iter()
                .filter(|r| mask.admits(r.severity))
                .cloned()
                .collect(),
        }
    }

    /// Return and remove matching records.
    ///
    /// Without a filter this also resets counters, the accumulator and the
    /// tail. With a filter only the filtered kinds lose their counters and
    /// accumulator bits.
    pub fn flush(&mut self, filter: Option<SeverityMask>) -> Vec<ErrorRecord> {
        match filter {
            None => {
                let drained = std::mem::take(&mut self.records);
                self.reset_state();
                drained
            }
            Some(mask) => {
                let (drained, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
                    .into_iter()
                    .partition(|r| mask.admits(r.severity));
                self.records = kept;
                self.forget(mask);
                drained
            }
        }
    }

    /// Remove matching records without returning them.
    pub fn clear(&mut self, filter: Option<SeverityMask>) {
        match filter {
            None => {
                self.records.clear();
                self.reset_state();
            }
            Some(mask) => {
                self.records.retain(|r| !mask.admits(r.severity));
                self.forget(mask);
            }
        }
    }

    fn reset_state(&mut self) {
        self.counters = [0; COUNTER_SLOTS];
        self.accumulator = SeverityMask::empty();
        self.current_index = None;
    }

    fn forget(&mut self, mask: SeverityMask) {
        for severity in Severity::ALL {
            if mask.admits(severity) {
                self.counters[slot(severity)] = 0;
            }
        }
        self.accumulator.remove(mask);
        self.current_index = self.records.len().checked_sub(1);
    }

    /// Flush everything, clamp each record to at most `ceiling`, store back.
    ///
    /// Severities are never raised. Records already held are kept even when
    /// warnings are muted or the emit ceiling is lower. Records that become
    /// identical to their predecessor after clamping collapse through the
    /// tail check.
    pub fn downgrade(&mut self, ceiling: Severity) {
        let softened: Vec<ErrorRecord> = self
            .flush(None)
            .into_iter()
            .map(|mut record| {
                record.severity = record.severity.clamp_to(ceiling);
                record
            })
            .collect();
        for record in softened {
            self.insert(record);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Error when an Error or Fatal record was accumulated, else Warning
    /// when a Warning was, else Ok.
    pub fn worst_severity(&self) -> Severity {
        if self.accumulator.intersects(SeverityMask::ERROR | SeverityMask::FATAL) {
            Severity::Error
        } else if self.accumulator.contains(SeverityMask::WARNING) {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }

    /// Accumulated severity bits.
    #[inline]
    pub fn accumulator(&self) -> SeverityMask {
        self.accumulator
    }

    /// Whether any bit of `mask` was accumulated.
    #[inline]
    pub fn has_severity(&self, mask: SeverityMask) -> bool {
        self.accumulator.intersects(mask)
    }

    /// Whether every bit of `mask` was accumulated.
    #[inline]
    pub fn is(&self, mask: SeverityMask) -> bool {
        self.accumulator.contains(mask)
    }

    /// Whether the ring holds an error.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.worst_severity() == Severity::Error
    }

    /// Accepted appends of `severity` since the last clear.
    #[inline]
    pub fn count(&self, severity: Severity) -> usize {
        self.counters[slot(severity)]
    }

    /// Message of the most recent record.
    pub fn last_message(&self) -> Option<&str> {
        self.current_index
            .and_then(|i| self.records.get(i))
            .map(|r| r.message.as_ref())
    }

    /// Messages of Error and Fatal records, empty unless [`is_error`](Self::is_error).
    pub fn errors(&self) -> Vec<String> {
        if !self.is_error() {
            return Vec::new();
        }
        self.records
            .iter()
            .filter(|r| matches!(r.severity, Severity::Error | Severity::Fatal))
            .map(|r| r.message.to_string())
            .collect()
    }

    /// Stored records, oldest first.
    #[inline]
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Number of stored records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ring is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Sort `records` by severity, highest first. Equal severities keep their
/// relative order.
pub fn sorted(mut records: Vec<ErrorRecord>) -> Vec<ErrorRecord> {
    records.sort_by(|a, b| b.severity.cmp(&a.severity));
    records
}

/// One `(SEVERITY): message` line per record.
pub fn format_buffer(records: &[ErrorRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let tag = format!("({})", record.severity.display_name());
        let _ = writeln!(out, "{:<8}: {}", tag, record.message);
    }
    out
}
