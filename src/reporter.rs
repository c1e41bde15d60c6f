//! The reporter: explicit context object owning every piece of mutable
//! reporting state, and the fault-handling pipeline built on it.
//!
//! # Fault pipeline
//!
//! ```text
//! handle_fault(fault)
//!   1. reporting mask excludes the kind ─────────────▶ Declined
//!   2. same file/line/kind as the last fault ────────▶ Collapsed
//!   3. frames: cause trace, else live snapshot
//!   4. caller resolution
//!   5. suppression chain veto ───────────────────────▶ Suppressed
//!   6. report filters ───────────────────────────────▶ Filtered
//!   7. message callbacks, newest first ──────────────▶ Preempted
//!   8. console echo (Fatal or verbose)
//!   9. notification (address set, under the cap)
//!  10. ring append, last message stored ─────────────▶ Reported
//! ```
//!
//! # Locking
//!
//! One mutex guards the state. Stack capture, frame filters, report
//! filters, message callbacks, sinks and the notification transport all run
//! with the lock released, so any of them may call back into the reporter.

use crate::backtrace::BacktraceRenderer;
use crate::logging::{LogFile, LogSink, OutputSink};
use crate::notify::{self, NotificationParts, NotificationTransport, RequestContext};
use crate::ring_buffer::{self, AppendOutcome, MessageRing};
use crate::{
    CallerResolver, Cause, ErrorRecord, Fault, FaultView, Frame, FrameFilter, HostEnvironment,
    LastOccurrence, NativeStack, RawRecord, ReportFilter, ReporterConfig, Result, Severity,
    SeverityMask, StackSource, SuppressionChain, SuppressionRule, html_escape,
};
use regex::Regex;
use smallvec::SmallVec;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Exit status used by every fatal path.
pub const FATAL_EXIT_CODE: i32 = 255;

static NEXT_MUTE_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Callbacks
// ============================================================================

/// Hook invoked for each fault whose kind matches its registration mask.
///
/// Returning `true` preempts everything after it: later callbacks, console
/// echo, notification and recording.
pub trait MessageCallback: Send + Sync {
    /// Inspect `fault`; `frames` is the trace it will be reported with.
    fn display(&self, fault: &FaultView<'_>, frames: &[Frame]) -> bool;
}

impl<F> MessageCallback for F
where
    F: Fn(&FaultView<'_>, &[Frame]) -> bool + Send + Sync,
{
    fn display(&self, fault: &FaultView<'_>, frames: &[Frame]) -> bool {
        self(fault, frames)
    }
}

#[derive(Clone)]
struct RegisteredCallback {
    mask: SeverityMask,
    callback: Arc<dyn MessageCallback>,
}

// ============================================================================
// Dispositions and Mute Tokens
// ============================================================================

/// What [`Reporter::handle_fault`] did with a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Excluded by the reporting mask; the host should apply its own
    /// default handling.
    Declined,
    /// Folded into the previous identical fault.
    Collapsed,
    /// Vetoed by a suppression rule.
    Suppressed,
    /// Dropped by a report filter.
    Filtered,
    /// A message callback took over.
    Preempted,
    /// Fully processed.
    Reported,
}

impl Disposition {
    /// Whether the host's default fault handling should be skipped.
    #[inline]
    pub fn is_handled(self) -> bool {
        !matches!(self, Self::Declined)
    }
}

/// Proof of warning-mute ownership, returned by
/// [`Reporter::mute_warnings`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "warnings stay muted until the token is passed to unmute_warnings"]
pub struct MuteToken {
    id: u64,
    site: &'static Location<'static>,
}

impl MuteToken {
    /// Where the mute was acquired.
    pub fn site(&self) -> &'static Location<'static> {
        self.site
    }
}

#[derive(Debug)]
struct MuteHolder {
    id: u64,
    site: &'static Location<'static>,
    saved_mask: Option<SeverityMask>,
}

// ============================================================================
// State
// ============================================================================

struct ReporterState {
    ring: MessageRing,
    last: Option<LastOccurrence>,
    verbosity: u8,
    reporting_mask: SeverityMask,
    suppression: SuppressionChain,
    resolver: Arc<CallerResolver>,
    callbacks: Vec<RegisteredCallback>,
    callback_mask: SeverityMask,
    filters: Vec<Arc<dyn ReportFilter>>,
    report_counter: u32,
    mute: Option<MuteHolder>,
    last_fault_message: Option<String>,
    request_context: Vec<RequestContext>,
}

impl ReporterState {
    fn new(config: &ReporterConfig) -> Self {
        let mut ring = MessageRing::new();
        ring.set_emit_ceiling(config.emit_ceiling);
        Self {
            ring,
            last: None,
            verbosity: config.verbosity,
            reporting_mask: config.reporting_mask,
            suppression: SuppressionChain::new(),
            resolver: Arc::new(CallerResolver::new(config.proxy_markers.clone())),
            callbacks: Vec::new(),
            callback_mask: SeverityMask::empty(),
            filters: Vec::new(),
            report_counter: 0,
            mute: None,
            last_fault_message: None,
            request_context: Vec::new(),
        }
    }

    #[inline]
    fn is_verbose(&self, severity: Severity) -> bool {
        severity.is_verbose_at(self.verbosity)
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Process-wide fault reporter.
///
/// Construct once at startup, share behind an `Arc`, and optionally
/// [`install`](crate::install) it as the panic hook.
///
/// ```rust
/// use fault_ring::{Reporter, ReporterConfig, Severity};
///
/// let reporter = Reporter::new(ReporterConfig::default().with_verbosity(0)).unwrap();
/// reporter.add_warning("cache miss storm");
/// reporter.add_error("disk full");
/// assert_eq!(reporter.worst_severity(), Severity::Error);
/// assert_eq!(reporter.flush(None).len(), 2);
/// ```
pub struct Reporter {
    state: Mutex<ReporterState>,
    config: ReporterConfig,
    stack: Arc<dyn StackSource>,
    renderer: BacktraceRenderer,
    output: OutputSink,
    error_output: OutputSink,
    log: Option<Arc<dyn LogSink>>,
    transport: Option<Arc<dyn NotificationTransport>>,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("config", &self.config)
            .field("renderer", &self.renderer)
            .field("has_log", &self.log.is_some())
            .field("has_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl Reporter {
    /// Reporter using the native stack, stdout for echo and stderr for
    /// fatal messages.
    ///
    /// # Errors
    ///
    /// [`ReporterError::LogSink`](crate::ReporterError::LogSink) if
    /// `config.log_path` cannot be opened.
    pub fn new(config: ReporterConfig) -> Result<Self> {
        let log: Option<Arc<dyn LogSink>> = match &config.log_path {
            Some(path) => Some(Arc::new(LogFile::open(path)?)),
            None => None,
        };
        let renderer = BacktraceRenderer::new()
            .with_detailed_debug(config.detailed_debug)
            .with_install_root(config.host.install_root.clone())
            .with_max_frames(config.max_frames);
        Ok(Self {
            state: Mutex::new(ReporterState::new(&config)),
            config,
            stack: Arc::new(NativeStack),
            renderer,
            output: OutputSink::stdout(),
            error_output: OutputSink::stderr(),
            log,
            transport: None,
        })
    }

    /// Replace the stack capability.
    pub fn with_stack_source(mut self, stack: Arc<dyn StackSource>) -> Self {
        self.stack = stack;
        self
    }

    /// Replace the console sink.
    pub fn with_output(mut self, output: OutputSink) -> Self {
        self.output = output;
        self
    }

    /// Replace the sink fatal messages are written to in console mode.
    pub fn with_error_output(mut self, output: OutputSink) -> Self {
        self.error_output = output;
        self
    }

    /// Replace the persistent log.
    pub fn with_log_sink(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    /// Set the notification transport.
    pub fn with_transport(mut self, transport: Arc<dyn NotificationTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Construction-time configuration.
    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    /// Host flags.
    pub fn host(&self) -> &HostEnvironment {
        &self.config.host
    }

    /// Return to the freshly constructed state. Registered rules,
    /// callbacks and filters are kept.
    pub fn reset(&self) {
        let mut state = self.lock();
        let mut ring = MessageRing::new();
        ring.set_emit_ceiling(self.config.emit_ceiling);
        state.ring = ring;
        state.last = None;
        state.verbosity = self.config.verbosity;
        state.reporting_mask = self.config.reporting_mask;
        state.report_counter = 0;
        state.mute = None;
        state.last_fault_message = None;
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a suppression rule for `call_site`.
    ///
    /// # Errors
    ///
    /// [`ReporterError::InvalidPattern`](crate::ReporterError::InvalidPattern)
    /// for a malformed file glob.
    pub fn suppress(
        &self,
        call_site: &str,
        mask: SeverityMask,
        message: Option<&str>,
        file_glob: Option<&str>,
        line: Option<u32>,
    ) -> Result<()> {
        self.lock()
            .suppression
            .register(call_site, mask, message, file_glob, line)
    }

    /// Register a prebuilt suppression rule.
    pub fn add_suppression_rule(&self, call_site: &str, rule: SuppressionRule) {
        self.lock().suppression.add_rule(call_site, rule);
    }

    /// Register a callback for faults whose kind intersects `mask`. The
    /// newest registration runs first.
    pub fn add_message_callback(&self, mask: SeverityMask, callback: Arc<dyn MessageCallback>) {
        let mut state = self.lock();
        state.callback_mask |= mask;
        state.callbacks.push(RegisteredCallback { mask, callback });
        tracing::debug!(mask = mask.bits(), total = state.callbacks.len(), "message callback registered");
    }

    /// Register a report filter.
    pub fn add_report_filter(&self, filter: Arc<dyn ReportFilter>) {
        let mut state = self.lock();
        state.filters.push(filter);
        tracing::debug!(total = state.filters.len(), "report filter registered");
    }

    /// Register a frame filter for caller resolution.
    pub fn add_frame_filter(&self, filter: Arc<dyn FrameFilter>) {
        let mut state = self.lock();
        Arc::make_mut(&mut state.resolver).add_filter(filter);
        tracing::debug!("frame filter registered");
    }

    /// Request snapshots dumped into notifications in embedded mode.
    pub fn set_request_context(&self, context: Vec<RequestContext>) {
        self.lock().request_context = context;
    }

    // ------------------------------------------------------------------
    // Runtime knobs
    // ------------------------------------------------------------------

    /// Set the verbosity, or increment it with `None`. Returns the new value.
    pub fn set_verbosity(&self, level: Option<u8>) -> u8 {
        let mut state = self.lock();
        state.verbosity = match level {
            Some(level) => level,
            None => state.verbosity.saturating_add(1),
        };
        state.verbosity
    }

    /// Current verbosity.
    pub fn verbosity(&self) -> u8 {
        self.lock().verbosity
    }

    /// Whether `severity` passes the verbosity gate.
    pub fn is_verbose(&self, severity: Severity) -> bool {
        self.lock().is_verbose(severity)
    }

    /// Replace the emit ceiling, returning the previous one.
    pub fn limit_emit(&self, ceiling: Severity) -> Severity {
        self.lock().ring.set_emit_ceiling(ceiling)
    }

    /// Replace the reporting mask, returning the previous one.
    pub fn set_reporting_mask(&self, mask: SeverityMask) -> SeverityMask {
        std::mem::replace(&mut self.lock().reporting_mask, mask)
    }

    /// Current reporting mask.
    pub fn reporting_mask(&self) -> SeverityMask {
        self.lock().reporting_mask
    }

    /// Run `f` with the reporting mask narrowed to Fatal and Exception.
    ///
    /// Exceptions stay admitted so `handle_exception` inside `f` is not
    /// turned into a process exit.
    pub fn silence<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Restore<'a> {
            reporter: &'a Reporter,
            mask: SeverityMask,
        }
        impl Drop for Restore<'_> {
            fn drop(&mut self) {
                self.reporter.set_reporting_mask(self.mask);
            }
        }

        let mask = self.set_reporting_mask(SeverityMask::FATAL | SeverityMask::EXCEPTION);
        let _restore = Restore {
            reporter: self,
            mask,
        };
        f()
    }

    // ------------------------------------------------------------------
    // Mute
    // ------------------------------------------------------------------

    /// Swallow warnings until the returned token is handed back.
    ///
    /// With `mute_host`, Warning is also removed from the reporting mask so
    /// warning faults are declined. The mask change applies even when
    /// warnings are already muted, in which case `None` is returned and the
    /// mask is restored only when the first holder unmutes.
    #[track_caller]
    pub fn mute_warnings(&self, mute_host: bool) -> Option<MuteToken> {
        let site = Location::caller();
        let mut state = self.lock();
        let saved = state.reporting_mask;
        if mute_host {
            state.reporting_mask.remove(SeverityMask::WARNING);
        }
        if state.mute.is_some() {
            return None;
        }
        let saved_mask = mute_host.then_some(saved);
        let id = NEXT_MUTE_ID.fetch_add(1, Ordering::Relaxed);
        state.ring.set_warnings_muted(true);
        state.mute = Some(MuteHolder {
            id,
            site,
            saved_mask,
        });
        Some(MuteToken { id, site })
    }

    /// Lift the mute acquired with `token`. Returns `false`, leaving
    /// warnings muted, when `token` does not belong to the current holder.
    pub fn unmute_warnings(&self, token: &MuteToken) -> bool {
        let mut state = self.lock();
        let saved_mask = match &state.mute {
            Some(holder) if holder.id == token.id => holder.saved_mask,
            Some(holder) => {
                tracing::debug!(
                    holder = %holder.site,
                    attempt = %token.site,
                    "unmute refused: token does not own the mute"
                );
                return false;
            }
            None => return false,
        };
        if let Some(mask) = saved_mask {
            state.reporting_mask = mask;
        }
        state.mute = None;
        state.ring.set_warnings_muted(false);
        true
    }

    /// Whether warnings are muted.
    pub fn warnings_muted(&self) -> bool {
        self.lock().ring.warnings_muted()
    }

    /// Run `f` with warnings muted. A mute already held elsewhere is left
    /// in place.
    #[track_caller]
    pub fn muted<R>(&self, f: impl FnOnce() -> R) -> R {
        let token = self.mute_warnings(false);
        let result = f();
        if let Some(token) = token {
            self.unmute_warnings(&token);
        }
        result
    }

    // ------------------------------------------------------------------
    // Append path
    // ------------------------------------------------------------------

    /// Append `message` with caller attribution.
    ///
    /// When `severity` passes the verbosity gate the record carries a
    /// rendered backtrace and is echoed as `SEVERITY: message`.
    pub fn append(&self, message: &str, severity: Severity) -> AppendOutcome {
        let (verbose, resolver) = {
            let state = self.lock();
            if let Some(outcome) = state.ring.check(message, severity) {
                return outcome;
            }
            (state.is_verbose(severity), Arc::clone(&state.resolver))
        };

        let frames = self.stack.capture();
        let caller = resolver.resolve(&frames, 0, None);
        let backtrace = verbose.then(|| self.renderer.render(&frames));

        let record = ErrorRecord {
            message: Arc::from(message),
            severity,
            caller: Arc::from(caller),
            backtrace: backtrace.as_deref().map(Arc::from),
        };
        let outcome = self.lock().ring.push(record);

        if outcome.is_recorded() && verbose {
            let message = if self.config.host.is_embedded() {
                html_escape(message)
            } else {
                message.into()
            };
            self.output
                .write_str(&format!("{:<8}: {}\n", severity.display_name(), message));
            if let Some(bt) = &backtrace {
                self.echo_backtrace(bt, "<pre><code class=\"backtrace\">", "</code></pre>");
            }
        }
        outcome
    }

    /// Append with a severity given as raw bits.
    ///
    /// An unrecognised value is a usage error and takes the fatal path.
    pub fn append_checked(&self, message: &str, bits: u8) -> AppendOutcome {
        match Severity::try_from(bits) {
            Ok(severity) => self.append(message, severity),
            Err(error) => self.trigger_fatal(&error.to_string()),
        }
    }

    fn resolve_caller(&self) -> String {
        let resolver = Arc::clone(&self.lock().resolver);
        resolver.resolve(&self.stack.capture(), 0, None)
    }

    /// Record an error. At the verbose level the caller is prefixed.
    pub fn add_error(&self, message: &str) -> AppendOutcome {
        if self.is_verbose(Severity::Error) {
            let message = format!("{}: {}", self.resolve_caller(), message);
            self.append(&message, Severity::Error)
        } else {
            self.append(message, Severity::Error)
        }
    }

    /// Record a warning, prefixed with `caller(): ` unless verbosity is 0.
    pub fn add_warning(&self, message: &str) -> AppendOutcome {
        let verbosity = {
            let state = self.lock();
            if state.ring.warnings_muted() {
                return AppendOutcome::Suppressed;
            }
            state.verbosity
        };
        if verbosity > 0 {
            let message = format!("{}(): {}", self.resolve_caller(), message);
            self.append(&message, Severity::Warning)
        } else {
            self.append(message, Severity::Warning)
        }
    }

    /// Record an informational message.
    pub fn add_info(&self, message: &str) -> AppendOutcome {
        self.append(message, Severity::Info)
    }

    /// Record a debug message.
    pub fn add_debug(&self, message: &str) -> AppendOutcome {
        self.append(message, Severity::Debug)
    }

    /// Record a success marker.
    pub fn add_success(&self, message: &str) -> AppendOutcome {
        self.append(message, Severity::Ok)
    }

    /// Record use of a deprecated path.
    ///
    /// The message is stored as Info. With verbosity 0 an internal report
    /// `Deprecated: <message>` is filed as well.
    pub fn add_deprecated(&self, message: &str) -> AppendOutcome {
        if self.verbosity() == 0 {
            self.report(&format!("Deprecated: {}", message));
        }
        self.add_info(message)
    }

    /// File an internal report. A synthetic cause captures the current
    /// stack so the report carries a backtrace.
    pub fn report(&self, message: &str) -> Disposition {
        let cause = Cause::synthetic(message, self.stack.as_ref());
        self.handle_fault(Fault::new(Severity::Report, message).caused_by(cause))
    }

    // ------------------------------------------------------------------
    // Fatal
    // ------------------------------------------------------------------

    /// Handle a Fatal fault `caller(): message` without exiting.
    pub fn record_fatal(&self, message: &str) -> Disposition {
        let caller = self.resolve_caller();
        self.handle_fault(Fault::new(
            Severity::Fatal,
            format!("{}(): {}", caller, message),
        ))
    }

    /// Report `message` as Fatal, write it to stderr (console) or the log
    /// (embedded), then exit with [`FATAL_EXIT_CODE`].
    pub fn trigger_fatal(&self, message: &str) -> ! {
        self.record_fatal(message);
        self.write_fatal(message);
        std::process::exit(FATAL_EXIT_CODE)
    }

    fn write_fatal(&self, message: &str) {
        if self.config.host.is_embedded() {
            self.log(message);
        } else {
            self.error_output.write_str(message);
            self.error_output.write_str("\n");
        }
    }

    // ------------------------------------------------------------------
    // Fault pipeline
    // ------------------------------------------------------------------

    /// Run `fault` through the full pipeline.
    pub fn handle_fault(&self, fault: Fault) -> Disposition {
        let severity = fault.severity;

        // 1-2: mask, repeat collapse
        let (repeat_notice, resolver) = {
            let mut state = self.lock();
            if !state.reporting_mask.admits(severity) {
                return Disposition::Declined;
            }
            let mut notice = None;
            if let Some(last) = state.last.as_mut() {
                if last.is_repeat(&fault, self.config.match_repeat_message) {
                    last.repeat_count += 1;
                    return Disposition::Collapsed;
                }
                if last.repeat_count > 0 {
                    notice = Some(format!("[last message repeated {} times]", last.repeat_count));
                }
            }
            state.last = Some(LastOccurrence::of(&fault));
            (notice, Arc::clone(&state.resolver))
        };
        if let Some(notice) = repeat_notice {
            self.log(&notice);
        }

        // 3-4: frames and attribution
        let frames = match fault.cause.as_ref().filter(|c| !c.frames.is_empty()) {
            Some(cause) => cause.frames.clone(),
            None => self.stack.capture(),
        };
        let caller = resolver.resolve(&frames, 0, None);
        let view = FaultView::new(&fault, &caller);

        // 5: suppression, then snapshot what runs unlocked
        let (filters, callbacks, verbose) = {
            let state = self.lock();
            if !state.suppression.should_report(
                &caller,
                severity,
                &fault.message,
                fault.file.as_deref(),
                fault.line,
            ) {
                return Disposition::Suppressed;
            }
            let filters: SmallVec<[Arc<dyn ReportFilter>; 4]> =
                state.filters.iter().cloned().collect();
            let callbacks: SmallVec<[RegisteredCallback; 4]> =
                if state.callback_mask.admits(severity) {
                    state
                        .callbacks
                        .iter()
                        .rev()
                        .filter(|cb| cb.mask.admits(severity))
                        .cloned()
                        .collect()
                } else {
                    SmallVec::new()
                };
            (filters, callbacks, state.is_verbose(severity))
        };

        // 6: report filters
        if filters.iter().any(|filter| filter.filter(&view)) {
            return Disposition::Filtered;
        }

        // 7: callbacks
        if callbacks.iter().any(|cb| cb.callback.display(&view, &frames)) {
            return Disposition::Preempted;
        }

        let backtrace = self.renderer.render(&frames);

        // 8: console echo
        if severity == Severity::Fatal || verbose {
            self.emit(&fault, &backtrace, verbose);
        }

        // 9-10: notification and recording
        let notification = {
            let mut state = self.lock();
            let notification = match (&self.config.notify_address, &self.transport) {
                (Some(to), Some(_)) if state.report_counter < self.config.report_limit => {
                    state.report_counter += 1;
                    Some(notify::compose(&NotificationParts {
                        to,
                        severity,
                        message: &fault.message,
                        file: fault.file.as_deref(),
                        line: fault.line,
                        caller: &caller,
                        backtrace: &backtrace,
                        server_name: &self.config.host.server_name,
                        mode: self.config.host.mode,
                        context: &state.request_context,
                    }))
                }
                _ => None,
            };
            state.ring.push(ErrorRecord {
                message: Arc::from(fault.message.as_str()),
                severity,
                caller: Arc::from(caller.as_str()),
                backtrace: verbose.then(|| Arc::from(backtrace.as_str())),
            });
            state.last_fault_message = Some(fault.message.clone());
            notification
        };
        if let (Some(notification), Some(transport)) = (notification, &self.transport) {
            if let Err(error) = transport.send(&notification) {
                tracing::warn!(%error, subject = %notification.subject, "notification dispatch failed");
            }
        }

        Disposition::Reported
    }

    fn emit(&self, fault: &Fault, backtrace: &str, verbose: bool) {
        let mut display = format!("{}: {}\n", fault.severity.display_name(), fault.message);
        let location = fault.location();
        if !location.is_empty() {
            display.push_str(&location);
            display.push('\n');
        }
        let host = &self.config.host;
        if host.is_embedded() {
            display = format!("<pre>{}</pre><br /><br />", html_escape(&display));
        } else if verbose {
            self.log(&format!("{}\n\n{}", display, backtrace));
        }
        self.output.write_str(&display);
        if verbose {
            self.echo_backtrace(backtrace, "<code class=\"backtrace monospace\"><pre>", "</pre></code>");
        }
    }

    fn echo_backtrace(&self, backtrace: &str, open: &str, close: &str) {
        let host = &self.config.host;
        if host.ajax {
            return;
        }
        if host.is_embedded() {
            self.output
                .write_str(&format!("{}{}{}", open, html_escape(backtrace), close));
        } else {
            self.output.write_str(backtrace);
            if !backtrace.ends_with('\n') {
                self.output.write_str("\n");
            }
        }
    }

    /// Re-express `cause` as an Exception fault and handle it. A declined
    /// exception is fatal.
    pub fn handle_exception(&self, cause: Cause) -> Disposition {
        let fault = Fault::from_cause(cause);
        let summary = format!(
            "Unhandled exception ({}:{}) `{}'",
            fault.file.as_deref().unwrap_or("unknown"),
            fault.line.unwrap_or(0),
            fault.message
        );
        let disposition = self.handle_fault(fault);
        if disposition.is_handled() {
            return disposition;
        }
        self.trigger_fatal(&summary)
    }

    /// Handle a plain fault at a location.
    pub fn handle_error(
        &self,
        severity: Severity,
        message: &str,
        file: Option<&str>,
        line: Option<u32>,
    ) -> Disposition {
        let mut fault = Fault::new(severity, message);
        fault.file = file.map(str::to_owned);
        fault.line = line;
        self.handle_fault(fault)
    }

    /// Message of the most recently reported fault, cleared on read.
    pub fn take_last_fault_message(&self) -> Option<String> {
        self.lock().last_fault_message.take()
    }

    /// Notifications sent so far.
    pub fn report_count(&self) -> u32 {
        self.lock().report_counter
    }

    // ------------------------------------------------------------------
    // Buffer
    // ------------------------------------------------------------------

    /// Return and remove matching records (all for `None`).
    pub fn flush(&self, filter: Option<SeverityMask>) -> Vec<ErrorRecord> {
        let mut state = self.lock();
        let records = state.ring.flush(filter);
        if filter.is_none() {
            state.last = None;
        }
        records
    }

    /// Matching records, non-destructively.
    pub fn peek(&self, filter: Option<SeverityMask>) -> Vec<ErrorRecord> {
        self.lock().ring.peek(filter)
    }

    /// Remove matching records.
    pub fn clear(&self, filter: Option<SeverityMask>) {
        let mut state = self.lock();
        state.ring.clear(filter);
        if filter.is_none() {
            state.last = None;
        }
    }

    /// Re-append records through the ring gate.
    pub fn merge(&self, records: Vec<ErrorRecord>) {
        self.lock().ring.merge(records);
    }

    /// Re-append records with unvalidated severities.
    pub fn merge_raw(&self, records: Vec<RawRecord>) {
        self.lock().ring.merge_raw(records);
    }

    /// Replace the buffer contents.
    pub fn set_buffer(&self, records: Vec<ErrorRecord>) {
        self.lock().ring.set_buffer(records);
    }

    /// Clamp every record to at most `ceiling`.
    pub fn downgrade(&self, ceiling: Severity) {
        self.lock().ring.downgrade(ceiling);
    }

    /// Error, Warning or Ok.
    pub fn worst_severity(&self) -> Severity {
        self.lock().ring.worst_severity()
    }

    /// Whether any bit of `mask` was accumulated.
    pub fn has_severity(&self, mask: SeverityMask) -> bool {
        self.lock().ring.has_severity(mask)
    }

    /// Whether every bit of `mask` was accumulated.
    pub fn is(&self, mask: SeverityMask) -> bool {
        self.lock().ring.is(mask)
    }

    /// Whether an error was recorded.
    pub fn is_error(&self) -> bool {
        self.lock().ring.is_error()
    }

    /// Accepted appends of `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.lock().ring.count(severity)
    }

    /// Message of the newest record.
    pub fn last_message(&self) -> Option<String> {
        self.lock().ring.last_message().map(str::to_owned)
    }

    /// Messages of error records.
    pub fn errors(&self) -> Vec<String> {
        self.lock().ring.errors()
    }

    /// Buffer sorted by severity, highest first.
    pub fn sorted(&self) -> Vec<ErrorRecord> {
        ring_buffer::sorted(self.peek(None))
    }

    /// Write `(SEVERITY): message` lines to the console sink.
    pub fn print_buffer(&self) {
        let text = ring_buffer::format_buffer(&self.peek(None));
        self.output.write_str(&text);
    }

    // ------------------------------------------------------------------
    // Stack
    // ------------------------------------------------------------------

    /// Attribution `depth` real frames above the caller of this method,
    /// skipping frames whose path matches `exclude`.
    pub fn caller_at(&self, depth: usize, exclude: Option<&Regex>) -> String {
        let resolver = Arc::clone(&self.lock().resolver);
        resolver.resolve(&self.stack.capture(), depth, exclude)
    }

    /// Live backtrace starting `offset` frames above the caller.
    ///
    /// # Errors
    ///
    /// [`ReporterError::InvalidOffset`](crate::ReporterError::InvalidOffset)
    /// if the stack is shallower than `offset`.
    pub fn backtrace(&self, offset: usize) -> Result<String> {
        self.renderer.render_from(&self.stack.capture(), offset)
    }

    /// Snapshot the live stack through the configured capability.
    pub fn capture(&self) -> Vec<Frame> {
        self.stack.capture()
    }

    /// `Class::function():line` for each live frame, innermost first.
    pub fn stack(&self) -> Vec<String> {
        self.stack.capture().iter().map(Frame::to_string).collect()
    }

    /// Write the numbered live stack to the console sink.
    pub fn print_stack(&self) {
        let mut text = String::new();
        for (i, frame) in self.stack().iter().enumerate() {
            text.push_str(&format!("{}: {}\n", i, frame));
        }
        if self.config.host.is_embedded() {
            text = format!("<code><pre>{}</pre></code>", html_escape(&text));
        }
        self.output.write_str(&text);
    }

    // ------------------------------------------------------------------
    // Log
    // ------------------------------------------------------------------

    /// Append `message` to the persistent log, if one is configured.
    pub fn log(&self, message: &str) {
        if let Some(log) = &self.log {
            if let Err(error) = log.append(message) {
                tracing::warn!(%error, "log sink append failed");
            }
        }
    }
}
