//! End-to-end scenarios through the public reporter surface.

use fault_ring::{
    AppendOutcome, Cause, Disposition, FaultView, Frame, HostEnvironment, MemoryLog, MemorySink,
    OutputSink, RecordingTransport, Reporter, ReporterConfig, RequestContext, Severity,
    SeverityMask, SuppressionRule, SyntheticStack, report_error, report_warn, truncate,
};
use std::fs;
use std::sync::{Arc, Mutex};

struct Harness {
    reporter: Reporter,
    out: MemorySink,
    log: MemoryLog,
    stack: Arc<SyntheticStack>,
}

fn harness(config: ReporterConfig) -> Harness {
    let out = MemorySink::new();
    let log = MemoryLog::new();
    let stack = Arc::new(SyntheticStack::new(vec![
        Frame::method("Checkout", "submit").at("/srv/app/src/checkout.rs", 88),
        Frame::function("main").at("/srv/app/src/main.rs", 12),
    ]));
    let reporter = Reporter::new(config)
        .unwrap()
        .with_stack_source(stack.clone())
        .with_output(OutputSink::new(out.clone()))
        .with_error_output(OutputSink::new(out.clone()))
        .with_log_sink(Arc::new(log.clone()));
    Harness {
        reporter,
        out,
        log,
        stack,
    }
}

fn quiet() -> Harness {
    harness(ReporterConfig::default().with_verbosity(0))
}

// ============================================================================
// BUFFER SCENARIOS
// ============================================================================

#[test]
fn filtered_flush_takes_only_errors() {
    let h = quiet();
    h.reporter.append("disk full", Severity::Error);
    h.reporter.append("retrying", Severity::Warning);

    let flushed = h.reporter.flush(Some(SeverityMask::ERROR));
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].message.as_ref(), "disk full");

    let left = h.reporter.peek(None);
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].message.as_ref(), "retrying");
    assert!(!h.reporter.has_severity(SeverityMask::ERROR));
    assert_eq!(h.reporter.worst_severity(), Severity::Warning);
}

#[test]
fn full_flush_resets_worst_severity() {
    let h = quiet();
    h.reporter.add_error("a");
    h.reporter.add_warning("b");
    assert_eq!(h.reporter.worst_severity(), Severity::Error);
    assert!(h.reporter.is_error());

    assert_eq!(h.reporter.flush(None).len(), 2);
    assert!(h.reporter.peek(None).is_empty());
    assert_eq!(h.reporter.worst_severity(), Severity::Ok);
    assert_eq!(h.reporter.count(Severity::Error), 0);
}

#[test]
fn consecutive_duplicates_store_once() {
    let h = quiet();
    assert_eq!(h.reporter.add_info("same"), AppendOutcome::Recorded);
    assert_eq!(h.reporter.add_info("same"), AppendOutcome::AlreadyReported);
    assert_eq!(h.reporter.peek(None).len(), 1);
    assert_eq!(h.reporter.count(Severity::Info), 1);
}

#[test]
fn downgrade_lowers_error_and_keeps_info() {
    let h = quiet();
    h.reporter.add_error("broken");
    h.reporter.add_info("note");
    h.reporter.downgrade(Severity::Warning);

    let records = h.reporter.peek(None);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].severity, Severity::Warning);
    assert_eq!(records[1].severity, Severity::Info);
    assert!(records.iter().all(|r| r.severity <= Severity::Warning));
    assert!(!h.reporter.is_error());
}

#[test]
fn downgrade_under_muted_warnings_keeps_records() {
    let h = quiet();
    h.reporter.add_error("broken");
    h.reporter.add_info("note");
    let token = h.reporter.mute_warnings(false).unwrap();
    h.reporter.downgrade(Severity::Warning);

    let kinds: Vec<(String, Severity)> = h
        .reporter
        .peek(None)
        .iter()
        .map(|r| (r.message.to_string(), r.severity))
        .collect();
    assert_eq!(
        kinds,
        [
            ("broken".to_owned(), Severity::Warning),
            ("note".to_owned(), Severity::Info)
        ]
    );
    assert_eq!(h.reporter.add_warning("later"), AppendOutcome::Suppressed);
    assert!(h.reporter.unmute_warnings(&token));
    assert_eq!(h.reporter.count(Severity::Warning), 1);
}

#[test]
fn sorted_and_errors_views() {
    let h = quiet();
    h.reporter.add_info("i");
    h.reporter.add_error("e1");
    h.reporter.add_warning("w");
    h.reporter.add_error("e2");

    let order: Vec<String> = h
        .reporter
        .sorted()
        .iter()
        .map(|r| r.message.to_string())
        .collect();
    assert_eq!(order, vec!["e1", "e2", "w", "i"]);
    assert_eq!(h.reporter.errors(), vec!["e1", "e2"]);
    assert_eq!(h.reporter.last_message().as_deref(), Some("e2"));
}

#[test]
fn emit_ceiling_swallows_higher_kinds() {
    let h = quiet();
    let previous = h.reporter.limit_emit(Severity::Warning);
    assert_eq!(previous, Severity::Report);
    assert_eq!(h.reporter.add_error("too loud"), AppendOutcome::Suppressed);
    assert!(h.reporter.add_warning("fine").is_recorded());
    assert_eq!(h.reporter.peek(None).len(), 1);
}

// ============================================================================
// FAULT PIPELINE SCENARIOS
// ============================================================================

#[test]
fn suppression_rule_vetoes_errors_from_one_call_site() {
    let h = quiet();
    h.stack
        .set_frames(vec![Frame::static_method("moduleX", "doThing").at("src/x.rs", 4)]);
    h.reporter
        .suppress("moduleX::doThing", SeverityMask::ERROR, None, None, None)
        .unwrap();

    let d = h.reporter.handle_error(Severity::Error, "boom", Some("src/x.rs"), Some(4));
    assert_eq!(d, Disposition::Suppressed);
    assert!(d.is_handled());

    let d = h.reporter.handle_error(Severity::Info, "hello", Some("src/x.rs"), Some(5));
    assert_eq!(d, Disposition::Reported);

    let records = h.reporter.peek(None);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].severity, Severity::Info);
    assert_eq!(records[0].caller.as_ref(), "moduleX::doThing");
}

#[test]
fn suppression_rule_with_message_and_file() {
    let h = quiet();
    let rule = SuppressionRule::new(SeverityMask::WARNING)
        .with_message("deprecated")
        .with_file("*/vendor/*")
        .unwrap();
    h.reporter.add_suppression_rule("Checkout::submit", rule);

    let vendor = h.reporter.handle_error(
        Severity::Warning,
        "call to deprecated fn",
        Some("/srv/app/vendor/lib.rs"),
        Some(3),
    );
    assert_eq!(vendor, Disposition::Suppressed);

    let own = h.reporter.handle_error(
        Severity::Warning,
        "call to deprecated fn",
        Some("/srv/app/src/lib.rs"),
        Some(3),
    );
    assert_eq!(own, Disposition::Reported);
}

#[test]
fn repeated_faults_collapse_into_one_record() {
    let h = quiet();
    let n = 5;
    for _ in 0..n {
        h.reporter
            .handle_error(Severity::Warning, "socket reset", Some("src/net.rs"), Some(21));
    }
    assert_eq!(h.reporter.peek(None).len(), 1);
    assert!(h.log.entries().is_empty());

    h.reporter
        .handle_error(Severity::Warning, "socket closed", Some("src/net.rs"), Some(30));
    assert_eq!(
        h.log.entries(),
        vec![format!("[last message repeated {} times]", n - 1)]
    );
    assert_eq!(h.reporter.peek(None).len(), 2);
}

#[test]
fn message_callback_preempts_recording() {
    let h = quiet();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    h.reporter.add_message_callback(
        SeverityMask::ERROR | SeverityMask::FATAL,
        Arc::new(move |fault: &FaultView<'_>, frames: &[Frame]| {
            sink.lock()
                .unwrap()
                .push((fault.caller.to_owned(), frames.len()));
            true
        }),
    );

    assert_eq!(
        h.reporter.handle_error(Severity::Error, "quota", None, Some(1)),
        Disposition::Preempted
    );
    assert_eq!(
        h.reporter.handle_error(Severity::Warning, "slow", None, Some(2)),
        Disposition::Reported
    );
    assert_eq!(*seen.lock().unwrap(), vec![("Checkout::submit".to_owned(), 2)]);
    assert_eq!(h.reporter.peek(None).len(), 1);
}

#[test]
fn exception_with_own_trace() {
    let h = quiet();
    let cause = Cause {
        class: "ParseError".into(),
        message: "unexpected token".into(),
        frames: vec![
            Frame::method("Parser", "expect").at("src/parser.rs", 140),
            Frame::method("Parser", "statement").at("src/parser.rs", 72),
        ],
        ..Cause::default()
    }
    .at("src/parser.rs", 140);

    assert_eq!(h.reporter.handle_exception(cause), Disposition::Reported);
    let record = &h.reporter.peek(Some(SeverityMask::EXCEPTION))[0];
    assert_eq!(record.message.as_ref(), "unexpected token");
    assert_eq!(record.caller.as_ref(), "Parser::expect");
}

#[test]
fn verbose_fault_echoes_and_logs_backtrace() {
    let h = harness(ReporterConfig::default().with_verbosity(2));
    h.reporter
        .handle_error(Severity::Error, "write failed", Some("src/store.rs"), Some(55));

    let out = h.out.contents();
    assert!(out.starts_with("ERROR: write failed\n[src/store.rs:55]\n"));
    assert!(out.contains("0. Checkout->submit()"));

    let entries = h.log.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].contains("ERROR: write failed"));
    assert!(entries[0].contains("1. main()"));

    let record = &h.reporter.peek(None)[0];
    assert!(record.backtrace.is_some());
}

#[test]
fn embedded_notification_includes_request_dump() {
    let transport = RecordingTransport::new();
    let host = HostEnvironment::embedded()
        .with_server_name("web-3")
        .with_install_root("/srv/app");
    let h = harness(
        ReporterConfig::default()
            .with_verbosity(0)
            .with_host(host)
            .with_notify_address("ops@example.org"),
    );
    let reporter = h.reporter.with_transport(Arc::new(transport.clone()));
    reporter.set_request_context(vec![
        RequestContext::new("POST").with("sku", "A-1"),
    ]);

    reporter.handle_error(Severity::Error, "payment declined", Some("/srv/app/src/pay.rs"), Some(9));

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    let note = &sent[0];
    assert_eq!(note.to, "ops@example.org");
    assert_eq!(note.subject, "pay.rs: Checkout::submit():9");
    assert_eq!(note.header("precedence"), Some("bulk"));
    assert!(note.body.starts_with("web-3:\n\nERROR: payment declined [/srv/app/src/pay.rs:9]\n"));
    assert!(note.body.contains("[src/checkout.rs:88]"));
    assert!(note.body.contains("MODE: SAPI"));
    assert!(note.body.contains("POST:\n[\n  'sku' => 'A-1',\n]\n"));
}

// ============================================================================
// MUTE SCENARIOS
// ============================================================================

#[test]
fn unmute_from_another_site_fails() {
    let h = quiet();
    let site_a = h.reporter.mute_warnings(false).unwrap();
    let site_b = h.reporter.mute_warnings(false);
    assert!(site_b.is_none());

    let stranger = {
        let other = quiet();
        other.reporter.mute_warnings(false).unwrap()
    };
    assert!(!h.reporter.unmute_warnings(&stranger));
    assert!(h.reporter.warnings_muted());
    assert_eq!(h.reporter.add_warning("hidden"), AppendOutcome::Suppressed);

    assert!(h.reporter.unmute_warnings(&site_a));
    assert!(!h.reporter.warnings_muted());
    assert!(h.reporter.add_warning("visible").is_recorded());
}

#[test]
fn nested_muted_sections_keep_outer_mute() {
    let h = quiet();
    h.reporter.muted(|| {
        h.reporter.muted(|| {
            h.reporter.add_warning("inner");
        });
        assert!(h.reporter.warnings_muted());
        h.reporter.add_warning("outer");
    });
    assert!(!h.reporter.warnings_muted());
    assert!(h.reporter.peek(None).is_empty());
}

// ============================================================================
// HELPERS
// ============================================================================

#[test]
fn truncate_scenario() {
    let long = "a very long string indeed!";
    assert_eq!(truncate(long, 10), "a very lon...");
    assert_eq!(truncate("short", 10), "short");
}

#[test]
fn macros_format_messages() {
    let h = quiet();
    report_error!(h.reporter, "order {} failed: {}", 42, "timeout");
    report_warn!(h.reporter, "retry {}/{}", 1, 3);
    assert_eq!(h.reporter.errors(), vec!["order 42 failed: timeout"]);
    assert_eq!(h.reporter.last_message().as_deref(), Some("retry 1/3"));
}

#[test]
fn log_file_lines_are_timestamped() {
    let path = std::env::temp_dir().join(format!("fault_ring_scenario_{}.log", std::process::id()));
    let _ = fs::remove_file(&path);
    let reporter = Reporter::new(ReporterConfig::default().with_verbosity(0).with_log_path(path.clone()))
        .unwrap()
        .with_stack_source(Arc::new(SyntheticStack::default()));

    reporter.log("first");
    reporter.log("second");

    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with('['));
    assert!(lines[0].ends_with("] first"));
    assert!(lines[1].ends_with("] second"));
    let _ = fs::remove_file(&path);
}
