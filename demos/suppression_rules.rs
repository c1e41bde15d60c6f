use fault_ring::{
    Disposition, FaultView, Frame, Reporter, ReporterConfig, Result, Severity, SeverityMask,
    ShadowStack, StackSource, SuppressionRule,
};
use std::sync::Arc;

struct LegacyImporter;

impl LegacyImporter {
    fn run(&self, reporter: &Reporter) -> Disposition {
        let _frame = ShadowStack::enter(Frame::method("LegacyImporter", "run").at(file!(), line!()));
        reporter.handle_error(Severity::Warning, "implicit conversion of NULL", Some(file!()), Some(line!()))
    }
}

fn main() -> Result<()> {
    let shadow: Arc<dyn StackSource> = Arc::new(ShadowStack);
    let reporter = Reporter::new(ReporterConfig::default().with_verbosity(0))?
        .with_stack_source(shadow);

    // Known noise from one call site
    reporter.add_suppression_rule(
        "LegacyImporter::run",
        SuppressionRule::new(SeverityMask::WARNING).with_message("implicit conversion"),
    );

    // Glob-scoped rule for vendored code
    reporter.suppress(
        "unknown",
        SeverityMask::DEPRECATED | SeverityMask::WARNING,
        None,
        Some("*/vendor/*"),
        None,
    )?;

    // Everything fatal is shown to the operator first
    reporter.add_message_callback(
        SeverityMask::FATAL,
        Arc::new(|fault: &FaultView<'_>, frames: &[Frame]| {
            println!("operator page: {} ({} frames)", fault.message, frames.len());
            false
        }),
    );

    println!("--- Suppression Rules Example ---\n");
    println!("legacy import:   {:?}", LegacyImporter.run(&reporter));
    println!(
        "vendored code:   {:?}",
        reporter.handle_error(Severity::Warning, "shadowed name", Some("/srv/app/vendor/x.rs"), Some(3))
    );
    println!(
        "own code:        {:?}",
        reporter.handle_error(Severity::Warning, "shadowed name", Some("/srv/app/src/x.rs"), Some(3))
    );
    println!(
        "fatal:           {:?}",
        reporter.record_fatal("database unreachable")
    );

    println!("\nRecorded:");
    reporter.print_buffer();
    Ok(())
}
