use fault_ring::{
    Reporter, ReporterConfig, Result, Severity, SeverityMask, report_error, report_info,
    report_warn, truncate,
};

fn load_configuration(reporter: &Reporter, path: &str) -> bool {
    // Simulate a failure to parse a configuration file
    if path == "bad_config.toml" {
        report_error!(reporter, "cannot parse {}: unexpected EOF at line 42", path);
        return false;
    }
    report_info!(reporter, "loaded {}", path);
    true
}

fn main() -> Result<()> {
    let reporter = Reporter::new(ReporterConfig::from_env().with_verbosity(0))?;

    println!("--- Basic Usage Example ---\n");

    load_configuration(&reporter, "defaults.toml");
    load_configuration(&reporter, "bad_config.toml");
    report_warn!(reporter, "falling back to defaults");

    // 1. Everything recorded so far, oldest first
    println!("1. Buffer:");
    reporter.print_buffer();

    // 2. Summary queries
    println!("\n2. Worst severity: {}", reporter.worst_severity());
    println!("   Errors:         {:?}", reporter.errors());
    println!("   Info count:     {}", reporter.count(Severity::Info));

    // 3. Take only the errors; the rest stays
    let errors = reporter.flush(Some(SeverityMask::ERROR));
    println!("\n3. Flushed {} error(s), {} record(s) left", errors.len(), reporter.peek(None).len());
    println!("   Worst severity now: {}", reporter.worst_severity());

    // 4. Soften whatever is left
    reporter.downgrade(Severity::Info);
    for record in reporter.peek(None) {
        println!("   {} (from {})", record, truncate(&record.caller, 24));
    }

    Ok(())
}
