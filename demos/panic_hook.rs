use fault_ring::{Reporter, ReporterConfig, Result};
use std::panic;
use std::sync::Arc;

fn parse_port(text: &str) -> u16 {
    match text.parse() {
        Ok(port) => port,
        Err(_) => panic!("invalid port `{text}`"),
    }
}

fn main() -> Result<()> {
    let reporter = Arc::new(Reporter::new(ReporterConfig::from_env().with_verbosity(2))?);
    fault_ring::install(Arc::clone(&reporter));

    println!("--- Panic Hook Example ---\n");

    // A caught panic is still reported through the hook
    let result = panic::catch_unwind(|| parse_port("80a"));
    println!("\ncaught: {}", result.is_err());

    for record in reporter.peek(None) {
        println!("recorded {} from {}", record, record.caller);
    }
    Ok(())
}
