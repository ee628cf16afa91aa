//! Logging initialization.
//!
//! Uses the `tracing` ecosystem. Log output goes to stderr; stdout is
//! reserved for captions and JSON results.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose info-level output drowns ours.
const QUIET_TARGETS: &[&str] = &["ort=warn", "reqwest=warn", "hyper=warn", "tokenizers=warn"];

/// Initialize the logging subsystem.
///
/// `level` is the default filter; the RUST_LOG environment variable
/// overrides it.
pub fn init(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(console::Term::stderr().features().colors_supported()),
            )
            .init();
    }
}

/// Initialize logging from the `[logging]` section, with CLI overrides.
pub fn init_from_config(config: &vlmcap_core::Config, verbose: bool, json_logs: bool) {
    let level = effective_level(&config.logging.level, verbose);
    let json_format = json_logs || config.logging.format == "json";
    init(level, json_format);
}

/// `--verbose` raises the configured level to at least debug.
fn effective_level(configured: &str, verbose: bool) -> &str {
    match (verbose, configured) {
        (true, "trace") => "trace",
        (true, _) => "debug",
        (false, level) => level,
    }
}

fn default_filter(level: &str) -> EnvFilter {
    let directives = std::iter::once(level.to_string())
        .chain(QUIET_TARGETS.iter().map(|t| t.to_string()))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_raises_level() {
        assert_eq!(effective_level("info", true), "debug");
        assert_eq!(effective_level("warn", true), "debug");
        assert_eq!(effective_level("trace", true), "trace");
        assert_eq!(effective_level("warn", false), "warn");
    }

    #[test]
    fn test_default_filter_includes_quiet_targets() {
        let filter = default_filter("debug").to_string();
        assert!(filter.contains("ort=warn"), "{filter}");
        assert!(filter.contains("debug"), "{filter}");
    }
}
