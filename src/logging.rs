//! Logging setup.
//!
//! `RUST_LOG` wins when set; otherwise verbosity comes from `-v`/`-q`.

use tracing_subscriber::EnvFilter;

/// Default filter for a given verbosity.
pub fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "lancom=warn";
    }
    match verbose {
        0 => "lancom=info",
        1 => "lancom=debug",
        _ => "lancom=trace",
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
