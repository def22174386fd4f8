//! Diagnostic logging setup.
//!
//! User-facing progress is printed directly; `tracing` carries the
//! diagnostics underneath it and goes to stderr.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "mapc=debug"
    } else {
        "mapc=warn"
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the verbosity flag.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
