//! Tracing initialization for binaries and tests.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install a process-wide subscriber. The `WEIR_LOG` env var overrides the
/// verbosity-derived default. Safe to call more than once; later calls are
/// no-ops.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(verbosity).into())
        .with_env_var("WEIR_LOG")
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
