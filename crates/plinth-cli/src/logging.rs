//! Tracing setup for the `plinth` binary.

use tracing_subscriber::EnvFilter;

/// Initialize structured logging for the CLI.
///
/// `RUST_LOG` wins when set; otherwise `level` applies globally. Log
/// lines go to stderr in compact form so progress and result output on
/// stdout stays machine-consumable.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
