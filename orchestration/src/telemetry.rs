//! Tracing setup for binaries and tests embedding this crate.

use tracing_subscriber::EnvFilter;

/// Initialize a stderr tracing subscriber honoring `RUST_LOG`, defaulting
/// to `info` for this crate. Safe to call more than once; only the first
/// call installs a subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("orchestration=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
