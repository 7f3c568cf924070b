//! Utility functions.

/// Initialize tracing for tests. Safe to call from every test; only the
/// first call installs the subscriber. `RUST_LOG` overrides the filter.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("batchflow_core=debug,test=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
