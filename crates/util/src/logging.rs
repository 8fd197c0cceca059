//! Tracing subscriber setup shared by binaries.

use tracing_subscriber::EnvFilter;

/// Installs a formatted tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Installing twice is a
/// no-op so tests and embedding applications can call this freely.
pub fn init_tracing(default_filter: &str) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    let env_filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).try_init();
}
