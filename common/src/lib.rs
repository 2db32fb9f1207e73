//! Shared plumbing for every oxbow binary: endpoint strings, grpc dialing
//! and mutual-TLS credential loading.

pub mod capacity;
pub mod endpoint;
pub mod tls;

use tracing_subscriber::EnvFilter;

/// Install the process-wide tracing subscriber. Filtering comes from
/// `RUST_LOG`, defaulting to info.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
