use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber. Diagnostics go to stderr; stdout is
/// left to the supervised processes. `RUST_LOG` overrides the default level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
