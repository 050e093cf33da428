use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. sqlx logs every statement at
/// `info`, which would drown out the store's own events.
const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Initialize structured logging for the application.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
/// This must be called once at startup (in main.rs).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("Logging initialized");
}
