pub mod config;
pub mod models;
pub mod pipeline;
mod phi_audit; // Static PHI-in-logs audit (tests only)

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Logs go to stderr so stdout
/// stays free for reports. Filter from `RUST_LOG`, else the default.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
