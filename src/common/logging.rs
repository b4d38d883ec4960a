//! Logging and tracing configuration
//!
//! The CLI logs to stderr. Test runs additionally write a full log file
//! so node interactions can be inspected after a failing run.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use super::paths;

/// Name of the run log inside the log directory
const RUN_LOG_FILE: &str = "harness.log";

/// Initialize tracing for one-shot CLI commands (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chain_harness=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing for test runs (file + stderr logging)
///
/// The file at `~/.local/share/chain-harness/logs/harness.log` gets
/// DEBUG-level records including every RPC request and response; stderr
/// stays at WARN so the colored report is readable.
///
/// The returned guard must be held until the run ends or buffered records
/// are lost.
pub fn init_run() -> (Option<PathBuf>, Option<WorkerGuard>) {
    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chain_harness=warn,warn"));

    if let Some(log_dir) = paths::log_dir() {
        if paths::ensure_dir(&log_dir).is_ok() {
            let appender = tracing_appender::rolling::never(&log_dir, RUN_LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(EnvFilter::new("chain_harness=debug,info"));

            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact()
                .with_filter(stderr_filter);

            tracing_subscriber::registry()
                .with(file_layer)
                .with(stderr_layer)
                .init();

            return (Some(log_dir.join(RUN_LOG_FILE)), Some(guard));
        }
        eprintln!("Warning: Could not create log directory {}", log_dir.display());
    }

    // Fallback: stderr only
    tracing_subscriber::registry()
        .with(stderr_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .init();

    (None, None)
}

/// Path of the log file a launched node writes to
pub fn node_log_path(suite_id: &str) -> Option<PathBuf> {
    paths::log_dir().map(|d| d.join(format!("{}-node.log", paths::sanitize_file_stem(suite_id))))
}
