//! Tracing setup for the `mterm` binary.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the stderr filter directive.
pub const LOG_ENV: &str = "MTERM_LOG";

/// Installs the global subscriber.
///
/// - stderr: `MTERM_LOG` if set, else `warn` (`debug` with `--verbose`)
/// - `<logs_dir>/mterm.log.YYYY-MM-DD`: `info` and above
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the life of the process.
pub fn init(logs_dir: &Path, verbose: bool) -> Option<WorkerGuard> {
    let stderr_filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let (file_layer, guard) = match std::fs::create_dir_all(logs_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(logs_dir, "mterm.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(LevelFilter::INFO);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("mterm: file logging disabled ({}): {}", logs_dir.display(), e);
            (None, None)
        }
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("mterm: tracing already initialized: {e}");
    }
    guard
}
