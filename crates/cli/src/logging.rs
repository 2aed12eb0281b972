//! Tracing setup for the supervisor and worker processes.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// `RUST_LOG` wins over the `--log-level` flag.
fn console_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Console-only logging, used by the supervisor and the one-shot commands.
pub fn init_console(level: &str) {
    fmt()
        .with_env_filter(console_filter(level))
        .with_target(false)
        .init();
}

/// Console plus `<logs_dir>/<file_name>` logging for a worker process.
///
/// The returned guard flushes buffered lines when dropped and must outlive
/// every log call.
pub fn init_worker(level: &str, logs_dir: &Path, file_name: &str) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("creating log directory {}", logs_dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(logs_dir)
        .with_context(|| format!("opening {}", logs_dir.join(file_name).display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter(level));
    let file = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(false)
        .with_filter(EnvFilter::new(format!("{level},hyper_util=info,reqwest=info")));
    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(guard)
}
