//! Logging initialization using the `tracing` ecosystem.
//!
//! Console output is always on. When a log directory is given, a second layer
//! writes plain-text lines to a daily-rolling file through a non-blocking
//! writer, so slow disks never stall the scheduler or the fan-out tasks.
//! `RUST_LOG` overrides the level passed in.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// Call once at program start. The returned guard flushes the file writer on
/// drop and must be kept alive for the life of the process.
///
/// - `log_level`: fallback filter when `RUST_LOG` is unset (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `module_name`: file name prefix (e.g. `"tradebot"`)
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) -> Option<WorkerGuard> {
    let env_filter = build_filter(log_level);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, format!("{module_name}.log")));
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(env_filter).with(console_layer).init();
            None
        }
    }
}

fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
