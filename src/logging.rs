use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Keeps the non-blocking writer alive for the lifetime of the process.
#[allow(dead_code)]
pub struct LoggerGuard(WorkerGuard);

const LOG_RETENTION: Duration = Duration::from_secs(60 * 60 * 24 * 7);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Set up stdout plus daily-rolling file logging and start the log
/// retention task. The configured level is the default directive;
/// RUST_LOG overrides it as usual.
pub fn init_logging(log_dir: impl AsRef<Path>, prefix: &str, level: &str) -> LoggerGuard {
    let log_dir = log_dir.as_ref().to_path_buf();

    let directive: tracing_subscriber::filter::Directive = level.parse().unwrap_or_else(|_| {
        eprintln!("invalid log level '{}', defaulting to 'info'", level);
        "info".parse().unwrap()
    });
    let env = std::env::var("RUST_LOG").unwrap_or_default();
    let filter_for = |env: &str| {
        EnvFilter::builder()
            .with_default_directive(directive.clone())
            .parse_lossy(env)
    };

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(&log_dir)
        .expect("failed to create file appender");
    let (non_blocking, guard) = NonBlocking::new(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(filter_for(&env)),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_filter(filter_for(&env)),
        )
        .init();

    let prefix = prefix.to_string();
    tokio::task::spawn(async move {
        loop {
            match delete_aged_logs(&log_dir, &prefix, LOG_RETENTION) {
                Ok(0) => {}
                Ok(n) => tracing::info!("Deleted {} aged log files", n),
                Err(e) => tracing::warn!("Log cleanup failed: {}", e),
            }
            tokio::time::sleep(CLEANUP_INTERVAL).await;
        }
    });

    LoggerGuard(guard)
}

fn delete_aged_logs(log_dir: &PathBuf, prefix: &str, max_age: Duration) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let mut deleted = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !file_name.starts_with(prefix) || !file_name.ends_with(".log") {
            continue;
        }
        let Ok(modified) = fs::metadata(&path).and_then(|m| m.modified()) else {
            continue;
        };
        if now.duration_since(modified).unwrap_or_default() > max_age {
            fs::remove_file(&path)?;
            deleted += 1;
        }
    }
    Ok(deleted)
}
