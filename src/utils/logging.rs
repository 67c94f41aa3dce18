use std::{path::Path, sync::LazyLock};

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::{
    fmt::{format::FmtSpan, writer::MakeWriterExt},
    EnvFilter,
};

/// A week of logs per source.
const KEPT_LOG_FILES: usize = 7;

/// Which entry point writes the log. Every source rotates its own files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Cli,
    Daemon,
    /// Foreground daemon driven from stdin.
    Console,
}

impl LogSource {
    pub fn file_prefix(self) -> &'static str {
        match self {
            LogSource::Cli => "cli",
            LogSource::Daemon => "daemon",
            LogSource::Console => "console",
        }
    }
}

/// Writes logs into daily rotated files inside `log_dir`. `mirror` also prints them to stderr, so
/// reports and console replies on stdout stay readable.
pub fn enable_logging(
    source: LogSource,
    log_dir: &Path,
    level: Option<LevelFilter>,
    mirror: bool,
) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(KEPT_LOG_FILES)
        .filename_prefix(source.file_prefix())
        .filename_suffix("log")
        .build(log_dir)?;

    let stderr = std::io::stderr.with_filter(move |_| mirror);

    tracing_subscriber::fmt()
        .with_env_filter(crate_filter(level))
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(stderr.and(appender))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Only our own events are logged. Without an explicit level `RUST_LOG` decides, falling back to
/// info.
fn crate_filter(level: Option<LevelFilter>) -> EnvFilter {
    let crate_name = env!("CARGO_PKG_NAME").replace('-', "_");
    match level {
        Some(level) => EnvFilter::new(format!("{crate_name}={level}")),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{crate_name}=info"))),
    }
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .try_init();
});
