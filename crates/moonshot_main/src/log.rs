use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;

pub fn log_dir() -> PathBuf {
    dirs::config_dir()
        .map(|a| a.join("moonshot"))
        .unwrap_or(PathBuf::from(".").join(".moonshot"))
        .join("logs")
}

/// Installs the global subscriber writing to an hourly file in `dir`. Keep the
/// guard alive until exit, dropping it flushes pending lines.
pub fn init_tracing(dir: PathBuf, verbose: bool) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&dir)?;
    let append = tracing_appender::rolling::hourly(dir, "moonshot.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(append);
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_max_level(level)
        .with_level(true)
        .with_ansi(false)
        .with_writer(non_blocking)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(guard)
}
