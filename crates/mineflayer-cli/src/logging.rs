use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;

use mineflayer_client::MineflayerConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

/// Filter for the given number of `-d` flags
///
/// Without flags `RUST_LOG` decides, falling back to `info`.
pub fn env_filter(debug: u8) -> EnvFilter {
    match debug {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Initialize logging for the runner.
///
/// Console output goes to stderr; stdout belongs to `mf.print`. With
/// `to_file` set, logs are also appended to `<data dir>/logs/mineflayer.log`.
///
/// Returns a guard that must be kept alive for the duration of the program.
pub fn init_logging(debug: u8, to_file: bool) -> io::Result<Option<WorkerGuard>> {
    let console = fmt::layer().with_writer(io::stderr).with_ansi(true);

    if !to_file {
        tracing_subscriber::registry()
            .with(env_filter(debug))
            .with(console)
            .init();
        return Ok(None);
    }

    let log_dir = MineflayerConfig::log_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Failed to find data directory"))?;
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("mineflayer.log");

    truncate_if_needed(&log_path)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

    tracing_subscriber::registry()
        .with(env_filter(debug))
        .with(console)
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    tracing::info!("Logging to file: {}", log_path.display());
    Ok(Some(guard))
}

/// Truncate log file if it exceeds MAX_LOG_SIZE.
fn truncate_if_needed(log_path: &Path) -> io::Result<()> {
    if log_path.exists() && fs::metadata(log_path)?.len() > MAX_LOG_SIZE {
        let file = File::create(log_path)?;
        file.set_len(0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_large_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.log");
        fs::write(&path, vec![b'x'; MAX_LOG_SIZE as usize + 1]).unwrap();

        truncate_if_needed(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_keep_small_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.log");
        fs::write(&path, "hello\n").unwrap();

        truncate_if_needed(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");

        // Missing files are fine
        truncate_if_needed(&dir.path().join("missing.log")).unwrap();
    }

    #[test]
    fn test_debug_flags_raise_level() {
        assert_eq!(env_filter(1).to_string(), "debug");
        assert_eq!(env_filter(2).to_string(), "trace");
        assert_eq!(env_filter(5).to_string(), "trace");
    }
}
