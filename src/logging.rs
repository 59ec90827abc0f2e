use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "sql_notebook=info";
const DEFAULT_LOG_NAME: &str = "sql-notebook.log";

/// The terminal belongs to the UI, so logs only ever go to a file: the given
/// one, or a temp-dir default when `RUST_LOG` asks for output.
pub fn log_path(explicit: Option<&Path>, rust_log_set: bool) -> Option<PathBuf> {
    match explicit {
        Some(p) => Some(p.to_path_buf()),
        None if rust_log_set => Some(std::env::temp_dir().join(DEFAULT_LOG_NAME)),
        None => None,
    }
}

pub fn init(explicit: Option<&Path>) -> Result<()> {
    let rust_log_set = std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();
    let Some(path) = log_path(explicit, rust_log_set) else {
        return Ok(());
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::info!(path = %path.display(), "logging initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let p = Path::new("/tmp/nb.log");
        assert_eq!(log_path(Some(p), false), Some(p.to_path_buf()));
        assert_eq!(log_path(Some(p), true), Some(p.to_path_buf()));
    }

    #[test]
    fn no_path_without_rust_log() {
        assert_eq!(log_path(None, false), None);
        assert_eq!(
            log_path(None, true),
            Some(std::env::temp_dir().join(DEFAULT_LOG_NAME))
        );
    }
}
