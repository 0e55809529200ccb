//! Log file setup.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::LogLevel;

/// Build the filter for `level`; `RUST_LOG` takes precedence when set.
pub fn env_filter(level: LogLevel) -> Option<EnvFilter> {
    let directive = level.directive()?;
    Some(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)))
}

/// Install the global subscriber, appending to `log_file`.
///
/// `LogLevel::Silent` installs nothing.
pub fn init(level: LogLevel, log_file: &Path) -> anyhow::Result<()> {
    let Some(filter) = env_filter(level) else {
        return Ok(());
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("cannot open log file {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .with(filter)
        .try_init()
        .context("cannot install log subscriber")?;

    tracing::debug!("Logging to {} at {:?}", log_file.display(), level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_has_no_filter() {
        assert!(env_filter(LogLevel::Silent).is_none());
        assert!(init(LogLevel::Silent, Path::new("/nonexistent/dir/log")).is_ok());
    }

    #[test]
    fn test_unwritable_log_file_is_an_error() {
        let err = init(LogLevel::Info, Path::new("/nonexistent/dir/cephfs-sync.log")).unwrap_err();
        assert!(err.to_string().contains("cannot open log file"));
    }
}
