//! Shared observability helpers for binaries and integration tests.
//!
//! The logging initializer centralises our `tracing` setup. Call
//! [`init_logging`] once near process start; additional callers are treated
//! as no-ops and simply receive the originally resolved log file path.
//!
//! A CLI that prints results on stdout must keep logs off stdout, so the two
//! sinks offered here are a daily-rolling file and `stderr`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

const LOG_DIR_ENV: &str = "GRABBER_LOG_DIR";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static LOG_INIT: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Output encoding for structured logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration passed to [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Logical name of the component (used for defaults and file names).
    pub app_name: &'static str,
    /// Whether to write a daily-rolling log file at all.
    pub file: bool,
    /// Optional explicit directory for the file sink. If `None`, we consult
    /// `GRABBER_LOG_DIR` and finally fall back to the platform data dir.
    pub log_dir: Option<PathBuf>,
    /// Whether to emit events to `stderr`.
    pub emit_stderr: bool,
    /// Preferred log encoding.
    pub format: LogFormat,
    /// Default filter applied when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            app_name: "grabber",
            file: false,
            log_dir: None,
            emit_stderr: false,
            format: LogFormat::Text,
            default_filter: "info".to_string(),
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Initialise the global `tracing` subscriber.
///
/// Returns the concrete log file path for the current day when the file sink
/// is enabled. Subsequent calls are cheap and hand back the first result.
pub fn init_logging(config: LogConfig) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = LOG_INIT.get() {
        return Ok(path.clone());
    }

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut full_path = None;

    if config.file {
        let resolved_dir = resolve_log_dir(config.app_name, config.log_dir.as_deref());
        std::fs::create_dir_all(&resolved_dir).with_context(|| {
            format!("failed to create log directory: {}", resolved_dir.display())
        })?;

        let log_filename = format!("{}.log", config.app_name);
        let today = Local::now().format("%Y-%m-%d").to_string();
        full_path = Some(resolved_dir.join(format!("{log_filename}.{today}")));

        let appender = rolling::daily(resolved_dir, log_filename);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);

        layers.push(match config.format {
            LogFormat::Text => fmt::layer().with_writer(writer).with_ansi(false).boxed(),
            LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
        });
    }

    if config.emit_stderr {
        layers.push(match config.format {
            LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
            LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        });
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .with_context(|| format!("invalid log filter: {}", config.default_filter))?;

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing setup failed: {e}"))?;

    tracing::debug!(
        app = config.app_name,
        format = ?config.format,
        file = ?full_path,
        "logging.ready"
    );
    let _ = LOG_INIT.set(full_path.clone());
    Ok(full_path)
}

fn resolve_log_dir(app_name: &str, explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return expand_home(dir);
    }

    if let Ok(env_dir) = std::env::var(LOG_DIR_ENV) {
        return expand_home(Path::new(&env_dir));
    }

    default_data_dir(app_name)
}

fn expand_home(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

fn default_data_dir(app_name: &str) -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(app_name))
        .unwrap_or_else(|| PathBuf::from(".").join(app_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins() {
        let dir = resolve_log_dir("grabber", Some(Path::new("/var/log/grabber")));
        assert_eq!(dir, PathBuf::from("/var/log/grabber"));
    }

    #[test]
    fn tilde_is_expanded_against_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_home(Path::new("~/logs")), home.join("logs"));
        assert_eq!(expand_home(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn default_dir_ends_with_app_name() {
        assert!(default_data_dir("grabber-tests").ends_with("grabber-tests"));
    }
}
