//! Common types shared across Grabber crates.
//!
//! This crate defines the fetch/title settings that flow from the config
//! loader into the HTTP client and the extraction pipeline, plus the
//! observability helpers every binary uses. It is intentionally lightweight
//! so that all crates can depend on it without heavy transitive costs.
//!
//! # Overview
//!
//! - [`FetchConfig`]: byte budget, redirect limit, timeouts and headers for one fetch
//! - [`TitleConfig`]: target/max lengths for title shortening
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`SettingsError`]: validation failures for the settings above
//!
//! # Examples
//!
//! ```rust
//! use grabber_common::{FetchConfig, TitleConfig};
//!
//! let fetch = FetchConfig::default();
//! assert_eq!(fetch.read_limit_bytes, 128 * 1024);
//! assert_eq!(fetch.redirect_limit, 6);
//!
//! let title = TitleConfig::default();
//! assert_eq!((title.target, title.max), (80, 120));
//! assert!(title.validate().is_ok());
//! ```
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod observability;

/// Default byte budget for reading a response body (128 KiB).
pub const DEFAULT_READ_LIMIT: u64 = 128 * 1024;
/// Default number of redirect hops followed before giving up.
pub const DEFAULT_REDIRECT_LIMIT: usize = 6;
/// Default connect/read/write timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Identifying user agent sent with every request unless overridden.
pub fn default_user_agent() -> String {
    format!("grabber/{}", env!("CARGO_PKG_VERSION"))
}

/// Transport timeouts, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub connect: u64,
    pub read: u64,
    pub write: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_TIMEOUT_SECS,
            read: DEFAULT_TIMEOUT_SECS,
            write: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Timeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read)
    }

    /// Upper bound for a whole request/response exchange.
    ///
    /// The transport has no dedicated write timeout, so the three budgets are
    /// summed into one overall deadline.
    pub fn overall(&self) -> Duration {
        Duration::from_secs(
            self.connect
                .saturating_add(self.read)
                .saturating_add(self.write),
        )
    }
}

/// Settings for a single bounded fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Raw body bytes read before the fetch is abandoned.
    pub read_limit_bytes: u64,
    /// Maximum number of distinct redirect targets followed.
    pub redirect_limit: usize,
    pub timeouts: Timeouts,
    pub user_agent: String,
    /// Extra request headers. `User-Agent` and `Accept` always win.
    pub headers: BTreeMap<String, String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            read_limit_bytes: DEFAULT_READ_LIMIT,
            redirect_limit: DEFAULT_REDIRECT_LIMIT,
            timeouts: Timeouts::default(),
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
        }
    }
}

impl FetchConfig {
    /// Reject settings that would make every fetch fail.
    ///
    /// ```
    /// use grabber_common::FetchConfig;
    ///
    /// let cfg = FetchConfig { read_limit_bytes: 0, ..FetchConfig::default() };
    /// assert!(cfg.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.read_limit_bytes == 0 {
            return Err(SettingsError::invalid(
                "fetch.read_limit_bytes",
                "must be positive",
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(SettingsError::invalid("fetch.user_agent", "must not be empty"));
        }
        Ok(())
    }
}

/// Lengths used when shortening overlong titles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    /// Length at which front/back sampling stops.
    pub target: usize,
    /// Hard upper bound on the returned title, in characters.
    pub max: usize,
    /// Drop titles whose words all appear in the URL.
    pub reject_if_derivable_from_url: bool,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            target: 80,
            max: 120,
            reject_if_derivable_from_url: true,
        }
    }
}

impl TitleConfig {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max == 0 {
            return Err(SettingsError::invalid("title.max", "must be positive"));
        }
        if self.target > self.max {
            return Err(SettingsError::invalid(
                "title.target",
                format!("{} exceeds title.max {}", self.target, self.max),
            ));
        }
        Ok(())
    }
}

/// Preferred output format for CLI results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Settings that failed validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl SettingsError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
