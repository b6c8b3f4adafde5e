//! Loader for grabber settings with YAML + environment overlays.
//!
//! Sources are merged in the order they are added; later sources win.
//! `GRABBER__`-prefixed environment variables (`__` between path segments,
//! e.g. `GRABBER__FETCH__READ_LIMIT_BYTES=65536`) are applied last. After
//! merging, `${VAR}` placeholders in string values are expanded, the result
//! is deserialized into [`GrabberConfig`] and validated.
use config::{Config, ConfigError, Environment, File, FileFormat};
use grabber_common::observability::{LogConfig, LogFormat};
use grabber_common::{FetchConfig, SettingsError, TitleConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "GRABBER";

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("config source: {0}")]
    Source(#[from] ConfigError),
    #[error("config schema: {0}")]
    Schema(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] SettingsError),
}

/// Everything the grabber binary reads from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabberConfig {
    pub fetch: FetchConfig,
    pub title: TitleConfig,
    pub log: LogSettings,
}

impl GrabberConfig {
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.fetch.validate()?;
        self.title.validate()
    }
}

/// The `log:` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default `EnvFilter` directive; `RUST_LOG` still wins.
    pub level: String,
    pub format: LogFormat,
    pub dir: Option<PathBuf>,
    pub file: bool,
    pub stderr: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            dir: None,
            file: false,
            stderr: false,
        }
    }
}

impl LogSettings {
    pub fn to_log_config(&self, app_name: &'static str) -> LogConfig {
        LogConfig {
            app_name,
            file: self.file,
            log_dir: self.dir.clone(),
            emit_stderr: self.stderr,
            format: self.format,
            default_filter: self.level.clone(),
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hiding the `config` crate wiring.
pub struct GrabberConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for GrabberConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl GrabberConfigLoader {
    /// No files yet; defaults plus `GRABBER__` environment overrides.
    ///
    /// ```
    /// use grabber_config::GrabberConfigLoader;
    ///
    /// let config = GrabberConfigLoader::new()
    ///     .with_yaml_str("title:\n  max: 60\n  target: 40")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.title.max, 60);
    /// assert_eq!(config.fetch.read_limit_bytes, 128 * 1024);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a config file that must exist; format is inferred from the suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a config file that is skipped when missing.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Merge all sources, expand `${VAR}` placeholders and validate.
    ///
    /// ```
    /// use grabber_config::GrabberConfigLoader;
    ///
    /// unsafe { std::env::set_var("GRABBER_DOC_UA", "doc-agent/1.0"); }
    ///
    /// let config = GrabberConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// fetch:
    ///   user_agent: "${GRABBER_DOC_UA}"
    ///   headers:
    ///     accept-language: "en"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.fetch.user_agent, "doc-agent/1.0");
    /// assert_eq!(config.fetch.headers.get("accept-language").map(String::as_str), Some("en"));
    ///
    /// unsafe { std::env::remove_var("GRABBER_DOC_UA"); }
    /// ```
    pub fn load(self) -> Result<GrabberConfig, ConfigLoadError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: GrabberConfig = serde_json::from_value(v)?;
        typed.validate()?;
        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("CITY", Some("Winston")), ("STATE", Some("NC"))], || {
            let mut v = json!([
                "hello-$CITY",
                { "loc": "${CITY}-${STATE}" },
                42,
                true,
                null
            ]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!(["hello-Winston", { "loc": "Winston-NC" }, 42, true, null])
            );
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                ("BAZ", Some("qux")),
                ("BAR", Some("mid-${BAZ}")),
                ("FOO", Some("start-${BAR}-end")),
            ],
            || {
                let mut v = json!("X=${FOO}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("X=start-mid-qux-end"));
            },
        );
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST}"));
    }

    #[test]
    fn log_settings_map_onto_log_config() {
        let settings = LogSettings {
            level: "debug".into(),
            format: LogFormat::Json,
            dir: Some(PathBuf::from("/tmp/grabber-logs")),
            file: true,
            stderr: true,
        };
        let cfg = settings.to_log_config("grabber");
        assert_eq!(cfg.app_name, "grabber");
        assert!(cfg.file && cfg.emit_stderr);
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.default_filter, "debug");
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/tmp/grabber-logs")));
    }
}
