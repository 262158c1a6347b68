//! Configuration management for reportwatch.
//!
//! Configuration is loaded from multiple sources and merged:
//! 1. Global config: `~/.config/reportwatch/config.json`
//! 2. Environment variable: `REPORTWATCH_CONFIG_CONTENT`
//! 3. Project config: `reportwatch.jsonc` or `reportwatch.json` in the working directory
//! 4. Environment overrides: `REPORTWATCH_REPORTS_DIR`, `REPORTWATCH_DATA_DIR`, `REPORTWATCH_ADDRESS`
//!
//! Supports JSONC (JSON with comments) and `{env:VAR_NAME}` substitution.

use crate::error::{ConfigError, ReportResult};
use reportwatch_util::LogLevel;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Identity recorded on changes found by the watcher rather than a user.
pub const AUTOMATED_IDENTITY: &str = "System Monitoring";

const DEFAULT_REPORTS_DIR: &str = "local_reports";
const DEFAULT_ADDRESS: &str = "127.0.0.1:3000";
const DEFAULT_DEBOUNCE_MS: u64 = 2000;
const DEFAULT_IO_TIMEOUT_MS: u64 = 30_000;

static VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn var_regex() -> &'static regex::Regex {
    VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\{env:([^}]+)\}")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the watched report tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports_dir: Option<PathBuf>,

    /// Directory of the durable audit store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// HTTP listen address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Log level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,

    /// Watcher settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<WatchConfig>,
}

/// Watcher configuration, as written in config files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period after the last notification before a file is re-read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,

    /// Poll instead of using native notifications (network shares).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    /// Seed every discoverable file when the watcher starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_on_start: Option<bool>,

    /// Bound on each load, write and audit call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io_timeout_ms: Option<u64>,

    /// Identity recorded on watcher-detected changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automated_identity: Option<String>,
}

impl WatchConfig {
    fn merge(self, other: Self) -> Self {
        Self {
            debounce_ms: other.debounce_ms.or(self.debounce_ms),
            poll_interval_ms: other.poll_interval_ms.or(self.poll_interval_ms),
            seed_on_start: other.seed_on_start.or(self.seed_on_start),
            io_timeout_ms: other.io_timeout_ms.or(self.io_timeout_ms),
            automated_identity: other.automated_identity.or(self.automated_identity),
        }
    }
}

/// Resolved watcher settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    pub debounce: Duration,
    pub poll_interval: Option<Duration>,
    pub seed_on_start: bool,
    pub io_timeout: Duration,
    pub automated_identity: String,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            poll_interval: None,
            seed_on_start: true,
            io_timeout: Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
            automated_identity: AUTOMATED_IDENTITY.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Loading order (later sources override earlier):
    /// 1. Global config from `~/.config/reportwatch/`
    /// 2. `REPORTWATCH_CONFIG_CONTENT` environment variable
    /// 3. Project config from the working directory
    /// 4. `REPORTWATCH_*` overrides
    pub async fn load(project_dir: Option<&Path>) -> ReportResult<(Self, Vec<PathBuf>)> {
        let mut config = Config::default();
        let mut sources = Vec::new();

        if let Some(global_dir) = reportwatch_util::path::config_dir() {
            let path = global_dir.join("config.json");
            if path.exists() {
                config = config.merge(Self::load_file(&path).await?);
                sources.push(path);
            }
        }

        if let Ok(content) = std::env::var("REPORTWATCH_CONFIG_CONTENT") {
            let content = Self::substitute_variables(&content)?;
            config = config.merge(Self::parse_jsonc(&content, "<env>")?);
        }

        if let Some(dir) = project_dir {
            for name in &["reportwatch.jsonc", "reportwatch.json"] {
                let path = dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        config.apply_env_overrides();

        Ok((config, sources))
    }

    /// Load configuration from a file.
    pub async fn load_file(path: &Path) -> ReportResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::substitute_variables(&content)?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("REPORTWATCH_REPORTS_DIR") {
            self.reports_dir = Some(PathBuf::from(dir));
        }
        if let Ok(dir) = std::env::var("REPORTWATCH_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(address) = std::env::var("REPORTWATCH_ADDRESS") {
            self.address = Some(address);
        }
    }

    /// The watched root, relative paths resolved against `base`.
    pub fn reports_dir(&self, base: &Path) -> PathBuf {
        let dir = self
            .reports_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORTS_DIR));
        if dir.is_absolute() {
            dir
        } else {
            base.join(dir)
        }
    }

    /// The audit store directory.
    pub fn data_dir(&self, base: &Path) -> PathBuf {
        match &self.data_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => base.join(dir),
            None => reportwatch_util::path::data_dir()
                .map(|p| p.join("data"))
                .unwrap_or_else(|| base.join(".reportwatch").join("data")),
        }
    }

    /// The HTTP listen address.
    pub fn address(&self) -> ReportResult<SocketAddr> {
        let raw = self.address.as_deref().unwrap_or(DEFAULT_ADDRESS);
        raw.parse().map_err(|_| {
            ConfigError::InvalidValue {
                name: "address".to_string(),
                value: raw.to_string(),
            }
            .into()
        })
    }

    /// Watcher settings with defaults filled in.
    pub fn watch_settings(&self) -> WatchSettings {
        let defaults = WatchSettings::default();
        let Some(watch) = &self.watch else {
            return defaults;
        };

        WatchSettings {
            debounce: watch
                .debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
            poll_interval: watch.poll_interval_ms.map(Duration::from_millis),
            seed_on_start: watch.seed_on_start.unwrap_or(defaults.seed_on_start),
            io_timeout: watch
                .io_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.io_timeout),
            automated_identity: watch
                .automated_identity
                .clone()
                .unwrap_or(defaults.automated_identity),
        }
    }

    /// Parse JSONC (JSON with comments).
    fn parse_jsonc(content: &str, source: &str) -> ReportResult<Self> {
        let stripped = Self::strip_comments(content);

        serde_json::from_str(&stripped).map_err(|e| {
            ConfigError::InvalidJson {
                path: source.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Strip JSON comments.
    fn strip_comments(input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut in_string = false;
        let mut escape_next = false;

        while let Some(c) = chars.next() {
            if escape_next {
                result.push(c);
                escape_next = false;
                continue;
            }

            if c == '\\' && in_string {
                result.push(c);
                escape_next = true;
                continue;
            }

            if c == '"' {
                in_string = !in_string;
                result.push(c);
                continue;
            }

            if in_string {
                result.push(c);
                continue;
            }

            if c == '/' {
                match chars.peek() {
                    Some('/') => {
                        chars.next();
                        for c in chars.by_ref() {
                            if c == '\n' {
                                result.push('\n');
                                break;
                            }
                        }
                        continue;
                    }
                    Some('*') => {
                        chars.next();
                        let mut prev = ' ';
                        for c in chars.by_ref() {
                            if prev == '*' && c == '/' {
                                break;
                            }
                            // Preserve newlines for error reporting
                            if c == '\n' {
                                result.push('\n');
                            }
                            prev = c;
                        }
                        continue;
                    }
                    _ => {}
                }
            }

            result.push(c);
        }

        result
    }

    /// Substitute `{env:VAR_NAME}` references.
    fn substitute_variables(content: &str) -> ReportResult<String> {
        let mut result = content.to_string();

        for cap in var_regex().captures_iter(content) {
            let (Some(full_match), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let value = std::env::var(name.as_str()).map_err(|_| ConfigError::EnvVarNotFound {
                name: name.as_str().to_string(),
            })?;
            result = result.replace(full_match.as_str(), &value);
        }

        Ok(result)
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(mut self, other: Self) -> Self {
        if other.reports_dir.is_some() {
            self.reports_dir = other.reports_dir;
        }
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if other.address.is_some() {
            self.address = other.address;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        self.watch = match (self.watch, other.watch) {
            (Some(base), Some(other)) => Some(base.merge(other)),
            (base, None) => base,
            (None, other) => other,
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comments() {
        let input = r#"{
            // Line comment
            "reports_dir": "/srv/reports", // trailing comment
            /* block comment */
            "address": "0.0.0.0:80/*not a comment*/"
        }"#;

        let result = Config::strip_comments(input);
        assert!(!result.contains("Line comment"));
        assert!(!result.contains("trailing comment"));
        assert!(!result.contains("block comment"));
        assert!(result.contains("0.0.0.0:80/*not a comment*/"));
    }

    #[test]
    fn test_parse_jsonc_with_watch_section() {
        let input = r#"{
            // Network share, poll it
            "reports_dir": "/mnt/reports",
            "log_level": "debug",
            "watch": { "debounce_ms": 500, "poll_interval_ms": 1000 }
        }"#;

        let config = Config::parse_jsonc(input, "test").unwrap();
        assert_eq!(config.reports_dir, Some(PathBuf::from("/mnt/reports")));
        assert_eq!(config.log_level, Some(LogLevel::Debug));

        let settings = config.watch_settings();
        assert_eq!(settings.debounce, Duration::from_millis(500));
        assert_eq!(settings.poll_interval, Some(Duration::from_millis(1000)));
        assert!(settings.seed_on_start);
        assert_eq!(settings.automated_identity, AUTOMATED_IDENTITY);
    }

    #[test]
    fn test_watch_settings_defaults() {
        let settings = Config::default().watch_settings();
        assert_eq!(settings, WatchSettings::default());
        assert_eq!(settings.debounce, Duration::from_millis(2000));
        assert_eq!(settings.io_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_merge_config() {
        let base = Config {
            reports_dir: Some(PathBuf::from("/a")),
            watch: Some(WatchConfig {
                debounce_ms: Some(100),
                seed_on_start: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        let other = Config {
            address: Some("0.0.0.0:8080".to_string()),
            watch: Some(WatchConfig {
                debounce_ms: Some(250),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = base.merge(other);
        assert_eq!(merged.reports_dir, Some(PathBuf::from("/a")));
        assert_eq!(merged.address.as_deref(), Some("0.0.0.0:8080"));
        let watch = merged.watch.unwrap();
        assert_eq!(watch.debounce_ms, Some(250));
        assert_eq!(watch.seed_on_start, Some(false));
    }

    #[test]
    fn test_relative_dirs_resolve_against_base() {
        let config = Config {
            reports_dir: Some(PathBuf::from("reports")),
            data_dir: Some(PathBuf::from("audit")),
            ..Default::default()
        };
        let base = Path::new("/srv/app");
        assert_eq!(config.reports_dir(base), PathBuf::from("/srv/app/reports"));
        assert_eq!(config.data_dir(base), PathBuf::from("/srv/app/audit"));
        assert_eq!(
            Config::default().reports_dir(base),
            PathBuf::from("/srv/app/local_reports")
        );
    }

    #[test]
    fn test_address_parsing() {
        assert_eq!(
            Config::default().address().unwrap(),
            "127.0.0.1:3000".parse::<SocketAddr>().unwrap()
        );
        let bad = Config {
            address: Some("not-an-address".to_string()),
            ..Default::default()
        };
        assert!(bad.address().is_err());
    }

    #[test]
    fn test_missing_env_var_is_an_error() {
        let result = Config::substitute_variables(r#"{"data_dir": "{env:REPORTWATCH_TEST_UNSET_VAR}"}"#);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("reportwatch.jsonc"),
            r#"{ /* project */ "data_dir": "audit-data" }"#,
        )
        .unwrap();

        let (config, sources) = Config::load(Some(dir.path())).await.unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("audit-data")));
        assert!(sources.iter().any(|p| p.ends_with("reportwatch.jsonc")));
    }
}
