/*!
 * Configuration types for devtel
 */

use anyhow::{Context, Result};
use devtel_core_store::{default_log_dir, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Prefix of the environment variables that override file settings
pub const ENV_PREFIX: &str = "DEVTEL_";

/// Main configuration for tracking and delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevtelConfig {
    /// Directory holding the record log (None = `<system temp>/devtel`)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Telemetry endpoint base URL (None = delivery disabled)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Application name sent with every batch
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// API key sent with every batch
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout for delivery, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Email domain that enables developer identity fields, e.g. "@example.com"
    #[serde(default)]
    pub identity_domain: Option<String>,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for DevtelConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            endpoint: None,
            app_name: default_app_name(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            identity_domain: None,
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
        }
    }
}

/// Log level for diagnostic output
///
/// Defaults to `warn`: the binary runs inside another tool's hooks and
/// should stay quiet unless something goes wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    #[default]
    Warn,

    /// Info, warnings, and errors
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// Default value functions for serde
fn default_app_name() -> String {
    "devtel".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl DevtelConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: DevtelConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Resolve configuration the way the binary does
    ///
    /// An explicit path must exist. Without one, the per-user config file is
    /// used when present, otherwise defaults. `DEVTEL_*` variables are
    /// applied on top in both cases.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `DEVTEL_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `DEVTEL_*` overrides from an arbitrary lookup
    ///
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, suffix)).filter(|value| !value.is_empty())
        };

        if let Some(dir) = var("LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(endpoint) = var("ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Some(app_name) = var("APP_NAME") {
            self.app_name = app_name;
        }
        if let Some(api_key) = var("API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(domain) = var("IDENTITY_DOMAIN") {
            self.identity_domain = Some(domain);
        }
        if let Some(timeout) = var("TIMEOUT_SECS") {
            self.timeout_secs = timeout
                .parse()
                .with_context(|| format!("Invalid {}TIMEOUT_SECS '{}'", ENV_PREFIX, timeout))?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid {}LOG_LEVEL", ENV_PREFIX))?;
        }
        if let Some(file) = var("LOG_FILE") {
            self.log_file = Some(PathBuf::from(file));
        }

        Ok(())
    }

    /// Log directory with the default applied
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(default_log_dir)
    }

    /// Store settings derived from this configuration
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.resolved_log_dir())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// True when a non-empty endpoint is configured
    pub fn delivery_enabled(&self) -> bool {
        self.endpoint
            .as_deref()
            .is_some_and(|endpoint| !endpoint.trim().is_empty())
    }
}

/// `<user config dir>/devtel/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("devtel").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = DevtelConfig::default();
        assert_eq!(config.app_name, "devtel");
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.log_level, LogLevel::Warn);
        assert!(!config.delivery_enabled());
        assert_eq!(config.resolved_log_dir(), default_log_dir());
    }

    #[test]
    fn test_serialization() {
        let config = DevtelConfig {
            endpoint: Some("https://telemetry.example.com".to_string()),
            identity_domain: Some("@example.com".to_string()),
            ..Default::default()
        };
        let toml = toml::to_string(&config).unwrap();
        let deserialized: DevtelConfig = toml::from_str(&toml).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = DevtelConfig {
            log_dir: Some(dir.path().join("logs")),
            timeout_secs: 3,
            ..Default::default()
        };

        config.to_file(&path).unwrap();
        assert_eq!(DevtelConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let toml_str = r#"
endpoint = "https://telemetry.example.com/"
api_key = "secret"
log_level = "debug"
"#;
        let config: DevtelConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("https://telemetry.example.com/"));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.app_name, "devtel");
        assert_eq!(config.timeout_secs, 10);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = DevtelConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = DevtelConfig::default();
        config
            .apply_overrides(lookup(&[
                ("DEVTEL_ENDPOINT", "http://localhost:9000"),
                ("DEVTEL_API_KEY", "k"),
                ("DEVTEL_APP_NAME", "devenv"),
                ("DEVTEL_TIMEOUT_SECS", "2"),
                ("DEVTEL_LOG_LEVEL", "INFO"),
                ("DEVTEL_LOG_DIR", "/var/tmp/devtel"),
                ("DEVTEL_IDENTITY_DOMAIN", ""),
            ]))
            .unwrap();

        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.app_name, "devenv");
        assert_eq!(config.timeout(), Duration::from_secs(2));
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.resolved_log_dir(), PathBuf::from("/var/tmp/devtel"));
        assert_eq!(config.identity_domain, None);
        assert!(config.delivery_enabled());
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = DevtelConfig::default();
        assert!(config
            .apply_overrides(lookup(&[("DEVTEL_TIMEOUT_SECS", "soon")]))
            .is_err());
        assert!(config
            .apply_overrides(lookup(&[("DEVTEL_LOG_LEVEL", "loud")]))
            .is_err());
    }

    #[test]
    fn test_blank_endpoint_disables_delivery() {
        let config = DevtelConfig {
            endpoint: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(!config.delivery_enabled());
    }

    #[test]
    fn test_store_config_uses_log_dir() {
        let config = DevtelConfig {
            log_dir: Some(PathBuf::from("/tmp/elsewhere")),
            ..Default::default()
        };
        assert_eq!(config.store_config().log_dir, PathBuf::from("/tmp/elsewhere"));
    }
}
