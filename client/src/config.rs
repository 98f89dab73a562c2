use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use std::fs;

pub const ENV_API_URL: &str = "SLIDEGEN_API_URL";
pub const ENV_LOG_LEVEL: &str = "SLIDEGEN_LOG_LEVEL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_base_url() -> String { slidegen_common::DEFAULT_API_URL.to_string() }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: None,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_min_visible_progress")]
    pub min_visible_progress: f64,
}

fn default_interval() -> u64 { slidegen_common::DEFAULT_POLL_INTERVAL_MS }
fn default_min_visible_progress() -> f64 { 0.05 }

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            min_visible_progress: default_min_visible_progress(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        // A zero period would make tokio's interval panic
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub output: Option<PathBuf>,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: ClientConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: ClientConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Detect file type by extension and load
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "toml" => Self::from_toml_file(path),
            _ => Err(anyhow::anyhow!("Unsupported config file format. Use .yaml, .yml, or .toml")),
        }
    }

    /// Merge with another config, preferring values from other
    pub fn merge(&mut self, other: ClientConfig) {
        self.api.base_url = other.api.base_url;
        if other.api.request_timeout_ms.is_some() {
            self.api.request_timeout_ms = other.api.request_timeout_ms;
        }

        self.polling.interval_ms = other.polling.interval_ms;
        self.polling.min_visible_progress = other.polling.min_visible_progress;

        self.logging.level = other.logging.level;
        if other.logging.output.is_some() {
            self.logging.output = other.logging.output;
        }
    }

    /// Apply `SLIDEGEN_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            self.logging.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.polling.interval(), Duration::from_millis(1500));
        assert_eq!(config.api.request_timeout(), None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_yaml_partial_sections() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "api:\n  base_url: http://slides.internal:9000\npolling:\n  interval_ms: 500").unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api.base_url, "http://slides.internal:9000");
        assert_eq!(config.polling.interval_ms, 500);
        assert_eq!(config.polling.min_visible_progress, 0.05);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[api]\nrequest_timeout_ms = 30000\n\n[logging]\nlevel = \"debug\"").unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.api.base_url, "http://localhost:8000");
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(ClientConfig::from_file(Path::new("slidegen.ini")).is_err());
    }

    #[test]
    fn test_merge_keeps_optional_values() {
        let mut base = ClientConfig::default();
        base.api.request_timeout_ms = Some(1000);
        base.logging.output = Some(PathBuf::from("/tmp/slidegen.log"));

        let mut other = ClientConfig::default();
        other.polling.interval_ms = 250;
        base.merge(other);

        assert_eq!(base.polling.interval_ms, 250);
        assert_eq!(base.api.request_timeout_ms, Some(1000));
        assert_eq!(base.logging.output, Some(PathBuf::from("/tmp/slidegen.log")));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ClientConfig::default();
        config.apply_overrides(|key| match key {
            ENV_API_URL => Some("http://override:8000".to_string()),
            ENV_LOG_LEVEL => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.api.base_url, "http://override:8000");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let polling = PollingConfig { interval_ms: 0, ..PollingConfig::default() };
        assert_eq!(polling.interval(), Duration::from_millis(1));
    }
}
