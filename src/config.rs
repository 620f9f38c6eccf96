use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Working directory for merged and downloaded ACH files.
    pub root_dir: String,
    /// Minutes between periodic file operations.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Cursor batch size for pending transfers and micro-deposits.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Keep local files after a tick even when an ODFI config asks for
    /// cleanup. Useful while debugging a deployment.
    #[serde(default)]
    pub keep_files: bool,
    /// Base URL of the upstream ACH service.
    pub ach_service_url: String,
    /// PostgreSQL connection URL.
    #[serde(default)]
    pub postgres_url: Option<String>,
    /// Use the static in-memory ODFI repository instead of the SQL one.
    /// Local development only: one local cutoff and no remote transports.
    #[serde(default)]
    pub use_static_odfi: bool,
}

fn default_interval_minutes() -> u64 {
    10
}

fn default_batch_size() -> usize {
    100
}

/// A non-empty environment variable, if set.
fn env_override(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`, apply `ACHGATE_*` overrides, then validate.
    pub fn load(env: &str) -> Result<Self> {
        let path = Path::new("config").join(format!("{}.yaml", env));
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.apply_env_overrides();
        config
            .validate()
            .with_context(|| format!("validating {}", path.display()))?;
        Ok(config)
    }

    /// Environment variables take precedence over the YAML file. Supported:
    /// - ACHGATE_LOG_LEVEL: log level (trace/debug/info/warn/error)
    /// - ACHGATE_ROOT_DIR: working directory for ACH files
    /// - ACHGATE_INTERVAL_MINUTES: minutes between ticks (u64)
    /// - ACHGATE_ACH_SERVICE_URL: upstream ACH service base URL
    /// - ACHGATE_POSTGRES_URL: PostgreSQL connection URL
    /// - ACHGATE_KEEP_FILES: keep local files after a tick (true/false)
    pub fn apply_env_overrides(&mut self) {
        if let Some(level) = env_override("ACHGATE_LOG_LEVEL") {
            tracing::info!(source = "ACHGATE_LOG_LEVEL", log_level = %level, "config override");
            self.log_level = level;
        }
        if let Some(dir) = env_override("ACHGATE_ROOT_DIR") {
            tracing::info!(source = "ACHGATE_ROOT_DIR", root_dir = %dir, "config override");
            self.root_dir = dir;
        }
        if let Some(minutes) =
            env_override("ACHGATE_INTERVAL_MINUTES").and_then(|v| v.parse::<u64>().ok())
        {
            tracing::info!(
                source = "ACHGATE_INTERVAL_MINUTES",
                interval_minutes = minutes,
                "config override"
            );
            self.interval_minutes = minutes;
        }
        if let Some(url) = env_override("ACHGATE_ACH_SERVICE_URL") {
            tracing::info!(source = "ACHGATE_ACH_SERVICE_URL", ach_service_url = %url, "config override");
            self.ach_service_url = url;
        }
        if let Some(url) = env_override("ACHGATE_POSTGRES_URL") {
            // never log connection URLs, they embed credentials
            tracing::info!(source = "ACHGATE_POSTGRES_URL", "config override");
            self.postgres_url = Some(url);
        }
        if let Some(keep) =
            env_override("ACHGATE_KEEP_FILES").and_then(|v| v.parse::<bool>().ok())
        {
            tracing::info!(source = "ACHGATE_KEEP_FILES", keep_files = keep, "config override");
            self.keep_files = keep;
        }
    }

    /// Validate configuration at startup.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log_level '{}': must be one of {:?}",
                self.log_level,
                valid_levels
            );
        }
        if self.root_dir.is_empty() {
            anyhow::bail!("Invalid root_dir: must not be empty");
        }
        if self.interval_minutes == 0 {
            anyhow::bail!("Invalid interval_minutes: must be > 0");
        }
        if self.batch_size == 0 {
            anyhow::bail!("Invalid batch_size: must be > 0");
        }
        if self.ach_service_url.is_empty() {
            anyhow::bail!("Invalid ach_service_url: must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "achgate.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            root_dir: "./storage".to_string(),
            interval_minutes: 10,
            batch_size: 100,
            keep_files: false,
            ach_service_url: "http://ach.service:8080".to_string(),
            postgres_url: None,
            use_static_odfi: false,
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = valid_config();
        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = valid_config();
        config.interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_defaults() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: achgate.log
use_json: false
rotation: daily
root_dir: ./storage
ach_service_url: "http://ach.service:8080"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.interval_minutes, 10);
        assert_eq!(config.batch_size, 100);
        assert!(!config.keep_files);
        assert!(config.postgres_url.is_none());
    }
}
