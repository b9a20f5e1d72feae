//! Configuration structures and loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::security::SecurityLevel;

/// Top-level configuration, loaded from a TOML file (`--config`, default
/// `sandbox.toml`). Every field is defaulted so an empty file is valid.
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub log_level: String,

    #[serde(default)]
    pub engine: EngineConfiguration,

    #[serde(default)]
    pub pool: PoolConfiguration,

    #[serde(default)]
    pub cache: CacheConfiguration,

    #[serde(default)]
    pub audit: AuditConfiguration,

    #[serde(default)]
    pub security: SecurityConfiguration,

    #[serde(default)]
    pub ratelimit: RateLimitConfiguration,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            engine: EngineConfiguration::default(),
            pool: PoolConfiguration::default(),
            cache: CacheConfiguration::default(),
            audit: AuditConfiguration::default(),
            security: SecurityConfiguration::default(),
            ratelimit: RateLimitConfiguration::default(),
        }
    }
}

impl Configuration {
    /// Load configuration from a TOML file, falling back to all-defaults
    /// when the file does not exist. Applies the environment-variable
    /// overrides named in the external interface section.
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        let mut config: Configuration = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("failed to read config file: {path}"))?;
            toml::from_str(&content).with_context(|| "failed to parse configuration")?
        } else {
            Configuration::default()
        };

        config.apply_env_overrides();
        std::fs::create_dir_all(&config.audit.log_directory)
            .with_context(|| format!("failed to create audit log directory: {:?}", config.audit.log_directory))?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(value) = std::env::var("POOL_MIN_IDLE") {
            if let Ok(parsed) = value.parse() {
                self.pool.min_idle_per_language = parsed;
            }
        }
        if let Ok(value) = std::env::var("POOL_MAX_ACTIVE") {
            if let Ok(parsed) = value.parse() {
                self.pool.max_active = parsed;
            }
        }
        if let Ok(value) = std::env::var("CACHE_MAX_SIZE_GB") {
            if let Ok(parsed) = value.parse() {
                self.cache.max_size_gb = parsed;
            }
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfiguration {
    pub socket_path: String,
    pub exec_timeout_ms: u64,
    pub max_stdout_bytes: usize,
    pub max_stderr_bytes: usize,
}

impl Default for EngineConfiguration {
    fn default() -> Self {
        Self {
            socket_path: "/var/run/docker.sock".to_string(),
            exec_timeout_ms: 30_000,
            max_stdout_bytes: 10 * 1024 * 1024,
            max_stderr_bytes: 5 * 1024 * 1024,
        }
    }
}

impl EngineConfiguration {
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_millis(self.exec_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfiguration {
    pub min_idle_per_language: usize,
    pub max_active: usize,
    pub warm_up_languages: Vec<String>,
    pub liveness_probe_interval_secs: u64,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            min_idle_per_language: 1,
            max_active: 16,
            warm_up_languages: vec!["python".to_string(), "javascript".to_string(), "bash".to_string()],
            liveness_probe_interval_secs: 60,
        }
    }
}

impl PoolConfiguration {
    pub fn liveness_probe_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_probe_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfiguration {
    pub max_size_gb: u64,
    pub keep_images_per_language: usize,
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self {
            max_size_gb: 20,
            keep_images_per_language: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfiguration {
    pub ring_buffer_size: usize,
    pub log_directory: PathBuf,
}

impl Default for AuditConfiguration {
    fn default() -> Self {
        Self {
            ring_buffer_size: 1000,
            log_directory: PathBuf::from("./logs"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfiguration {
    pub level: String,
}

impl Default for SecurityConfiguration {
    fn default() -> Self {
        Self {
            level: "standard".to_string(),
        }
    }
}

impl SecurityConfiguration {
    pub fn level(&self) -> SecurityLevel {
        self.level.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfiguration {
    pub window_secs: u64,
    pub max_requests: usize,
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfiguration {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 60,
            sweep_interval_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_loads_as_all_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sandbox.toml");
        std::fs::write(&path, "").unwrap();

        let config = Configuration::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.pool.max_active, 16);
        assert_eq!(config.security.level, "standard");
    }

    #[test]
    fn missing_file_loads_as_all_defaults() {
        let config = Configuration::load("/nonexistent/sandbox.toml").unwrap();
        assert_eq!(config.cache.max_size_gb, 20);
    }

    #[test]
    fn env_override_wins_over_file_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sandbox.toml");
        std::fs::write(&path, "[pool]\nmax_active = 4\n").unwrap();

        std::env::set_var("POOL_MAX_ACTIVE", "9");
        let config = Configuration::load(path.to_str().unwrap()).unwrap();
        std::env::remove_var("POOL_MAX_ACTIVE");

        assert_eq!(config.pool.max_active, 9);
    }
}
