mod plugins;
mod queue;
mod redis;
mod speaker;
mod stt;
mod supervisor;

pub use plugins::*;
pub use queue::*;
pub use redis::*;
pub use speaker::*;
pub use stt::*;
pub use supervisor::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub speaker_recognition: SpeakerRecognitionConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

impl Config {
    /// Load configuration from environment variables, applying defaults for
    /// anything unset. `config.yml`, if present, is layered underneath env
    /// vars (env always wins) the way the original model registry treats
    /// its YAML file as defaults.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        cfg.redis.url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| cfg.redis.url.clone());
        if let Ok(v) = std::env::var("WORKER_CHECK_INTERVAL") {
            if let Ok(n) = v.parse() {
                cfg.supervisor.check_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("MIN_RQ_WORKERS") {
            if let Ok(n) = v.parse() {
                cfg.supervisor.min_rq_workers = n;
            }
        }
        if let Ok(v) = std::env::var("WORKER_STARTUP_GRACE_PERIOD") {
            if let Ok(n) = v.parse() {
                cfg.supervisor.startup_grace_period_secs = n;
            }
        }
        if let Ok(v) = std::env::var("WORKER_SHUTDOWN_TIMEOUT") {
            if let Ok(n) = v.parse() {
                cfg.supervisor.shutdown_timeout_secs = n;
            }
        }
        cfg
    }

    /// Layer a `config.yml` document (as parsed YAML) under the current
    /// values, matching the original's registry-driven STT/speaker_recognition
    /// sections. Returns a config error if the document can't be parsed.
    pub fn merge_yaml(&mut self, yaml: &str) -> Result<(), serde_yaml::Error> {
        let file_cfg: Config = serde_yaml::from_str(yaml)?;
        if self.stt.providers.is_empty() {
            self.stt.providers = file_cfg.stt.providers;
        }
        if self.stt.default_stream_provider.is_none() {
            self.stt.default_stream_provider = file_cfg.stt.default_stream_provider;
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.redis.url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "redis.url".into(),
                message: "url must not be empty".into(),
            });
        } else if !self.redis.url.starts_with("redis://") && !self.redis.url.starts_with("rediss://")
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "redis.url".into(),
                message: format!(
                    "url must start with redis:// or rediss:// (got \"{}\")",
                    self.redis.url
                ),
            });
        }

        if self.supervisor.check_interval_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "supervisor.check_interval_secs".into(),
                message: "check_interval_secs must be greater than 0".into(),
            });
        }
        if self.supervisor.shutdown_timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "supervisor.shutdown_timeout_secs".into(),
                message: "shutdown_timeout_secs must be greater than 0".into(),
            });
        }
        if self.supervisor.registration_recovery_cooldown_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "supervisor.registration_recovery_cooldown_secs".into(),
                message: "cooldown of 0 disables bulk-restart debouncing".into(),
            });
        }

        // Duplicate worker-name detection across the configured registry.
        let mut seen_names: HashSet<&str> = HashSet::new();
        for (i, worker) in self.supervisor.workers.iter().enumerate() {
            if worker.name.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("supervisor.workers[{i}].name"),
                    message: "worker name must not be empty".into(),
                });
            }
            if !worker.name.is_empty() && !seen_names.insert(&worker.name) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("supervisor.workers[{i}].name"),
                    message: format!("duplicate worker name \"{}\"", worker.name),
                });
            }
        }

        // STT provider validation.
        let mut seen_provider_ids: HashSet<&str> = HashSet::new();
        for (i, provider) in self.stt.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("stt.providers[{i}].id"),
                    message: "provider id must not be empty".into(),
                });
            }
            if provider.url.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("stt.providers[{i}].url"),
                    message: "provider url must not be empty".into(),
                });
            } else if provider.streaming
                && !provider.url.starts_with("ws://")
                && !provider.url.starts_with("wss://")
            {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("stt.providers[{i}].url"),
                    message: format!(
                        "streaming provider url must start with ws:// or wss:// (got \"{}\")",
                        provider.url
                    ),
                });
            }
            if !provider.id.is_empty() && !seen_provider_ids.insert(&provider.id) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("stt.providers[{i}].id"),
                    message: format!(
                        "duplicate provider id \"{}\" — later provider will shadow earlier one",
                        provider.id
                    ),
                });
            }
        }
        if let Some(default_provider) = &self.stt.default_stream_provider {
            if !self.stt.providers.iter().any(|p| &p.id == default_provider) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "stt.default_stream_provider".into(),
                    message: format!(
                        "default_stream_provider \"{default_provider}\" is not in stt.providers"
                    ),
                });
            }
        }

        if self.speaker_recognition.enabled && self.speaker_recognition.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "speaker_recognition.base_url".into(),
                message: "base_url must not be empty when speaker recognition is enabled".into(),
            });
        }

        // Plugin wake-word / regex conditions must compile.
        for (i, plugin) in self.plugins.plugins.iter().enumerate() {
            if let PluginCondition::Regex(pattern) = &plugin.condition {
                if let Err(e) = regex::Regex::new(pattern) {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("plugins.plugins[{i}].condition"),
                        message: format!("invalid regex \"{pattern}\": {e}"),
                    });
                }
            }
        }

        errors
    }
}
