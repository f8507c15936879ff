//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations and serde defaults
//! 2. **Config file**: TOML file named by the `VPNSCOPE_CONFIG` env var
//! 3. **Environment variables**: `VPNSCOPE__SECTION__FIELD` overrides
//!
//! # Configuration Sections
//!
//! - [`LoggingConfig`]: log level and format
//! - [`OrchestratorConfig`]: per-source timeout, check ceiling, pool width, de-duplication
//! - [`VerdictConfig`]: algorithm, consensus threshold, sequential cascade
//! - [`CacheConfig`]: verdict cache TTL and size
//! - [`HealthConfig`]: hard-failure policy
//! - [`QuotaConfig`]: quota window length
//! - [`AnalyticsConfig`]: roster batch ceiling and width
//! - [`SourceConfig`]: the source list
//!
//! # Example
//!
//! ```toml
//! [verdict]
//! algorithm = "consensus"
//! min_consensus = 0.6
//!
//! [[sources]]
//! name = "local"
//! kind = "blocklist"
//! path = "config/blocklist.txt"
//!
//! [[sources]]
//! name = "teoh"
//! kind = "plugin"
//! daily_quota = 1000
//! ```

use crate::{
    analytics::AnalyticsConfig,
    cache::CacheConfig,
    orchestrator::OrchestratorConfig,
    source::{quota::DEFAULT_RESET_INTERVAL, HardFailurePolicy, HealthConfig, SourceSettings},
    verdict::{AlgorithmMethod, DEFAULT_MIN_CONSENSUS},
};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "VPNSCOPE_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset. Defaults to `info`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `pretty`. Defaults to `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictConfig {
    #[serde(default)]
    pub algorithm: AlgorithmMethod,

    /// Fraction of contributing sources that must be positive. Defaults to `0.6`.
    #[serde(default = "default_min_consensus")]
    pub min_consensus: f64,

    /// Dispatch cascade checks one source at a time and stop at the first positive.
    #[serde(default)]
    pub cascade_sequential: bool,
}

fn default_min_consensus() -> f64 {
    DEFAULT_MIN_CONSENSUS
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmMethod::default(),
            min_consensus: default_min_consensus(),
            cascade_sequential: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Length of a quota window. Defaults to 24 hours.
    #[serde(default = "default_reset_interval_seconds")]
    pub reset_interval_seconds: u64,
}

fn default_reset_interval_seconds() -> u64 {
    DEFAULT_RESET_INTERVAL.as_secs()
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { reset_interval_seconds: default_reset_interval_seconds() }
    }
}

impl QuotaConfig {
    #[must_use]
    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.reset_interval_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Built-in offline source loaded from `path`.
    Blocklist,
    /// Source supplied in code; the entry only carries settings.
    Plugin,
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,

    pub kind: SourceKind,

    /// Blocklist file. Required for `blocklist` sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_source_enabled")]
    pub enabled: bool,

    /// Overrides the source's own quota.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_quota: Option<u64>,

    /// Overrides the source's own concurrency tolerance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

fn default_source_enabled() -> bool {
    true
}

impl SourceConfig {
    /// Registration settings for this entry.
    #[must_use]
    pub fn settings(&self, quota: &QuotaConfig, health: HealthConfig) -> SourceSettings {
        SourceSettings {
            enabled: self.enabled,
            daily_quota: self.daily_quota,
            max_concurrency: self.max_concurrency,
            reset_interval: quota.reset_interval(),
            health,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment label. Defaults to `development`.
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub verdict: VerdictConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            logging: LoggingConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            verdict: VerdictConfig::default(),
            cache: CacheConfig::default(),
            health: HealthConfig::default(),
            quota: QuotaConfig::default(),
            analytics: AnalyticsConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `VPNSCOPE__` prefix override any scalar value, using `__`
    /// between nested fields (e.g. `VPNSCOPE__VERDICT__MIN_CONSENSUS=0.5`). A missing file is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        Self::from_sources(
            config_path.as_ref(),
            Environment::with_prefix("VPNSCOPE").separator("__").try_parsing(true),
        )
    }

    fn from_sources(config_path: &Path, env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("environment", "development")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::from(config_path).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()
    }

    /// Loads configuration from [`CONFIG_PATH_ENV`], falling back to
    /// [`DEFAULT_CONFIG_PATH`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(config_path)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string for the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        self.orchestrator.validate()?;

        if !(0.0..=1.0).contains(&self.verdict.min_consensus) {
            return Err(format!(
                "min_consensus must be within [0, 1], got {}",
                self.verdict.min_consensus
            ));
        }

        if self.cache.enabled {
            if self.cache.ttl_seconds == 0 {
                return Err("Cache TTL must be greater than 0".to_string());
            }
            if self.cache.max_entries == 0 {
                return Err("Cache max_entries must be greater than 0".to_string());
            }
        }

        if self.health.hard_failure_policy == HardFailurePolicy::Cooldown &&
            self.health.cooldown_seconds == 0
        {
            return Err("cooldown_seconds must be greater than 0 for the cooldown policy".to_string());
        }

        if self.quota.reset_interval_seconds == 0 {
            return Err("Quota reset interval must be greater than 0".to_string());
        }

        if self.analytics.batch_ceiling_seconds == 0 {
            return Err("Analytics batch ceiling must be greater than 0".to_string());
        }
        if self.analytics.max_concurrent_checks == 0 {
            return Err("Analytics max_concurrent_checks must be greater than 0".to_string());
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err("Source name must not be empty".to_string());
            }
            if !names.insert(source.name.as_str()) {
                return Err(format!("Duplicate source name: {}", source.name));
            }
            if source.kind == SourceKind::Blocklist && source.path.is_none() {
                return Err(format!("Blocklist source {} has no path", source.name));
            }
            if source.max_concurrency == Some(0) {
                return Err(format!("max_concurrency for source {} must be greater than 0", source.name));
            }
        }

        Ok(())
    }

    /// Registration settings for a configured source, if present.
    #[must_use]
    pub fn source_settings(&self, name: &str) -> Option<SourceSettings> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.settings(&self.quota, self.health))
    }
}
