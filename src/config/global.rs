//! Global configuration.
//!
//! Loaded from ~/.config/botqueue/botqueue.yml or .botqueue.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration for botqueue.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Log level used when RUST_LOG is unset.
    #[serde(rename = "log-level")]
    pub log_level: String,

    /// Request scheduling settings.
    pub scheduler: SchedulerConfig,

    /// Retry settings for failed iterations.
    pub retry: RetryConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .botqueue.yml in current directory
    /// 3. ~/.config/botqueue/botqueue.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".botqueue.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .botqueue.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .botqueue.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("botqueue").join("botqueue.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.action_delay_ms == 0 {
            eyre::bail!("scheduler.action-delay-ms must be > 0");
        }
        if self.scheduler.quote_history == 0 {
            eyre::bail!("scheduler.quote-history must be > 0");
        }
        if self.retry.enabled && self.retry.max_attempts == 0 {
            eyre::bail!("retry.max-attempts must be > 0 when retries are enabled");
        }
        Ok(())
    }
}

/// Request scheduling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Spacing between two iterations of one request.
    #[serde(rename = "action-delay-ms")]
    pub action_delay_ms: u64,

    /// How long a worker stays reserved after its request's lease ends.
    #[serde(rename = "worker-cooldown-ms")]
    pub worker_cooldown_ms: u64,

    /// How long a requester waits after their last expected action.
    #[serde(rename = "user-cooldown-ms")]
    pub user_cooldown_ms: u64,

    /// Minimum spacing between any two request starts.
    #[serde(rename = "global-cooldown-ms")]
    pub global_cooldown_ms: u64,

    /// Extra cooldown applied on a rate-limit response.
    #[serde(rename = "rate-limit-penalty-ms")]
    pub rate_limit_penalty_ms: u64,

    /// Shuffle worker order per request and per lap.
    #[serde(rename = "randomize-accounts")]
    pub randomize_accounts: bool,

    /// Number of recent quotes that may not be repeated.
    #[serde(rename = "quote-history")]
    pub quote_history: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            action_delay_ms: 15_000,
            worker_cooldown_ms: 600_000, // 10 minutes
            user_cooldown_ms: 60_000,
            global_cooldown_ms: 10_000,
            rate_limit_penalty_ms: 300_000, // 5 minutes
            randomize_accounts: false,
            quote_history: 5,
        }
    }
}

impl SchedulerConfig {
    pub fn action_delay(&self) -> Duration {
        Duration::from_millis(self.action_delay_ms)
    }
}

/// Retry settings for failed iterations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Whether failed iterations are retried after a run.
    pub enabled: bool,

    /// Maximum retry rounds per request.
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Wait between the end of a run and its retry round.
    #[serde(rename = "delay-ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 2,
            delay_ms: 300_000, // 5 minutes
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
