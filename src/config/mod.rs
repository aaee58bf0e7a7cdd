//! Configuration system for botqueue.
//!
//! A single YAML file (~/.config/botqueue/botqueue.yml or .botqueue.yml)
//! with scheduler and retry sections. Every key has a default.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::{GlobalConfig, RetryConfig, SchedulerConfig};

mod global;

/// Load configuration from the standard search paths.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. .botqueue.yml in current directory (project config)
/// 3. ~/.config/botqueue/botqueue.yml (user config)
/// 4. Default values
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<GlobalConfig> {
    GlobalConfig::load(explicit_path)
}
