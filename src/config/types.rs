//! Service configuration sections without a home engine module

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Service loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Capacity of the service event channel
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Capacity of the outgoing launch request channel
    #[serde(default = "default_launch_queue_capacity")]
    pub launch_queue_capacity: usize,

    /// Maximum number of simultaneously armed timers
    #[serde(default = "default_timer_capacity")]
    pub timer_capacity: usize,

    /// Ability launch configuration (JSON)
    #[serde(default)]
    pub ability_config: Option<PathBuf>,

    /// Exclude-keys configuration (JSON)
    #[serde(default)]
    pub exclude_keys_config: Option<PathBuf>,
}

fn default_event_queue_capacity() -> usize {
    1024
}
fn default_launch_queue_capacity() -> usize {
    64
}
fn default_timer_capacity() -> usize {
    256
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: default_event_queue_capacity(),
            launch_queue_capacity: default_launch_queue_capacity(),
            timer_capacity: default_timer_capacity(),
            ability_config: None,
            exclude_keys_config: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files (None = console only)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}
