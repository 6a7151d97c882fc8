//! Background repair worker configuration.

use serde::{Deserialize, Serialize};

/// Settings for the worker that re-applies failed storage effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Whether the worker is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval in seconds between polls of the repair queue.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Number of tickets processed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Attempts after which a ticket is left for manual inspection.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    30
}

fn default_batch_size() -> usize {
    50
}

fn default_max_attempts() -> i32 {
    10
}
