//! Connection lifecycle configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Timing and capacity settings for the lifecycle manager.
///
/// All durations are in milliseconds so the file format stays flat and
/// matches what the connection owner already reports (latency in ms).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Age after which a connection is considered stale.
    #[serde(default = "default_max_connection_age_ms")]
    pub max_connection_age_ms: u64,
    /// Interval of the fallback health evaluator.
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Interval of the rotation scheduler.
    #[serde(default = "default_connection_rotation_interval_ms")]
    pub connection_rotation_interval_ms: u64,
    /// Idle time after which a connection is considered inactive.
    #[serde(default = "default_inactive_connection_threshold_ms")]
    pub inactive_connection_threshold_ms: u64,
    /// Interval of the memory reclaimer.
    #[serde(default = "default_memory_cleanup_interval_ms")]
    pub memory_cleanup_interval_ms: u64,
    /// Interval of the performance analyzer.
    #[serde(default = "default_performance_analysis_interval_ms")]
    pub performance_analysis_interval_ms: u64,
    /// Maximum live connections per account before the oldest is evicted.
    #[serde(default = "default_max_connections_per_account")]
    pub max_connections_per_account: usize,
    /// Connect timeout used by the connection owner. Not enforced here.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Buffer size of the event broadcast channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

const fn default_max_connection_age_ms() -> u64 {
    60 * 60 * 1000 // 60 minutes
}

const fn default_health_check_interval_ms() -> u64 {
    5 * 60 * 1000 // 5 minutes
}

const fn default_connection_rotation_interval_ms() -> u64 {
    30 * 60 * 1000 // 30 minutes
}

const fn default_inactive_connection_threshold_ms() -> u64 {
    20 * 60 * 1000 // 20 minutes
}

const fn default_memory_cleanup_interval_ms() -> u64 {
    10 * 60 * 1000 // 10 minutes
}

const fn default_performance_analysis_interval_ms() -> u64 {
    2 * 60 * 1000 // 2 minutes
}

const fn default_max_connections_per_account() -> usize {
    3
}

const fn default_connection_timeout_ms() -> u64 {
    30_000
}

const fn default_event_channel_capacity() -> usize {
    1024
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_connection_age_ms: default_max_connection_age_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            connection_rotation_interval_ms: default_connection_rotation_interval_ms(),
            inactive_connection_threshold_ms: default_inactive_connection_threshold_ms(),
            memory_cleanup_interval_ms: default_memory_cleanup_interval_ms(),
            performance_analysis_interval_ms: default_performance_analysis_interval_ms(),
            max_connections_per_account: default_max_connections_per_account(),
            connection_timeout_ms: default_connection_timeout_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl LifecycleConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when any interval, threshold,
    /// or capacity is zero.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &'static str| -> crate::error::Error {
            ConfigError::InvalidValue {
                field,
                reason: "must be > 0".to_string(),
            }
            .into()
        };

        let non_zero = [
            ("max_connection_age_ms", self.max_connection_age_ms),
            ("health_check_interval_ms", self.health_check_interval_ms),
            (
                "connection_rotation_interval_ms",
                self.connection_rotation_interval_ms,
            ),
            (
                "inactive_connection_threshold_ms",
                self.inactive_connection_threshold_ms,
            ),
            ("memory_cleanup_interval_ms", self.memory_cleanup_interval_ms),
            (
                "performance_analysis_interval_ms",
                self.performance_analysis_interval_ms,
            ),
        ];
        if let Some((field, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(invalid(*field));
        }
        if self.max_connections_per_account == 0 {
            return Err(invalid("max_connections_per_account"));
        }
        if self.event_channel_capacity == 0 {
            return Err(invalid("event_channel_capacity"));
        }
        Ok(())
    }

    pub fn max_connection_age(&self) -> Duration {
        Duration::from_millis(self.max_connection_age_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn connection_rotation_interval(&self) -> Duration {
        Duration::from_millis(self.connection_rotation_interval_ms)
    }

    pub fn inactive_connection_threshold(&self) -> Duration {
        Duration::from_millis(self.inactive_connection_threshold_ms)
    }

    pub fn memory_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.memory_cleanup_interval_ms)
    }

    pub fn performance_analysis_interval(&self) -> Duration {
        Duration::from_millis(self.performance_analysis_interval_ms)
    }
}
