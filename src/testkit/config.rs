//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.

use crate::config::LifecycleConfig;

/// Default lifecycle config with the given per-account limit.
pub fn lifecycle(max_connections_per_account: usize) -> LifecycleConfig {
    LifecycleConfig {
        max_connections_per_account,
        ..LifecycleConfig::default()
    }
}

/// Short intervals for tests that let the timers fire on a paused clock.
///
/// Thresholds keep their production values so timer-driven sweeps see the
/// same verdicts as manual ones.
pub fn fast_timers() -> LifecycleConfig {
    LifecycleConfig {
        health_check_interval_ms: 1_000,
        connection_rotation_interval_ms: 2_000,
        memory_cleanup_interval_ms: 3_000,
        performance_analysis_interval_ms: 4_000,
        ..LifecycleConfig::default()
    }
}
