//! Rotation scheduler.
//!
//! Flags connections for proactive replacement on soft signals, before they
//! fail the hard health check. Rotation only emits a recreation request; the
//! record stays until the owner unregisters or re-registers it.

use tokio::time::Instant;
use tracing::{debug, info};

use super::event::RecreationTrigger;
use super::record::ConnectionRecord;
use super::state::Shared;
use crate::config::LifecycleConfig;

/// Error rate above which a busy connection is rotated.
pub(crate) const ROTATION_ERROR_RATE: f64 = 0.15;

/// Usage count a connection must exceed before its error rate is trusted.
pub(crate) const ROTATION_MIN_USAGE: u64 = 10;

/// Average latency (ms) above which a connection is rotated.
pub(crate) const ROTATION_MAX_AVERAGE_LATENCY_MS: f64 = 5000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RotationCause {
    MaxAge,
    ErrorTrend,
    SlowLatency,
    Inactive,
}

impl RotationCause {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::MaxAge => "max_age",
            Self::ErrorTrend => "error_trend",
            Self::SlowLatency => "slow_latency",
            Self::Inactive => "inactive",
        }
    }
}

/// Decide whether a connection is due for rotation.
pub(crate) fn rotation_cause(
    record: &ConnectionRecord,
    config: &LifecycleConfig,
    now: Instant,
) -> Option<RotationCause> {
    if record.age(now) > config.max_connection_age() {
        return Some(RotationCause::MaxAge);
    }
    let trending_errors = record.usage_count > ROTATION_MIN_USAGE
        && record
            .error_rate()
            .is_some_and(|rate| rate > ROTATION_ERROR_RATE);
    if trending_errors {
        return Some(RotationCause::ErrorTrend);
    }
    if record
        .average_latency
        .is_some_and(|avg| avg > ROTATION_MAX_AVERAGE_LATENCY_MS)
    {
        return Some(RotationCause::SlowLatency);
    }
    if record.idle(now) > config.inactive_connection_threshold() {
        return Some(RotationCause::Inactive);
    }
    None
}

/// Request recreation of every connection due for rotation.
///
/// Returns the number of rotation requests emitted.
pub(crate) fn run_rotation(shared: &Shared) -> usize {
    let now = Instant::now();
    let due: Vec<(String, String, RotationCause)> = {
        let mut registry = shared.registry.lock();
        let due: Vec<_> = registry
            .records()
            .filter_map(|r| {
                rotation_cause(r, &shared.config, now)
                    .map(|cause| (r.account_id.clone(), r.connection_id.clone(), cause))
            })
            .collect();
        registry.counters_mut().total_rotated += due.len() as u64;
        due
    };

    for (account_id, connection_id, cause) in &due {
        info!(
            account_id = %account_id,
            connection_id = %connection_id,
            cause = cause.as_str(),
            "Scheduling connection rotation"
        );
        shared.request_recreation(
            account_id,
            connection_id,
            RecreationTrigger::Rotation,
            cause.as_str(),
        );
    }

    debug!(rotated = due.len(), "Rotation sweep completed");
    due.len()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::lifecycle::record::{ConnectionData, UsageUpdate};
    use crate::testkit::agent::MockAgent;

    fn record_at(now: Instant) -> ConnectionRecord {
        ConnectionRecord::new("acct", "conn", 0, ConnectionData::new(MockAgent::new()), now)
    }

    fn use_times(record: &mut ConnectionRecord, ok: u64, failed: u64, now: Instant) {
        for _ in 0..ok {
            record.record_usage(&UsageUpdate::success(), now);
        }
        for _ in 0..failed {
            record.record_usage(&UsageUpdate::failure(), now);
        }
    }

    #[test]
    fn fresh_connection_is_not_rotated() {
        let now = Instant::now();
        let config = LifecycleConfig::default();
        assert_eq!(rotation_cause(&record_at(now), &config, now), None);
    }

    #[test]
    fn error_trend_needs_more_than_ten_uses() {
        let now = Instant::now();
        let config = LifecycleConfig::default();

        let mut busy = record_at(now);
        use_times(&mut busy, 9, 2, now);
        assert_eq!(
            rotation_cause(&busy, &config, now),
            Some(RotationCause::ErrorTrend)
        );

        let mut quiet = record_at(now);
        use_times(&mut quiet, 5, 5, now);
        assert_eq!(rotation_cause(&quiet, &config, now), None);
    }

    #[test]
    fn slow_average_latency_rotates() {
        let now = Instant::now();
        let config = LifecycleConfig::default();
        let mut r = record_at(now);
        r.record_usage(&UsageUpdate::success().with_latency(5001.0), now);
        assert_eq!(
            rotation_cause(&r, &config, now),
            Some(RotationCause::SlowLatency)
        );
    }

    #[test]
    fn age_and_inactivity_rotate() {
        let start = Instant::now();
        let config = LifecycleConfig::default();
        let r = record_at(start);

        let idle_later = start + config.inactive_connection_threshold() + Duration::from_secs(1);
        assert_eq!(
            rotation_cause(&r, &config, idle_later),
            Some(RotationCause::Inactive)
        );

        let aged = start + config.max_connection_age() + Duration::from_secs(1);
        assert_eq!(rotation_cause(&r, &config, aged), Some(RotationCause::MaxAge));
    }
}
