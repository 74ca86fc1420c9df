//! Fallback health evaluator.
//!
//! Re-derives a verdict for every registered connection from state the
//! registry already holds, independent of whatever health view the
//! connection owner keeps. Checks run in a fixed order:
//!
//! 1. **Warm-up**: a never-used connection is healthy until it exceeds
//!    1.5x the maximum age. Nothing else is checked for it, since a fresh
//!    proxy connection legitimately looks idle.
//! 2. **Age**: older than `max_connection_age`.
//! 3. **Inactivity**: idle longer than `inactive_connection_threshold`.
//! 4. **Error rate**: more than 20% of attempts failed.
//! 5. **Transport state**: the agent reports no open/opening socket and no
//!    idle socket.
//!
//! Unhealthy connections are never destroyed here; the owner receives a
//! recreation request instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::agent::{socket_state_guarded, TransportAgent};
use super::event::{HealthCheckSummary, LifecycleEvent, RecreationTrigger};
use super::record::{ConnectionRecord, ConnectionStatus};
use super::state::Shared;
use crate::config::LifecycleConfig;
use crate::error::TransportError;

/// Error rate above which a used connection is unhealthy.
pub(crate) const MAX_HEALTHY_ERROR_RATE: f64 = 0.20;

/// Multiple of the maximum age an unused connection may reach.
pub(crate) const WARMUP_AGE_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnhealthyReason {
    WarmupExpired,
    MaxAge,
    Inactive,
    HighErrorRate,
    NoLiveSockets,
}

impl UnhealthyReason {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::WarmupExpired => "warmup_expired",
            Self::MaxAge => "max_age",
            Self::Inactive => "inactive",
            Self::HighErrorRate => "high_error_rate",
            Self::NoLiveSockets => "no_live_sockets",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HealthVerdict {
    Healthy,
    Unhealthy(UnhealthyReason),
    /// The evaluation itself failed. Counted as unhealthy.
    Error(TransportError),
}

impl HealthVerdict {
    pub(crate) const fn status(&self) -> ConnectionStatus {
        match self {
            Self::Healthy => ConnectionStatus::Healthy,
            Self::Unhealthy(_) => ConnectionStatus::Unhealthy,
            Self::Error(_) => ConnectionStatus::Error,
        }
    }
}

/// Everything the evaluator needs from one record, captured under the lock.
#[derive(Debug, Clone)]
pub(crate) struct HealthProbe {
    pub(crate) account_id: String,
    pub(crate) connection_id: String,
    /// Pins the registration the verdict belongs to.
    pub(crate) seq: u64,
    pub(crate) age: Duration,
    pub(crate) idle: Duration,
    pub(crate) usage_count: u64,
    pub(crate) error_count: u64,
    pub(crate) agent: Arc<dyn TransportAgent>,
}

impl HealthProbe {
    pub(crate) fn capture(record: &ConnectionRecord, now: Instant) -> Self {
        Self {
            account_id: record.account_id.clone(),
            connection_id: record.connection_id.clone(),
            seq: record.seq,
            age: record.age(now),
            idle: record.idle(now),
            usage_count: record.usage_count,
            error_count: record.error_count,
            agent: Arc::clone(&record.agent),
        }
    }
}

/// Evaluate one connection.
pub(crate) fn evaluate(probe: &HealthProbe, config: &LifecycleConfig) -> HealthVerdict {
    let max_age = config.max_connection_age();

    if probe.usage_count == 0 {
        return if probe.age > max_age.mul_f64(WARMUP_AGE_FACTOR) {
            HealthVerdict::Unhealthy(UnhealthyReason::WarmupExpired)
        } else {
            HealthVerdict::Healthy
        };
    }

    if probe.age > max_age {
        return HealthVerdict::Unhealthy(UnhealthyReason::MaxAge);
    }
    if probe.idle > config.inactive_connection_threshold() {
        return HealthVerdict::Unhealthy(UnhealthyReason::Inactive);
    }

    let error_rate = probe.error_count as f64 / probe.usage_count as f64;
    if error_rate > MAX_HEALTHY_ERROR_RATE {
        return HealthVerdict::Unhealthy(UnhealthyReason::HighErrorRate);
    }

    match socket_state_guarded(probe.agent.as_ref()) {
        None => HealthVerdict::Healthy,
        Some(Ok(state)) if state.is_exhausted() => {
            HealthVerdict::Unhealthy(UnhealthyReason::NoLiveSockets)
        }
        Some(Ok(_)) => HealthVerdict::Healthy,
        Some(Err(e)) => HealthVerdict::Error(e),
    }
}

/// Evaluate every registered connection and request recreation of the
/// unhealthy ones.
pub(crate) fn run_health_check(shared: &Shared) -> HealthCheckSummary {
    let now = Instant::now();
    let probes: Vec<HealthProbe> = {
        let registry = shared.registry.lock();
        registry
            .records()
            .map(|r| HealthProbe::capture(r, now))
            .collect()
    };

    // Agents are inspected without holding the registry lock.
    let verdicts: Vec<(HealthProbe, HealthVerdict)> = probes
        .into_iter()
        .map(|probe| {
            let verdict = evaluate(&probe, &shared.config);
            (probe, verdict)
        })
        .collect();

    // Connections unregistered or re-registered mid-sweep are dropped from
    // the results.
    let verdicts: Vec<(HealthProbe, HealthVerdict)> = {
        let mut registry = shared.registry.lock();
        verdicts
            .into_iter()
            .filter(|(probe, verdict)| {
                let Some(record) = registry.get_if_seq_mut(&probe.connection_id, probe.seq) else {
                    return false;
                };
                record.status = verdict.status();
                record.last_health_check_at = Some(now);
                true
            })
            .collect()
    };

    let mut healthy = 0;
    let mut unhealthy = 0;
    for (probe, verdict) in &verdicts {
        let cause = match verdict {
            HealthVerdict::Healthy => {
                healthy += 1;
                continue;
            }
            HealthVerdict::Unhealthy(reason) => {
                warn!(
                    account_id = %probe.account_id,
                    connection_id = %probe.connection_id,
                    reason = reason.as_str(),
                    age_secs = probe.age.as_secs(),
                    usage = probe.usage_count,
                    errors = probe.error_count,
                    "Connection unhealthy"
                );
                reason.as_str()
            }
            HealthVerdict::Error(e) => {
                warn!(
                    account_id = %probe.account_id,
                    connection_id = %probe.connection_id,
                    error = %e,
                    "Health evaluation failed"
                );
                "evaluation_error"
            }
        };
        unhealthy += 1;
        shared.request_recreation(
            &probe.account_id,
            &probe.connection_id,
            RecreationTrigger::HealthCheck,
            cause,
        );
    }

    let summary = HealthCheckSummary {
        checked: verdicts.len(),
        healthy,
        unhealthy,
        timestamp: Utc::now(),
    };
    if unhealthy > 0 {
        info!(
            checked = summary.checked,
            healthy, unhealthy, "Health check completed"
        );
    } else {
        debug!(checked = summary.checked, "Health check completed");
    }
    shared
        .events
        .emit(LifecycleEvent::HealthCheckCompleted(summary.clone()));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::agent::{SocketReadiness, SocketState};
    use crate::testkit::agent::MockAgent;

    const MINUTE: Duration = Duration::from_secs(60);

    fn probe(age: Duration, idle: Duration, usage: u64, errors: u64) -> HealthProbe {
        probe_with(MockAgent::new(), age, idle, usage, errors)
    }

    fn probe_with(
        agent: Arc<MockAgent>,
        age: Duration,
        idle: Duration,
        usage: u64,
        errors: u64,
    ) -> HealthProbe {
        HealthProbe {
            account_id: "acct".into(),
            connection_id: "conn".into(),
            seq: 0,
            age,
            idle,
            usage_count: usage,
            error_count: errors,
            agent,
        }
    }

    #[test]
    fn warmup_connection_is_healthy_until_one_and_a_half_max_age() {
        let config = LifecycleConfig::default();
        let max_age = config.max_connection_age();

        let young = probe(max_age.mul_f64(1.4), max_age.mul_f64(1.4), 0, 0);
        assert_eq!(evaluate(&young, &config), HealthVerdict::Healthy);

        let expired = probe(max_age.mul_f64(1.6), max_age.mul_f64(1.6), 0, 0);
        assert_eq!(
            evaluate(&expired, &config),
            HealthVerdict::Unhealthy(UnhealthyReason::WarmupExpired)
        );
    }

    #[test]
    fn warmup_connection_skips_socket_inspection() {
        let config = LifecycleConfig::default();
        let agent = MockAgent::with_socket_state(SocketState::default());
        let p = probe_with(agent.clone(), MINUTE, MINUTE, 0, 0);

        assert_eq!(evaluate(&p, &config), HealthVerdict::Healthy);
        assert_eq!(agent.inspect_count(), 0);
    }

    #[test]
    fn used_connection_past_max_age_is_unhealthy() {
        let config = LifecycleConfig::default();
        let p = probe(61 * MINUTE, MINUTE, 5, 0);
        assert_eq!(
            evaluate(&p, &config),
            HealthVerdict::Unhealthy(UnhealthyReason::MaxAge)
        );
    }

    #[test]
    fn idle_connection_is_unhealthy() {
        let config = LifecycleConfig::default();
        let p = probe(30 * MINUTE, 21 * MINUTE, 5, 0);
        assert_eq!(
            evaluate(&p, &config),
            HealthVerdict::Unhealthy(UnhealthyReason::Inactive)
        );
    }

    #[test]
    fn error_rate_threshold_is_exclusive() {
        let config = LifecycleConfig::default();
        let over = probe(MINUTE, MINUTE, 100, 21);
        assert_eq!(
            evaluate(&over, &config),
            HealthVerdict::Unhealthy(UnhealthyReason::HighErrorRate)
        );

        let at = probe(MINUTE, MINUTE, 100, 20);
        assert_eq!(evaluate(&at, &config), HealthVerdict::Healthy);
    }

    #[test]
    fn exhausted_sockets_mark_used_connection_unhealthy() {
        let config = LifecycleConfig::default();
        let agent = MockAgent::with_socket_state(SocketState {
            sockets: vec![SocketReadiness::Closed],
            free_sockets: 0,
        });
        let p = probe_with(agent, MINUTE, MINUTE, 3, 0);
        assert_eq!(
            evaluate(&p, &config),
            HealthVerdict::Unhealthy(UnhealthyReason::NoLiveSockets)
        );

        let agent = MockAgent::with_socket_state(SocketState {
            sockets: vec![],
            free_sockets: 1,
        });
        let p = probe_with(agent, MINUTE, MINUTE, 3, 0);
        assert_eq!(evaluate(&p, &config), HealthVerdict::Healthy);
    }

    #[test]
    fn introspection_failure_yields_error_verdict() {
        let config = LifecycleConfig::default();
        let agent = MockAgent::new();
        agent.set_socket_state(Some(Err(TransportError::Introspection("boom".into()))));
        let p = probe_with(agent, MINUTE, MINUTE, 3, 0);

        let verdict = evaluate(&p, &config);
        assert_eq!(verdict.status(), ConnectionStatus::Error);
    }
}
