//! Connection record and its query snapshot.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use super::agent::TransportAgent;

/// Health status of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Registered but not yet evaluated.
    Active,
    Healthy,
    Unhealthy,
    /// Evaluation itself failed.
    Error,
    /// Reserved for owner-side marking; the manager never assigns it.
    Destroyed,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Error => "error",
            Self::Destroyed => "destroyed",
        }
    }

    /// Records in these states are swept by the memory reclaimer.
    #[must_use]
    pub const fn is_reclaimable(self) -> bool {
        matches!(self, Self::Error | Self::Destroyed)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration payload supplied by the connection owner.
#[derive(Debug, Clone)]
pub struct ConnectionData {
    pub agent: Arc<dyn TransportAgent>,
    pub proxy_info: Option<String>,
    /// Latency of the initial connect, in milliseconds.
    pub latency: Option<f64>,
}

impl ConnectionData {
    pub fn new(agent: Arc<dyn TransportAgent>) -> Self {
        Self {
            agent,
            proxy_info: None,
            latency: None,
        }
    }

    #[must_use]
    pub fn with_proxy_info(mut self, proxy_info: impl Into<String>) -> Self {
        self.proxy_info = Some(proxy_info.into());
        self
    }

    #[must_use]
    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency = Some(latency_ms);
        self
    }
}

/// Outcome of one request attempt over a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageUpdate {
    pub error: bool,
    /// The attempt timed out. Implies an error.
    pub timeout: bool,
    /// Observed latency in milliseconds.
    pub latency: Option<f64>,
}

impl UsageUpdate {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure() -> Self {
        Self {
            error: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn timed_out() -> Self {
        Self {
            error: true,
            timeout: true,
            latency: None,
        }
    }

    #[must_use]
    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency = Some(latency_ms);
        self
    }

    fn is_error(&self) -> bool {
        self.error || self.timeout
    }
}

/// Registry entry for one pooled connection.
#[derive(Debug)]
pub(crate) struct ConnectionRecord {
    pub(crate) account_id: String,
    pub(crate) connection_id: String,
    /// Registration order, used to break `created_at` ties.
    pub(crate) seq: u64,
    pub(crate) created_at: Instant,
    pub(crate) registered_at: DateTime<Utc>,
    pub(crate) last_used_at: Instant,
    pub(crate) last_health_check_at: Option<Instant>,
    pub(crate) usage_count: u64,
    pub(crate) error_count: u64,
    pub(crate) last_latency: Option<f64>,
    pub(crate) average_latency: Option<f64>,
    pub(crate) status: ConnectionStatus,
    pub(crate) agent: Arc<dyn TransportAgent>,
    pub(crate) proxy_info: String,
}

impl ConnectionRecord {
    pub(crate) fn new(
        account_id: &str,
        connection_id: &str,
        seq: u64,
        data: ConnectionData,
        now: Instant,
    ) -> Self {
        Self {
            account_id: account_id.to_string(),
            connection_id: connection_id.to_string(),
            seq,
            created_at: now,
            registered_at: Utc::now(),
            last_used_at: now,
            last_health_check_at: None,
            usage_count: 0,
            error_count: 0,
            last_latency: data.latency,
            average_latency: data.latency,
            status: ConnectionStatus::Active,
            agent: data.agent,
            proxy_info: data.proxy_info.unwrap_or_else(|| "unknown".to_string()),
        }
    }

    pub(crate) fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub(crate) fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }

    /// `error_count / usage_count`, undefined until the first use.
    pub(crate) fn error_rate(&self) -> Option<f64> {
        (self.usage_count > 0).then(|| self.error_count as f64 / self.usage_count as f64)
    }

    /// Apply one usage update. Returns true if it counted as an error.
    pub(crate) fn record_usage(&mut self, update: &UsageUpdate, now: Instant) -> bool {
        self.usage_count += 1;
        self.last_used_at = now;

        let is_error = update.is_error();
        if is_error {
            self.error_count += 1;
        }
        if let Some(sample) = update.latency {
            self.last_latency = Some(sample);
            // An unset or zero average restarts from the sample.
            self.average_latency = Some(match self.average_latency {
                Some(avg) if avg > 0.0 => (avg + sample) / 2.0,
                _ => sample,
            });
        }
        is_error
    }

    pub(crate) fn info(&self, now: Instant) -> ConnectionInfo {
        ConnectionInfo {
            account_id: self.account_id.clone(),
            connection_id: self.connection_id.clone(),
            status: self.status,
            proxy_info: self.proxy_info.clone(),
            registered_at: self.registered_at,
            age_ms: duration_ms(self.age(now)),
            idle_ms: duration_ms(self.idle(now)),
            since_health_check_ms: self
                .last_health_check_at
                .map(|at| duration_ms(now.saturating_duration_since(at))),
            usage_count: self.usage_count,
            error_count: self.error_count,
            error_rate: self.error_rate(),
            last_latency_ms: self.last_latency,
            average_latency_ms: self.average_latency,
        }
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Read-only snapshot of a connection record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub account_id: String,
    pub connection_id: String,
    pub status: ConnectionStatus,
    pub proxy_info: String,
    pub registered_at: DateTime<Utc>,
    pub age_ms: u64,
    pub idle_ms: u64,
    pub since_health_check_ms: Option<u64>,
    pub usage_count: u64,
    pub error_count: u64,
    pub error_rate: Option<f64>,
    pub last_latency_ms: Option<f64>,
    pub average_latency_ms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::agent::MockAgent;

    fn record() -> ConnectionRecord {
        let data = ConnectionData::new(MockAgent::new());
        ConnectionRecord::new("acct", "conn", 0, data, Instant::now())
    }

    #[test]
    fn defaults_on_registration() {
        let r = record();
        assert_eq!(r.status, ConnectionStatus::Active);
        assert_eq!(r.usage_count, 0);
        assert_eq!(r.error_count, 0);
        assert_eq!(r.proxy_info, "unknown");
        assert_eq!(r.error_rate(), None);
    }

    #[test]
    fn average_latency_halves_towards_each_sample() {
        let mut r = record();
        let now = Instant::now();
        r.record_usage(&UsageUpdate::success().with_latency(100.0), now);
        assert_eq!(r.average_latency, Some(100.0));
        r.record_usage(&UsageUpdate::success().with_latency(300.0), now);
        assert_eq!(r.average_latency, Some(200.0));
        r.record_usage(&UsageUpdate::success().with_latency(0.0), now);
        assert_eq!(r.average_latency, Some(100.0));
        assert_eq!(r.last_latency, Some(0.0));
    }

    #[test]
    fn only_terminal_statuses_are_reclaimable() {
        let reclaimable: Vec<ConnectionStatus> = [
            ConnectionStatus::Active,
            ConnectionStatus::Healthy,
            ConnectionStatus::Unhealthy,
            ConnectionStatus::Error,
            ConnectionStatus::Destroyed,
        ]
        .into_iter()
        .filter(|s| s.is_reclaimable())
        .collect();
        assert_eq!(
            reclaimable,
            vec![ConnectionStatus::Error, ConnectionStatus::Destroyed]
        );
        assert_eq!(
            serde_json::to_value(ConnectionStatus::Destroyed).unwrap(),
            "destroyed"
        );
    }

    #[test]
    fn timeout_counts_as_error() {
        let mut r = record();
        let now = Instant::now();
        assert!(r.record_usage(&UsageUpdate::timed_out(), now));
        assert!(!r.record_usage(&UsageUpdate::success(), now));
        assert_eq!(r.usage_count, 2);
        assert_eq!(r.error_count, 1);
        assert_eq!(r.error_rate(), Some(0.5));
    }
}
