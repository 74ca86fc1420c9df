//! Lifecycle events and the broadcast bus that delivers them.
//!
//! Every event kind has a stable name (see [`LifecycleEvent::kind`]) so
//! external consumers can filter without matching on variants.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use super::analysis::{PerformanceIssue, PerformanceReport};
use super::registry::LifecycleStats;

/// Reason attached to every recreation request.
pub const RECREATION_REASON: &str = "lifecycle_management";

/// What prompted a recreation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecreationTrigger {
    HealthCheck,
    Rotation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRegistered {
    pub account_id: String,
    pub connection_id: String,
    pub proxy_info: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionUnregistered {
    pub account_id: String,
    pub connection_id: String,
    pub reason: String,
    /// Total time the connection spent in the registry.
    pub lifetime_ms: u64,
    pub usage_count: u64,
    pub error_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// Ask the connection owner to replace a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecreationRequest {
    pub account_id: String,
    pub connection_id: String,
    pub reason: String,
    pub trigger: RecreationTrigger,
    /// Specific policy that fired, e.g. `max_age` or `high_error_rate`.
    pub cause: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheckSummary {
    pub checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum LifecycleEvent {
    #[serde(rename = "connection:registered")]
    Registered(ConnectionRegistered),
    #[serde(rename = "connection:unregistered")]
    Unregistered(ConnectionUnregistered),
    #[serde(rename = "connection:recreation:requested")]
    RecreationRequested(RecreationRequest),
    #[serde(rename = "health:check:completed")]
    HealthCheckCompleted(HealthCheckSummary),
    #[serde(rename = "performance:analysis")]
    PerformanceAnalysis(Box<PerformanceReport>),
    #[serde(rename = "performance:issue")]
    PerformanceIssue(PerformanceIssue),
    #[serde(rename = "lifecycle:started")]
    Started { timestamp: DateTime<Utc> },
    #[serde(rename = "lifecycle:stopped")]
    Stopped {
        final_stats: LifecycleStats,
        timestamp: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    /// Stable event name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Registered(_) => "connection:registered",
            Self::Unregistered(_) => "connection:unregistered",
            Self::RecreationRequested(_) => "connection:recreation:requested",
            Self::HealthCheckCompleted(_) => "health:check:completed",
            Self::PerformanceAnalysis(_) => "performance:analysis",
            Self::PerformanceIssue(_) => "performance:issue",
            Self::Started { .. } => "lifecycle:started",
            Self::Stopped { .. } => "lifecycle:stopped",
        }
    }
}

/// Broadcast fan-out for lifecycle events.
///
/// Sending never fails from the emitter's point of view: no receivers is
/// fine, and slow receivers observe `RecvError::Lagged`.
#[derive(Debug)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: LifecycleEvent) {
        trace!(event = event.kind(), "Emitting lifecycle event");
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_name_tag() {
        let event = LifecycleEvent::HealthCheckCompleted(HealthCheckSummary {
            checked: 2,
            healthy: 1,
            unhealthy: 1,
            timestamp: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "health:check:completed");
        assert_eq!(json["checked"], 2);
        assert_eq!(json["event"], event.kind());
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.emit(LifecycleEvent::Started {
            timestamp: Utc::now(),
        });

        let mut rx = bus.subscribe();
        bus.emit(LifecycleEvent::Started {
            timestamp: Utc::now(),
        });
        assert_eq!(rx.try_recv().unwrap().kind(), "lifecycle:started");
    }
}
