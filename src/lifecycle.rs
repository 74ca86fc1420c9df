//! Connection lifecycle and health management.
//!
//! The [`LifecycleManager`] tracks every pooled upstream connection from
//! registration to removal. The connection owner reports establishment,
//! usage, and loss; four periodic policies inspect the registry and ask the
//! owner to recreate connections that should be replaced.
//!
//! # Architecture
//!
//! ```text
//! owner ──register/update/unregister──▶ Shared { Mutex<Registry>, EventBus }
//!                                           ▲
//!   health_check ─┐                         │
//!   rotation ─────┼── tokio tasks ──────────┘
//!   memory_cleanup┤
//!   performance ──┘          EventBus ──▶ subscribers (recreation requests, ...)
//! ```
//!
//! The manager only destroys transport itself for capacity eviction and
//! shutdown. Every other replacement is a
//! [`RecreationRequest`](event::RecreationRequest) for the owner to act on.

pub mod agent;
pub mod analysis;
pub mod event;
pub mod reclaim;
pub mod record;
pub mod registry;

mod health;
mod rotation;
mod schedule;
mod state;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::LifecycleConfig;
use crate::error::Result;

pub use agent::{SocketReadiness, SocketState, TransportAgent};
pub use analysis::PerformanceReport;
pub use event::{HealthCheckSummary, LifecycleEvent, RecreationRequest, RecreationTrigger};
pub use reclaim::MemoryCleanup;
pub use record::{ConnectionData, ConnectionInfo, ConnectionStatus, UsageUpdate};
pub use registry::LifecycleStats;

use state::Shared;

/// Reasons attached to unregistration events.
pub mod reason {
    /// Evicted because the account exceeded its connection limit.
    pub const CONNECTION_LIMIT_EXCEEDED: &str = "connection_limit_exceeded";
    /// Removed by the memory reclaimer.
    pub const MEMORY_CLEANUP: &str = "memory_cleanup";
    /// Removed during [`LifecycleManager::stop`](super::LifecycleManager::stop).
    pub const SHUTDOWN: &str = "lifecycle_shutdown";
    /// Superseded by a registration with the same connection id.
    pub const REPLACED: &str = "replaced";
}

/// Full introspection bundle for status dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub config: LifecycleConfig,
    pub stats: LifecycleStats,
    pub performance_report: PerformanceReport,
    pub timestamp: DateTime<Utc>,
}

/// Registry of pooled connections plus its periodic maintenance policies.
///
/// Registration, usage, and query methods are synchronous and may be called
/// from any thread. [`start`](Self::start) must be called from within a
/// tokio runtime.
pub struct LifecycleManager {
    shared: Arc<Shared>,
    tasks: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl LifecycleManager {
    /// Create a manager. No timers run until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn new(config: LifecycleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared::new(config)),
            tasks: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.shared.config
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.shared.events.subscribe()
    }

    /// Start the four maintenance loops.
    ///
    /// Returns false (and does nothing) if already running.
    pub fn start(&self) -> bool {
        {
            let mut tasks = self.tasks.lock();
            if tasks.is_some() {
                info!("Lifecycle manager already running");
                return false;
            }
            *tasks = Some(schedule::spawn_all(&self.shared));
        }

        let config = &self.shared.config;
        info!(
            health_check_ms = config.health_check_interval_ms,
            rotation_ms = config.connection_rotation_interval_ms,
            memory_cleanup_ms = config.memory_cleanup_interval_ms,
            performance_analysis_ms = config.performance_analysis_interval_ms,
            max_per_account = config.max_connections_per_account,
            "Lifecycle manager started"
        );
        self.shared.events.emit(LifecycleEvent::Started {
            timestamp: Utc::now(),
        });
        true
    }

    /// Halt the maintenance loops, destroy every remaining connection, and
    /// reset the counters.
    ///
    /// Timers are fully stopped before the registry is touched. Safe to call
    /// repeatedly; `lifecycle:stopped` is only emitted when the manager was
    /// running.
    pub async fn stop(&self) {
        let handles = self.tasks.lock().take();
        let was_running = handles.is_some();
        if let Some(handles) = handles {
            for handle in &handles {
                handle.abort();
            }
            for handle in handles {
                // Cancelled is the expected outcome.
                let _ = handle.await;
            }
        }

        let remaining = self.shared.registry.lock().destroy_targets();
        let destroyed = remaining.len();
        for target in &remaining {
            self.shared.destroy(target, reason::SHUTDOWN);
        }

        let final_stats = {
            let mut registry = self.shared.registry.lock();
            let stats = registry.stats(false);
            registry.reset();
            stats
        };

        if was_running {
            info!(destroyed, "Lifecycle manager stopped");
            self.shared.events.emit(LifecycleEvent::Stopped {
                final_stats,
                timestamp: Utc::now(),
            });
        } else {
            debug!(destroyed, "Stop requested while not running");
        }
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().is_some()
    }

    /// Record a newly established connection.
    ///
    /// If the account then exceeds `max_connections_per_account`, its oldest
    /// connection is destroyed immediately.
    pub fn register_connection(&self, account_id: &str, connection_id: &str, data: ConnectionData) {
        self.shared.register(account_id, connection_id, data);
    }

    /// Record one request attempt. Unknown ids are logged and ignored.
    pub fn update_connection_usage(&self, connection_id: &str, update: UsageUpdate) {
        self.shared.update_usage(connection_id, update);
    }

    /// Remove a connection the owner has lost or closed.
    ///
    /// Returns false if the id was unknown.
    pub fn unregister_connection(&self, connection_id: &str, reason: &str) -> bool {
        self.shared.unregister(connection_id, reason)
    }

    /// Destroy a connection's transport (best effort) and unregister it.
    ///
    /// Returns false if the id was unknown, or if the owner re-registered the
    /// id while the transport was being destroyed. The newer registration is
    /// kept.
    pub fn force_destroy(&self, connection_id: &str, reason: &str) -> bool {
        self.shared.force_destroy(connection_id, reason)
    }

    /// Run one fallback health sweep now.
    pub fn run_health_check(&self) -> HealthCheckSummary {
        health::run_health_check(&self.shared)
    }

    /// Run one rotation sweep now. Returns the number of rotation requests.
    pub fn run_rotation(&self) -> usize {
        rotation::run_rotation(&self.shared)
    }

    /// Run one memory reclaim sweep now.
    pub fn run_memory_cleanup(&self) -> MemoryCleanup {
        reclaim::run_memory_cleanup(&self.shared)
    }

    /// Run one performance analysis now, emitting its events.
    pub fn run_performance_analysis(&self) -> PerformanceReport {
        analysis::run_performance_analysis(&self.shared)
    }

    pub fn lifecycle_stats(&self) -> LifecycleStats {
        let is_running = self.is_running();
        self.shared.registry.lock().stats(is_running)
    }

    pub fn connection_details(&self, connection_id: &str) -> Option<ConnectionInfo> {
        let now = Instant::now();
        self.shared
            .registry
            .lock()
            .get(connection_id)
            .map(|r| r.info(now))
    }

    pub fn account_connections(&self, account_id: &str) -> Vec<ConnectionInfo> {
        let now = Instant::now();
        let registry = self.shared.registry.lock();
        let mut infos: Vec<ConnectionInfo> = registry
            .account_records(account_id)
            .into_iter()
            .map(|r| r.info(now))
            .collect();
        infos.sort_by(|a, b| b.age_ms.cmp(&a.age_ms));
        infos
    }

    /// Configuration, counters, and a fresh performance report.
    ///
    /// Builds the report without emitting analysis events.
    pub fn status_report(&self) -> StatusReport {
        let is_running = self.is_running();
        let (stats, performance_report) = {
            let registry = self.shared.registry.lock();
            (
                registry.stats(is_running),
                analysis::analyze(registry.records(), &self.shared.config, Instant::now()),
            )
        };
        StatusReport {
            config: self.shared.config.clone(),
            stats,
            performance_report,
            timestamp: Utc::now(),
        }
    }

    /// Cross-index invariant violations, empty when consistent.
    #[cfg(any(test, feature = "testkit"))]
    pub fn invariant_violations(&self) -> Vec<String> {
        self.shared.registry.lock().invariant_violations()
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        if let Some(handles) = self.tasks.get_mut().take() {
            for handle in handles {
                handle.abort();
            }
        }
    }
}
