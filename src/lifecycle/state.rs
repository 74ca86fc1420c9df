//! Shared state and registry operations.
//!
//! [`Shared`] bundles everything the public facade and the periodic tasks
//! need. Registry and counters sit behind one mutex; transport agents are
//! only ever called with that lock released.

use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::agent::destroy_guarded;
use super::event::{
    ConnectionRegistered, ConnectionUnregistered, EventBus, LifecycleEvent, RecreationRequest,
    RecreationTrigger, RECREATION_REASON,
};
use super::reason;
use super::record::{duration_ms, ConnectionData, ConnectionRecord, UsageUpdate};
use super::registry::{DestroyTarget, Registry};
use crate::config::LifecycleConfig;

pub(crate) struct Shared {
    pub(crate) config: LifecycleConfig,
    pub(crate) registry: Mutex<Registry>,
    pub(crate) events: EventBus,
}

impl Shared {
    pub(crate) fn new(config: LifecycleConfig) -> Self {
        let events = EventBus::new(config.event_channel_capacity);
        Self {
            config,
            registry: Mutex::new(Registry::new()),
            events,
        }
    }

    /// Record a freshly established connection, then enforce the account's
    /// connection limit.
    pub(crate) fn register(&self, account_id: &str, connection_id: &str, data: ConnectionData) {
        let now = Instant::now();
        let (replaced, proxy_info) = {
            let mut registry = self.registry.lock();
            let replaced = registry.remove(connection_id);
            let seq = registry.next_seq();
            let record = ConnectionRecord::new(account_id, connection_id, seq, data, now);
            let proxy_info = record.proxy_info.clone();
            registry.insert(record);
            (replaced, proxy_info)
        };

        if let Some(old) = replaced {
            warn!(
                connection_id,
                previous_account_id = %old.account_id,
                "Connection id re-registered, replacing previous record"
            );
            self.announce_unregistered(&old, reason::REPLACED);
        }

        info!(
            account_id,
            connection_id,
            proxy = %proxy_info,
            "Connection registered"
        );
        self.events
            .emit(LifecycleEvent::Registered(ConnectionRegistered {
                account_id: account_id.to_string(),
                connection_id: connection_id.to_string(),
                proxy_info,
                timestamp: Utc::now(),
            }));

        self.enforce_capacity(account_id);
    }

    pub(crate) fn update_usage(&self, connection_id: &str, update: UsageUpdate) {
        let mut registry = self.registry.lock();
        let counted_error = match registry.get_mut(connection_id) {
            Some(record) => record.record_usage(&update, Instant::now()),
            None => {
                warn!(connection_id, "Usage update for unknown connection");
                return;
            }
        };

        let counters = registry.counters_mut();
        if counted_error {
            counters.total_errors += 1;
        }
        if update.timeout {
            counters.total_timeouts += 1;
        }
    }

    /// Remove a connection from the registry. Returns false if it was unknown.
    pub(crate) fn unregister(&self, connection_id: &str, reason: &str) -> bool {
        let Some(record) = self.registry.lock().remove(connection_id) else {
            warn!(connection_id, reason, "Unregister for unknown connection");
            return false;
        };
        self.announce_unregistered(&record, reason);
        true
    }

    /// Remove one specific registration of `connection_id`.
    ///
    /// Returns false if the id is gone or now belongs to a newer
    /// registration, which is left untouched.
    pub(crate) fn unregister_registration(
        &self,
        connection_id: &str,
        seq: u64,
        reason: &str,
    ) -> bool {
        let Some(record) = self.registry.lock().remove_if_seq(connection_id, seq) else {
            debug!(connection_id, seq, reason, "Registration already replaced or removed");
            return false;
        };
        self.announce_unregistered(&record, reason);
        true
    }

    fn announce_unregistered(&self, record: &ConnectionRecord, reason: &str) {
        let event = unregistered_event(record, reason, Instant::now());
        info!(
            account_id = %event.account_id,
            connection_id = %event.connection_id,
            reason,
            lifetime_ms = event.lifetime_ms,
            usage = event.usage_count,
            errors = event.error_count,
            "Connection unregistered"
        );
        self.events.emit(LifecycleEvent::Unregistered(event));
    }

    /// Destroy the connection's transport (best effort) and unregister it.
    pub(crate) fn force_destroy(&self, connection_id: &str, reason: &str) -> bool {
        let target = self.registry.lock().destroy_target(connection_id);
        let Some(target) = target else {
            warn!(connection_id, reason, "Force destroy for unknown connection");
            return false;
        };
        self.destroy(&target, reason)
    }

    /// Destroy a captured registration and unregister it if it is still
    /// current.
    pub(crate) fn destroy(&self, target: &DestroyTarget, reason: &str) -> bool {
        if let Err(e) = destroy_guarded(target.agent.as_ref()) {
            error!(
                connection_id = %target.connection_id,
                reason,
                error = %e,
                "Failed to destroy transport agent"
            );
        }
        self.unregister_registration(&target.connection_id, target.seq, reason)
    }

    /// Evict the oldest connections of an account until it is within limit.
    pub(crate) fn enforce_capacity(&self, account_id: &str) {
        let limit = self.config.max_connections_per_account;
        loop {
            let oldest = {
                let registry = self.registry.lock();
                let count = registry.account_len(account_id);
                if count <= limit {
                    return;
                }
                warn!(account_id, count, limit, "Account over connection limit");
                registry.oldest_in_account(account_id)
            };
            let Some(target) = oldest else {
                return;
            };
            // A lost race re-reads the account on the next pass.
            self.destroy(&target, reason::CONNECTION_LIMIT_EXCEEDED);
        }
    }

    /// Ask the owner to recreate a connection.
    pub(crate) fn request_recreation(
        &self,
        account_id: &str,
        connection_id: &str,
        trigger: RecreationTrigger,
        cause: &str,
    ) {
        debug!(account_id, connection_id, ?trigger, cause, "Requesting recreation");
        self.events
            .emit(LifecycleEvent::RecreationRequested(RecreationRequest {
                account_id: account_id.to_string(),
                connection_id: connection_id.to_string(),
                reason: RECREATION_REASON.to_string(),
                trigger,
                cause: cause.to_string(),
                timestamp: Utc::now(),
            }));
    }
}

fn unregistered_event(
    record: &ConnectionRecord,
    reason: &str,
    now: Instant,
) -> ConnectionUnregistered {
    ConnectionUnregistered {
        account_id: record.account_id.clone(),
        connection_id: record.connection_id.clone(),
        reason: reason.to_string(),
        lifetime_ms: duration_ms(record.age(now)),
        usage_count: record.usage_count,
        error_count: record.error_count,
        timestamp: Utc::now(),
    }
}
