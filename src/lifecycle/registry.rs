//! Dual-index connection registry.
//!
//! Holds the authoritative `connection_id -> record` map, the secondary
//! `account_id -> {connection_id}` index, and the aggregate counters. All
//! three are mutated together under the manager's single lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use super::agent::TransportAgent;
use super::record::ConnectionRecord;

/// Process-wide lifecycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    pub(crate) total_created: u64,
    pub(crate) total_destroyed: u64,
    pub(crate) total_rotated: u64,
    pub(crate) total_timeouts: u64,
    pub(crate) total_errors: u64,
    pub(crate) active_connections: usize,
    pub(crate) memory_cleanups: u64,
}

/// Snapshot of the lifecycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleStats {
    pub total_created: u64,
    pub total_destroyed: u64,
    pub total_rotated: u64,
    pub total_timeouts: u64,
    pub total_errors: u64,
    pub active_connections: usize,
    pub accounts_with_connections: usize,
    pub memory_cleanups: u64,
    pub is_running: bool,
}

/// One registration captured for destruction outside the lock.
///
/// `seq` pins the exact registration: if the id is re-registered before the
/// caller gets back to the registry, the fresh record is left alone.
#[derive(Debug, Clone)]
pub(crate) struct DestroyTarget {
    pub(crate) connection_id: String,
    pub(crate) seq: u64,
    pub(crate) agent: Arc<dyn TransportAgent>,
}

impl DestroyTarget {
    fn of(record: &ConnectionRecord) -> Self {
        Self {
            connection_id: record.connection_id.clone(),
            seq: record.seq,
            agent: Arc::clone(&record.agent),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    connections: HashMap<String, ConnectionRecord>,
    accounts: HashMap<String, HashSet<String>>,
    counters: Counters,
    next_seq: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Insert a record into both indices.
    ///
    /// The caller must have removed any record with the same id first.
    pub(crate) fn insert(&mut self, record: ConnectionRecord) {
        self.accounts
            .entry(record.account_id.clone())
            .or_default()
            .insert(record.connection_id.clone());
        self.connections
            .insert(record.connection_id.clone(), record);
        self.counters.total_created += 1;
        self.reconcile_active();
    }

    /// Remove a record from both indices, dropping its account bucket if it
    /// becomes empty.
    pub(crate) fn remove(&mut self, connection_id: &str) -> Option<ConnectionRecord> {
        let record = self.connections.remove(connection_id)?;
        if let Some(ids) = self.accounts.get_mut(&record.account_id) {
            ids.remove(connection_id);
            if ids.is_empty() {
                self.accounts.remove(&record.account_id);
            }
        }
        self.counters.total_destroyed += 1;
        self.reconcile_active();
        Some(record)
    }

    /// Remove a record only if it is still the registration identified by
    /// `seq`.
    pub(crate) fn remove_if_seq(
        &mut self,
        connection_id: &str,
        seq: u64,
    ) -> Option<ConnectionRecord> {
        if self.connections.get(connection_id)?.seq != seq {
            return None;
        }
        self.remove(connection_id)
    }

    pub(crate) fn get(&self, connection_id: &str) -> Option<&ConnectionRecord> {
        self.connections.get(connection_id)
    }

    pub(crate) fn get_mut(&mut self, connection_id: &str) -> Option<&mut ConnectionRecord> {
        self.connections.get_mut(connection_id)
    }

    pub(crate) fn get_if_seq_mut(
        &mut self,
        connection_id: &str,
        seq: u64,
    ) -> Option<&mut ConnectionRecord> {
        self.connections
            .get_mut(connection_id)
            .filter(|r| r.seq == seq)
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.connections.values()
    }

    pub(crate) fn destroy_target(&self, connection_id: &str) -> Option<DestroyTarget> {
        self.connections.get(connection_id).map(DestroyTarget::of)
    }

    pub(crate) fn destroy_targets(&self) -> Vec<DestroyTarget> {
        self.connections.values().map(DestroyTarget::of).collect()
    }

    pub(crate) fn account_records(&self, account_id: &str) -> Vec<&ConnectionRecord> {
        self.accounts
            .get(account_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.connections.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn account_len(&self, account_id: &str) -> usize {
        self.accounts.get(account_id).map_or(0, HashSet::len)
    }

    /// Oldest connection of an account by creation time, then registration order.
    pub(crate) fn oldest_in_account(&self, account_id: &str) -> Option<DestroyTarget> {
        self.account_records(account_id)
            .into_iter()
            .min_by_key(|r| (r.created_at, r.seq))
            .map(DestroyTarget::of)
    }

    /// Drop account buckets that no longer reference any connection.
    pub(crate) fn prune_empty_accounts(&mut self) -> usize {
        let before = self.accounts.len();
        let connections = &self.connections;
        self.accounts.retain(|_, ids| {
            ids.retain(|id| connections.contains_key(id));
            !ids.is_empty()
        });
        before - self.accounts.len()
    }

    /// Release spare capacity after a reclaim pass.
    pub(crate) fn shrink_to_fit(&mut self) {
        self.connections.shrink_to_fit();
        self.accounts.shrink_to_fit();
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }

    pub(crate) fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub(crate) fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    pub(crate) fn stats(&self, is_running: bool) -> LifecycleStats {
        let c = self.counters;
        LifecycleStats {
            total_created: c.total_created,
            total_destroyed: c.total_destroyed,
            total_rotated: c.total_rotated,
            total_timeouts: c.total_timeouts,
            total_errors: c.total_errors,
            active_connections: c.active_connections,
            accounts_with_connections: self.account_count(),
            memory_cleanups: c.memory_cleanups,
            is_running,
        }
    }

    /// Empty both indices and zero the counters.
    pub(crate) fn reset(&mut self) {
        self.connections.clear();
        self.accounts.clear();
        self.counters = Counters::default();
    }

    fn reconcile_active(&mut self) {
        self.counters.active_connections = self.len();
    }

    /// Check the cross-index invariants. Test helper.
    #[cfg(any(test, feature = "testkit"))]
    pub(crate) fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for (account, ids) in &self.accounts {
            if ids.is_empty() {
                violations.push(format!("empty bucket for account {account}"));
            }
            for id in ids {
                match self.connections.get(id) {
                    None => violations.push(format!("dangling id {id} in account {account}")),
                    Some(r) if &r.account_id != account => {
                        violations.push(format!("id {id} indexed under wrong account {account}"));
                    }
                    Some(_) => {}
                }
            }
        }
        for (id, record) in &self.connections {
            let indexed = self
                .accounts
                .get(&record.account_id)
                .is_some_and(|ids| ids.contains(id));
            if !indexed {
                violations.push(format!("record {id} missing from account index"));
            }
        }
        if self.counters.active_connections != self.connections.len() {
            violations.push(format!(
                "active_connections {} != registry size {}",
                self.counters.active_connections,
                self.connections.len()
            ));
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::lifecycle::record::ConnectionData;
    use crate::testkit::agent::MockAgent;

    fn insert(registry: &mut Registry, account: &str, id: &str) {
        let seq = registry.next_seq();
        let data = ConnectionData::new(MockAgent::new());
        registry.insert(ConnectionRecord::new(account, id, seq, data, Instant::now()));
    }

    #[test]
    fn insert_and_remove_keep_indices_in_sync() {
        let mut registry = Registry::new();
        insert(&mut registry, "a", "c1");
        insert(&mut registry, "a", "c2");
        insert(&mut registry, "b", "c3");
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.account_len("a"), 2);
        assert!(registry.invariant_violations().is_empty());

        assert!(registry.remove("c3").is_some());
        assert_eq!(registry.account_count(), 1);
        assert!(registry.remove("c3").is_none());
        assert!(registry.invariant_violations().is_empty());

        let stats = registry.stats(false);
        assert_eq!(stats.total_created, 3);
        assert_eq!(stats.total_destroyed, 1);
        assert_eq!(stats.active_connections, 2);
    }

    #[test]
    fn oldest_breaks_ties_by_registration_order() {
        let mut registry = Registry::new();
        let now = Instant::now();
        for id in ["x", "y", "z"] {
            let seq = registry.next_seq();
            let data = ConnectionData::new(MockAgent::new());
            registry.insert(ConnectionRecord::new("a", id, seq, data, now));
        }
        let oldest = registry.oldest_in_account("a").unwrap();
        assert_eq!(oldest.connection_id, "x");
        assert_eq!(oldest.seq, 0);
        assert!(registry.oldest_in_account("missing").is_none());
    }

    #[test]
    fn seq_guard_ignores_a_reregistered_id() {
        let mut registry = Registry::new();
        insert(&mut registry, "a", "c1");
        let stale = registry.destroy_target("c1").unwrap();

        registry.remove("c1");
        insert(&mut registry, "b", "c1");

        assert!(registry.get_if_seq_mut("c1", stale.seq).is_none());
        assert!(registry.remove_if_seq("c1", stale.seq).is_none());
        assert_eq!(registry.get("c1").map(|r| r.account_id.as_str()), Some("b"));

        let fresh = registry.destroy_target("c1").unwrap();
        assert!(registry.remove_if_seq("c1", fresh.seq).is_some());
        assert!(registry.invariant_violations().is_empty());
    }

    #[test]
    fn prune_drops_empty_and_dangling_buckets() {
        let mut registry = Registry::new();
        insert(&mut registry, "a", "c1");
        registry.accounts.insert("ghost".into(), HashSet::new());
        registry
            .accounts
            .insert("stale".into(), HashSet::from(["gone".to_string()]));

        assert_eq!(registry.prune_empty_accounts(), 2);
        assert_eq!(registry.account_count(), 1);
        assert!(registry.invariant_violations().is_empty());
    }
}
