//! Memory reclaimer.
//!
//! Removes records left in `error` or `destroyed` state and account buckets
//! that no longer reference any connection.

use serde::Serialize;
use tracing::{debug, info};

use super::reason;
use super::state::Shared;

/// Result of one reclaim sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryCleanup {
    pub reclaimed_connections: usize,
    pub pruned_accounts: usize,
}

pub(crate) fn run_memory_cleanup(shared: &Shared) -> MemoryCleanup {
    let stale: Vec<(String, u64)> = shared
        .registry
        .lock()
        .records()
        .filter(|r| r.status.is_reclaimable())
        .map(|r| (r.connection_id.clone(), r.seq))
        .collect();

    let reclaimed_connections = stale
        .iter()
        .filter(|(id, seq)| shared.unregister_registration(id, *seq, reason::MEMORY_CLEANUP))
        .count();

    let pruned_accounts = {
        let mut registry = shared.registry.lock();
        let pruned = registry.prune_empty_accounts();
        registry.counters_mut().memory_cleanups += 1;
        if reclaimed_connections > 0 {
            registry.shrink_to_fit();
        }
        pruned
    };

    let cleanup = MemoryCleanup {
        reclaimed_connections,
        pruned_accounts,
    };
    if reclaimed_connections > 0 || pruned_accounts > 0 {
        info!(
            reclaimed = reclaimed_connections,
            pruned_accounts, "Memory cleanup completed"
        );
    } else {
        debug!("Memory cleanup found nothing to reclaim");
    }
    cleanup
}
