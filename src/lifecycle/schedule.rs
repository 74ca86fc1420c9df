//! Periodic maintenance tasks.
//!
//! Each policy runs in its own tokio task on a fixed interval. The first run
//! happens one full period after start. All tasks share the registry through
//! [`Shared`], so a sweep never observes a half-applied mutation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use super::record::duration_ms;
use super::state::Shared;
use super::{analysis, health, reclaim, rotation};

/// Spawn all four maintenance loops.
pub(crate) fn spawn_all(shared: &Arc<Shared>) -> Vec<JoinHandle<()>> {
    let config = &shared.config;
    vec![
        spawn_periodic(
            Arc::clone(shared),
            "health_check",
            config.health_check_interval(),
            |s| {
                health::run_health_check(s);
            },
        ),
        spawn_periodic(
            Arc::clone(shared),
            "rotation",
            config.connection_rotation_interval(),
            |s| {
                rotation::run_rotation(s);
            },
        ),
        spawn_periodic(
            Arc::clone(shared),
            "memory_cleanup",
            config.memory_cleanup_interval(),
            |s| {
                reclaim::run_memory_cleanup(s);
            },
        ),
        spawn_periodic(
            Arc::clone(shared),
            "performance_analysis",
            config.performance_analysis_interval(),
            |s| {
                analysis::run_performance_analysis(s);
            },
        ),
    ]
}

fn spawn_periodic<F>(
    shared: Arc<Shared>,
    name: &'static str,
    period: Duration,
    sweep: F,
) -> JoinHandle<()>
where
    F: Fn(&Shared) + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(task = name, period_ms = duration_ms(period), "Lifecycle task started");

        loop {
            interval.tick().await;
            sweep(&shared);
        }
    })
}
