//! Handler for the `run` command.

use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::Result;
use crate::lifecycle::{LifecycleEvent, LifecycleManager};

/// Execute the run command.
///
/// Starts the manager with no registered connections and logs every event
/// it emits until Ctrl-C, then shuts it down.
pub async fn execute(args: &RunArgs) -> Result<()> {
    let mut config = super::load_config(args.config.as_ref())?;

    if let Some(ref level) = args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.format = "json".to_string();
    }
    config.init_logging();

    let manager = LifecycleManager::new(config.lifecycle)?;
    let mut events = manager.subscribe();
    manager.start();
    info!("poolkeeper starting");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    manager.stop().await;
    info!("poolkeeper stopped");
    Ok(())
}

fn log_event(event: &LifecycleEvent) {
    match serde_json::to_string(event) {
        Ok(payload) => info!(event = event.kind(), %payload, "Lifecycle event"),
        Err(e) => warn!(event = event.kind(), error = %e, "Failed to serialize event"),
    }
}
