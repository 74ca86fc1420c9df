//! Poolkeeper - lifecycle and health management for pooled upstream
//! connections.
//!
//! A connection owner (typically a proxy-aware HTTP client pool) reports
//! when connections are established, used, and lost. The
//! [`LifecycleManager`] keeps a registry of them, enforces a per-account
//! connection limit, and runs four periodic policies over the registry:
//!
//! - a fallback **health check** that re-derives health from age, idle
//!   time, error rate, and transport socket state
//! - a **rotation** sweep that replaces connections on soft signals
//! - a **memory reclaimer** that drops records left in a terminal state
//! - a **performance analyzer** that aggregates metrics and flags issues
//!
//! The manager never rebuilds connections itself. It emits
//! [`LifecycleEvent::RecreationRequested`] and the owner acts on it.
//!
//! # Modules
//!
//! - [`config`] - Configuration loading from TOML files
//! - [`error`] - Error types for the crate
//! - [`lifecycle`] - Registry, maintenance policies, and events
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use poolkeeper::config::LifecycleConfig;
//! use poolkeeper::LifecycleManager;
//!
//! # async fn run() -> poolkeeper::error::Result<()> {
//! let manager = LifecycleManager::new(LifecycleConfig::default())?;
//! let mut events = manager.subscribe();
//! manager.start();
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.kind());
//! }
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use lifecycle::{LifecycleEvent, LifecycleManager};
