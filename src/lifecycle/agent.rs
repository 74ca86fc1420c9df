//! Capability handle for transport agents owned by the connection pool.
//!
//! The lifecycle manager never owns transport resources. It keeps a shared
//! handle that exposes exactly two capabilities: destroying the transport
//! (capacity eviction and shutdown only) and reporting socket state for the
//! fallback health check.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::TransportError;

/// Readiness of a single socket held by a transport agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketReadiness {
    Opening,
    Open,
    ReadOnly,
    WriteOnly,
    Closed,
}

impl SocketReadiness {
    /// Whether the socket can still carry a request.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Open | Self::Opening)
    }
}

/// Point-in-time view of an agent's socket pools.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocketState {
    /// Sockets currently assigned to requests.
    pub sockets: Vec<SocketReadiness>,
    /// Idle sockets parked in the free pool.
    pub free_sockets: usize,
}

impl SocketState {
    #[must_use]
    pub fn live_sockets(&self) -> usize {
        self.sockets.iter().filter(|s| s.is_live()).count()
    }

    /// True when the agent has neither a live socket nor an idle one.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.live_sockets() == 0 && self.free_sockets == 0
    }
}

/// Transport agent as seen by the lifecycle manager.
///
/// Implementations are provided by the connection owner. Both methods are
/// synchronous and must not perform network I/O.
pub trait TransportAgent: Send + Sync + fmt::Debug {
    /// Tear down the underlying transport.
    fn destroy(&self) -> Result<(), TransportError>;

    /// Report socket pool state, or `None` if the agent does not expose it.
    fn socket_state(&self) -> Option<Result<SocketState, TransportError>> {
        None
    }
}

/// Destroy an agent, converting a panic into a [`TransportError`].
pub(crate) fn destroy_guarded(agent: &dyn TransportAgent) -> Result<(), TransportError> {
    catch_unwind(AssertUnwindSafe(|| agent.destroy()))
        .unwrap_or_else(|_| Err(TransportError::Destroy("agent panicked".to_string())))
}

/// Inspect an agent's sockets, converting a panic into a [`TransportError`].
pub(crate) fn socket_state_guarded(
    agent: &dyn TransportAgent,
) -> Option<Result<SocketState, TransportError>> {
    catch_unwind(AssertUnwindSafe(|| agent.socket_state())).unwrap_or_else(|_| {
        Some(Err(TransportError::Introspection(
            "agent panicked".to_string(),
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_requires_no_live_and_no_free_sockets() {
        let state = SocketState {
            sockets: vec![SocketReadiness::Closed, SocketReadiness::ReadOnly],
            free_sockets: 0,
        };
        assert!(state.is_exhausted());

        let state = SocketState {
            sockets: vec![SocketReadiness::Closed, SocketReadiness::Opening],
            free_sockets: 0,
        };
        assert_eq!(state.live_sockets(), 1);
        assert!(!state.is_exhausted());

        let state = SocketState {
            sockets: vec![],
            free_sockets: 2,
        };
        assert!(!state.is_exhausted());
    }

    #[derive(Debug)]
    struct PanickingAgent;

    impl TransportAgent for PanickingAgent {
        fn destroy(&self) -> Result<(), TransportError> {
            panic!("destroy exploded")
        }

        fn socket_state(&self) -> Option<Result<SocketState, TransportError>> {
            panic!("inspection exploded")
        }
    }

    #[test]
    fn guarded_calls_contain_panics() {
        assert!(matches!(
            destroy_guarded(&PanickingAgent),
            Err(TransportError::Destroy(_))
        ));
        assert!(matches!(
            socket_state_guarded(&PanickingAgent),
            Some(Err(TransportError::Introspection(_)))
        ));
    }
}
