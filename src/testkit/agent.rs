//! Mock transport agents.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Barrier};

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::lifecycle::{ConnectionData, SocketState, TransportAgent};

/// A [`TransportAgent`] that counts calls and returns scripted results.
///
/// By default `destroy` succeeds and `socket_state` reports nothing.
#[derive(Debug, Default)]
pub struct MockAgent {
    destroyed: AtomicU32,
    inspected: AtomicU32,
    fail_destroy: AtomicBool,
    socket_state: Mutex<Option<Result<SocketState, TransportError>>>,
}

impl MockAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Agent whose `destroy` always fails.
    pub fn failing_destroy() -> Arc<Self> {
        let agent = Self::default();
        agent.fail_destroy.store(true, Ordering::SeqCst);
        Arc::new(agent)
    }

    pub fn with_socket_state(state: SocketState) -> Arc<Self> {
        let agent = Self::new();
        agent.set_socket_state(Some(Ok(state)));
        agent
    }

    pub fn set_socket_state(&self, state: Option<Result<SocketState, TransportError>>) {
        *self.socket_state.lock() = state;
    }

    pub fn destroy_count(&self) -> u32 {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn inspect_count(&self) -> u32 {
        self.inspected.load(Ordering::SeqCst)
    }

    /// Registration payload wrapping this agent.
    pub fn data(self: &Arc<Self>) -> ConnectionData {
        ConnectionData::new(Arc::clone(self) as Arc<dyn TransportAgent>)
    }
}

impl TransportAgent for MockAgent {
    fn destroy(&self) -> Result<(), TransportError> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(TransportError::Destroy("scripted failure".to_string()));
        }
        Ok(())
    }

    fn socket_state(&self) -> Option<Result<SocketState, TransportError>> {
        self.inspected.fetch_add(1, Ordering::SeqCst);
        self.socket_state.lock().clone()
    }
}

/// A [`TransportAgent`] that parks inside `destroy` and `socket_state`
/// until the test releases it.
///
/// Each call meets the test twice: once on [`wait_entered`](Self::wait_entered)
/// and once on [`release`](Self::release). Everything the test does in
/// between races with a manager call that has already let go of the
/// registry lock.
#[derive(Debug)]
pub struct GatedAgent {
    entered: Barrier,
    released: Barrier,
    destroyed: AtomicU32,
    socket_state: Result<SocketState, TransportError>,
}

impl GatedAgent {
    /// Gated agent whose `socket_state` reports `state` once released.
    pub fn new(socket_state: Result<SocketState, TransportError>) -> Arc<Self> {
        Arc::new(Self {
            entered: Barrier::new(2),
            released: Barrier::new(2),
            destroyed: AtomicU32::new(0),
            socket_state,
        })
    }

    /// Block until a manager call is parked inside the agent.
    pub fn wait_entered(&self) {
        self.entered.wait();
    }

    /// Let the parked call return.
    pub fn release(&self) {
        self.released.wait();
    }

    pub fn destroy_count(&self) -> u32 {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Registration payload wrapping this agent.
    pub fn data(self: &Arc<Self>) -> ConnectionData {
        ConnectionData::new(Arc::clone(self) as Arc<dyn TransportAgent>)
    }

    fn gate(&self) {
        self.entered.wait();
        self.released.wait();
    }
}

impl TransportAgent for GatedAgent {
    fn destroy(&self) -> Result<(), TransportError> {
        self.gate();
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn socket_state(&self) -> Option<Result<SocketState, TransportError>> {
        self.gate();
        Some(self.socket_state.clone())
    }
}
