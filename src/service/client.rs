//! Per-request client connection state.
//!
//! A `ClientConnection` is created by the pipeline when a request is routed
//! and dropped when the response is handed back. It is owned by the request
//! task, so nothing here is shared or locked.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::fallback::HandoffState;
use crate::load_balancer::backend::Backend;
use crate::net::connection::{ConnectionGuard, ConnectionId, ConnectionState};
use crate::service::Service;

#[derive(Debug)]
pub struct ClientConnection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    state: ConnectionState,
    /// Service currently owning the request.
    service: Arc<Service>,
    backend: Option<Arc<Backend>>,
    backend_requested: bool,
    /// Service that reclaims ownership once a fallback completes.
    selector_service: Option<Arc<Service>>,
    handoff: HandoffState,
    _guard: Option<ConnectionGuard>,
}

impl ClientConnection {
    pub fn new(peer: Option<SocketAddr>, service: Arc<Service>) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            state: ConnectionState::Active,
            service,
            backend: None,
            backend_requested: false,
            selector_service: None,
            handoff: HandoffState::DispatchedPrimary,
            _guard: None,
        }
    }

    /// A client counted by a `ConnectionTracker` until dropped.
    pub fn tracked(guard: ConnectionGuard, peer: Option<SocketAddr>, service: Arc<Service>) -> Self {
        Self {
            id: guard.id(),
            _guard: Some(guard),
            ..Self::new(peer, service)
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    /// Mark the connection closed; no further hand-off is attempted.
    ///
    /// The axum host never calls this: when a peer disconnects, hyper drops
    /// the handler future, so the request stops at its current await point
    /// and the hooks are not reached. Hosts that learn about a disconnect
    /// while the request keeps running call this before the next hook.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    pub(crate) fn set_service(&mut self, service: Arc<Service>) {
        self.service = service;
    }

    pub fn backend(&self) -> Option<&Arc<Backend>> {
        self.backend.as_ref()
    }

    pub fn is_backend_requested(&self) -> bool {
        self.backend_requested
    }

    /// Record that the request is being sent to `backend`.
    pub fn request_backend(&mut self, backend: Arc<Backend>) {
        self.backend = Some(backend);
        self.backend_requested = true;
    }

    /// Forget the current backend.
    pub fn detach_backend(&mut self) {
        self.backend = None;
        self.backend_requested = false;
    }

    pub fn selector_service(&self) -> Option<&Arc<Service>> {
        self.selector_service.as_ref()
    }

    pub(crate) fn set_selector_service(&mut self, service: Arc<Service>) {
        self.selector_service = Some(service);
    }

    pub(crate) fn take_selector_service(&mut self) -> Option<Arc<Service>> {
        self.selector_service.take()
    }

    pub fn handoff_state(&self) -> HandoffState {
        self.handoff
    }

    pub(crate) fn set_handoff_state(&mut self, state: HandoffState) {
        tracing::trace!(
            connection_id = %self.id,
            from = ?self.handoff,
            to = ?state,
            "Hand-off state transition"
        );
        self.handoff = state;
    }
}
