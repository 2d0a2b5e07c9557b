//! Services and the registry that owns them.
//!
//! # Data Flow
//! ```text
//! ServiceConfig[] + BackendConfig[]
//!     → registry.rs (validate, build one Service per entry)
//!     → routing picks a service per request
//!     → client.rs tracks which service owns the in-flight request
//!     → exchange.rs wraps one backend request/response cycle
//! ```
//!
//! # Design Decisions
//! - The registry owns every configured service for the process lifetime;
//!   disabling a service hides it from lookups without dropping it
//! - Derived fallback state (parsed condition, resolved target) lives in
//!   typed fields on the service, built once at construction

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::config::{BackendConfig, ServiceConfig, ServiceRole};
use crate::fallback::{ConditionError, ConditionSpec, FallbackTarget};
use crate::load_balancer::pool::BackendPool;

pub mod client;
pub mod exchange;
pub mod registry;

pub use client::ClientConnection;
pub use exchange::{BackendExchange, RequestBody};
pub use registry::{RegistryError, ServiceRegistry};

/// Fixed answer of a static service.
#[derive(Debug, Clone)]
pub struct StaticResponse {
    pub status: StatusCode,
    pub body: String,
}

impl IntoResponse for StaticResponse {
    fn into_response(self) -> Response {
        (self.status, Body::from(self.body)).into_response()
    }
}

/// Per-service request accounting.
#[derive(Debug, Default)]
pub struct ServiceStats {
    requests: AtomicU64,
    handoffs: AtomicU64,
}

impl ServiceStats {
    /// Requests attributed to this service after completion.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Requests this service handed to its fallback.
    pub fn handoffs(&self) -> u64 {
        self.handoffs.load(Ordering::Relaxed)
    }

    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handoff(&self) {
        self.handoffs.fetch_add(1, Ordering::Relaxed);
    }
}

/// A named service requests are dispatched to.
#[derive(Debug)]
pub struct Service {
    name: String,
    role: ServiceRole,
    enabled: AtomicBool,
    pool: BackendPool,
    static_response: Option<StaticResponse>,
    condition: ConditionSpec,
    fallback: FallbackTarget,
    stats: ServiceStats,
}

impl Service {
    /// Build a service from its configuration and the backends assigned to it.
    ///
    /// Backends belonging to other services are ignored.
    pub fn from_config(
        config: &ServiceConfig,
        backends: &[BackendConfig],
    ) -> Result<Self, ConditionError> {
        let condition = config.fallback_if_rc.parse()?;
        let own_backends = backends.iter().filter(|b| b.service == config.name);

        let static_response = match config.role {
            ServiceRole::Static => Some(StaticResponse {
                status: StatusCode::from_u16(config.static_status)
                    .unwrap_or(StatusCode::SERVICE_UNAVAILABLE),
                body: config.static_body.clone(),
            }),
            ServiceRole::ReverseProxy => None,
        };

        Ok(Self {
            name: config.name.clone(),
            role: config.role,
            enabled: AtomicBool::new(config.enabled),
            pool: BackendPool::new(own_backends, config.lb_algorithm),
            static_response,
            condition,
            fallback: FallbackTarget::new(config.fallback_service.clone()),
            stats: ServiceStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ServiceRole {
        self.role
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    pub(crate) fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::AcqRel)
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    pub fn static_response(&self) -> Option<&StaticResponse> {
        self.static_response.as_ref()
    }

    /// Condition under which responses from this service fall back.
    pub fn condition(&self) -> &ConditionSpec {
        &self.condition
    }

    pub fn fallback(&self) -> &FallbackTarget {
        &self.fallback
    }

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// Take over a live client connection as if it had just been routed
    /// here. The host pipeline dispatches it to this service's backends on
    /// its next iteration.
    pub fn adopt(self: &Arc<Self>, client: &mut ClientConnection) {
        client.detach_backend();
        client.set_service(Arc::clone(self));
        tracing::trace!(
            connection_id = %client.id(),
            service = %self.name,
            "Client adopted"
        );
    }
}
