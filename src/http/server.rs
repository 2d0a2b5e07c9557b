//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (timeout, concurrency limit, request ID, tracing)
//! - Build the service registry and install the fallback hooks
//! - Spawn the health monitor and the admin API
//! - Graceful shutdown with a bounded drain

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::config::{ConfigError, ProxyConfig};
use crate::fallback::{FallbackHooks, HandoffOrchestrator, PipelineHooks};
use crate::health::active::HealthMonitor;
use crate::http::pipeline::Pipeline;
use crate::http::request;
use crate::lifecycle::shutdown;
use crate::net::connection::ConnectionTracker;
use crate::observability::metrics;
use crate::routing::Router as ProxyRouter;
use crate::service::{ClientConnection, ServiceRegistry};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProxyRouter>,
    pub registry: Arc<ServiceRegistry>,
    pub pipeline: Arc<Pipeline>,
    pub connections: ConnectionTracker,
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    registry: Arc<ServiceRegistry>,
    connections: ConnectionTracker,
}

impl HttpServer {
    /// Validate `config` and build the server with the fallback hooks installed.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let registry = Arc::new(ServiceRegistry::from_config(&config)?);
        let hooks = Arc::new(FallbackHooks::new(HandoffOrchestrator::new(Arc::clone(&registry))));
        Ok(Self::with_hooks(config, registry, hooks))
    }

    /// Build the server around an existing registry and custom hooks.
    pub fn with_hooks(config: ProxyConfig, registry: Arc<ServiceRegistry>, hooks: Arc<dyn PipelineHooks>) -> Self {
        let pipeline = Pipeline::new(
            hooks,
            config.health_check.clone(),
            Duration::from_secs(config.timeouts.connect_secs),
        );
        let connections = ConnectionTracker::new();

        let state = AppState {
            router: Arc::new(ProxyRouter::from_config(config.routes.clone())),
            registry: Arc::clone(&registry),
            pipeline: Arc::new(pipeline),
            connections: connections.clone(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            registry,
            connections,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(TraceLayer::new_for_http())
            .layer(request::propagate_request_id_layer())
            .layer(request::set_request_id_layer())
    }

    pub fn registry(&self) -> Arc<ServiceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests
    /// for at most `timeouts.drain_secs`.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, services = self.registry.all().len(), "HTTP server starting");

        let monitor = HealthMonitor::new(Arc::clone(&self.registry), self.config.health_check.clone());
        tokio::spawn(monitor.run(shutdown.resubscribe()));

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let admin_router = admin::router(Arc::clone(&self.registry), self.config.admin.api_key.clone());
            let admin_shutdown = shutdown.resubscribe();
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API starting");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(admin_listener, admin_router)
                    .with_graceful_shutdown(shutdown::wait(admin_shutdown))
                    .await
                {
                    tracing::error!(error = %e, "Admin API failed");
                }
            });
        }

        let drain_signal = shutdown.resubscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .into_future();
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => return result,
            _ = shutdown::wait(drain_signal) => {}
        }

        let drain = Duration::from_secs(self.config.timeouts.drain_secs);
        tracing::info!(active = self.connections.active_count(), "Draining in-flight requests");
        if !self.connections.drain(drain).await {
            tracing::warn!(
                remaining = self.connections.active_count(),
                "Drain deadline reached, dropping remaining requests"
            );
            return Ok(());
        }

        server.await?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Matches a route, runs the pipeline, then counts the request against the
/// service that owns it.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let request_id = request::request_id(request.headers()).to_string();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let Some(route) = state.router.match_request(request.uri(), request.headers()) else {
        tracing::warn!(request_id = %request_id, path = %path, "No route matched");
        metrics::record_request(&method, 404, "none", start_time);
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };

    let Some(service) = state.registry.lookup(&route.service) else {
        tracing::warn!(request_id = %request_id, service = %route.service, "Service unavailable");
        metrics::record_request(&method, 503, &route.service, start_time);
        return (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable").into_response();
    };

    let mut client = ClientConnection::tracked(state.connections.track(), Some(addr), service);
    tracing::debug!(
        request_id = %request_id,
        connection_id = %client.id(),
        route = %route.name,
        service = %client.service().name(),
        method = %method,
        path = %path,
        "Proxying request"
    );

    let response = state.pipeline.serve(&mut client, request).await;

    let owner = client.service();
    let status = response.status().as_u16();
    owner.stats().record_request();
    metrics::record_request(&method, status, owner.name(), start_time);
    tracing::info!(
        request_id = %request_id,
        connection_id = %client.id(),
        service = %owner.name(),
        status,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}
