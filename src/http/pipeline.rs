//! Request pipeline.
//!
//! # Responsibilities
//! - Dispatch a routed client to its current service's backends
//! - Call the hooks once response headers arrive, and re-dispatch when a
//!   hook hands the client to another service
//! - Call the restoration hook once the response is ready
//! - Passive health observation of every backend response
//!
//! # Design Decisions
//! - The request body is streamed, never buffered; a re-dispatch sends an
//!   empty body (hand-offs only happen for requests without one)
//! - Dispatch is bounded: one primary attempt plus one fallback hop

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{request::Parts, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::HealthCheckConfig;
use crate::fallback::{PipelineHooks, ProcessingDecision};
use crate::health::passive;
use crate::service::{BackendExchange, ClientConnection};

const MAX_DISPATCHES: usize = 2;

pub struct Pipeline {
    hooks: Arc<dyn PipelineHooks>,
    client: Client<HttpConnector, Body>,
    health: HealthCheckConfig,
}

impl Pipeline {
    pub fn new(hooks: Arc<dyn PipelineHooks>, health: HealthCheckConfig, connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            hooks,
            client,
            health,
        }
    }

    /// Serve one routed request. On return, `client.service()` is the
    /// service the request is attributed to.
    pub async fn serve(&self, client: &mut ClientConnection, request: Request<Body>) -> Response {
        let response = self.dispatch(client, request).await;

        match self.hooks.on_return_to_originating_service(client) {
            ProcessingDecision::Stop => {}
            // Host default: the last dispatching service keeps the request.
            ProcessingDecision::Continue => client.detach_backend(),
        }
        response
    }

    async fn dispatch(&self, client: &mut ClientConnection, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();
        let mut body = Some(body);

        for _ in 0..MAX_DISPATCHES {
            let service = Arc::clone(client.service());
            if let Some(fixed) = service.static_response() {
                return fixed.clone().into_response();
            }

            let Some(guard) = service.pool().select() else {
                tracing::warn!(connection_id = %client.id(), service = %service.name(), "No healthy backends");
                return (StatusCode::SERVICE_UNAVAILABLE, "No healthy backends").into_response();
            };
            client.request_backend(Arc::clone(&guard.backend));

            let upstream = match upstream_request(&parts, guard.addr, body.take().unwrap_or_else(Body::empty)) {
                Ok(req) => req,
                Err(e) => {
                    tracing::error!(connection_id = %client.id(), error = %e, "Failed to build upstream request");
                    client.detach_backend();
                    return (StatusCode::BAD_GATEWAY, "Invalid upstream request").into_response();
                }
            };

            match self.client.request(upstream).await {
                Ok(response) => {
                    passive::observe_response(&guard, response.status(), &self.health);
                    let mut exchange =
                        BackendExchange::new(&parts.headers, response.map(Body::new)).with_guard(guard);

                    match self.hooks.on_backend_response_received(client, &mut exchange) {
                        ProcessingDecision::Continue => {
                            return exchange.into_response().unwrap_or_else(|| {
                                (StatusCode::BAD_GATEWAY, "Backend response released").into_response()
                            });
                        }
                        ProcessingDecision::Stop => continue,
                    }
                }
                Err(e) => {
                    tracing::error!(
                        connection_id = %client.id(),
                        service = %service.name(),
                        backend = %guard.name,
                        error = %e,
                        "Upstream error"
                    );
                    passive::observe_error(&guard, &self.health);
                    client.detach_backend();
                    return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
                }
            }
        }

        tracing::error!(connection_id = %client.id(), "Dispatch limit reached");
        client.detach_backend();
        (StatusCode::BAD_GATEWAY, "Too many dispatches").into_response()
    }
}

fn upstream_request(parts: &Parts, addr: SocketAddr, body: Body) -> Result<Request<Body>, axum::http::Error> {
    let path = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let uri = Uri::builder()
        .scheme("http")
        .authority(addr.to_string())
        .path_and_query(path)
        .build()?;

    let mut request = Request::new(body);
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = uri;
    *request.headers_mut() = parts.headers.clone();
    Ok(request)
}
