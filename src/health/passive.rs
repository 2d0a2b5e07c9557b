//! Passive health checking (failure detection).
//!
//! # Design Decisions
//! - Only connection errors and 502/503/504 count as failures
//! - 4xx are NOT failures (client error, not backend); a 404 that triggers
//!   a fallback says nothing about the backend's health

use axum::http::StatusCode;

use crate::config::HealthCheckConfig;
use crate::load_balancer::backend::Backend;

/// Record the status of a proxied response against its backend.
pub fn observe_response(backend: &Backend, status: StatusCode, config: &HealthCheckConfig) {
    match status {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            observe_error(backend, config)
        }
        _ => {
            if backend.mark_success(config.healthy_threshold as usize) {
                tracing::info!(backend = %backend.name, addr = %backend.addr, "Backend marked healthy");
            }
        }
    }
}

/// Record a connection-level failure against a backend.
pub fn observe_error(backend: &Backend, config: &HealthCheckConfig) {
    if backend.mark_failure(config.unhealthy_threshold as usize) {
        tracing::warn!(backend = %backend.name, addr = %backend.addr, "Backend marked unhealthy");
    }
}
