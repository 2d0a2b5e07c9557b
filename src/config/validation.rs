//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes, backends and fallbacks reference
//!   existing services)
//! - Validate value ranges (timeouts > 0, addresses parse, status codes)
//! - Parse every `fallback_if_rc` so a bad condition is a startup error
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before any service is constructed

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ProxyConfig, ServiceConfig, ServiceRole};
use crate::fallback::condition::{ConditionError, ConditionSpec};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("service {0:?} is defined more than once")]
    DuplicateService(String),

    #[error("backend {0:?} is defined more than once")]
    DuplicateBackend(String),

    #[error("route {route:?} references unknown service {service:?}")]
    UnknownRouteService { route: String, service: String },

    #[error("backend {backend:?} references unknown service {service:?}")]
    UnknownBackendService { backend: String, service: String },

    #[error("backend {backend:?} belongs to static service {service:?}")]
    BackendOnStaticService { backend: String, service: String },

    #[error("backend {backend:?} has invalid address {address:?}")]
    InvalidBackendAddress { backend: String, address: String },

    #[error("service {service:?} has an invalid fallback_if_rc: {source}")]
    InvalidFallbackCondition {
        service: String,
        #[source]
        source: ConditionError,
    },

    #[error("service {service:?} falls back to unknown service {target:?}")]
    UnknownFallbackService { service: String, target: String },

    #[error("service {service:?} falls back to {target:?}, which is not a reverse proxy")]
    FallbackNotReverseProxy { service: String, target: String },

    #[error("service {0:?} cannot fall back to itself")]
    SelfFallback(String),

    #[error("static service {service:?} has invalid status {status}")]
    InvalidStaticStatus { service: String, status: u16 },

    #[error("invalid listener address {0:?}")]
    InvalidListenerAddress(String),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// Validate a full configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidListenerAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroValue("listener.max_connections"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.request_secs"));
    }
    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::ZeroValue("health_check.interval_secs"));
    }

    let mut services: HashMap<&str, &ServiceConfig> = HashMap::new();
    for service in &config.services {
        if service.name.is_empty() {
            errors.push(ValidationError::EmptyServiceName);
            continue;
        }
        if services.insert(service.name.as_str(), service).is_some() {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }
    }

    for service in &config.services {
        validate_service(service, &services, &mut errors);
    }

    for route in &config.routes {
        if !services.contains_key(route.service.as_str()) {
            errors.push(ValidationError::UnknownRouteService {
                route: route.name.clone(),
                service: route.service.clone(),
            });
        }
    }

    let mut backend_names = HashSet::new();
    for backend in &config.backends {
        if !backend_names.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.name.clone()));
        }
        match services.get(backend.service.as_str()) {
            None => errors.push(ValidationError::UnknownBackendService {
                backend: backend.name.clone(),
                service: backend.service.clone(),
            }),
            Some(owner) if owner.role == ServiceRole::Static => {
                errors.push(ValidationError::BackendOnStaticService {
                    backend: backend.name.clone(),
                    service: backend.service.clone(),
                })
            }
            Some(_) => {}
        }
        if backend.address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidBackendAddress {
                backend: backend.name.clone(),
                address: backend.address.clone(),
            });
        }
        if backend.max_connections == 0 {
            errors.push(ValidationError::ZeroValue("backends.max_connections"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_service(
    service: &ServiceConfig,
    services: &HashMap<&str, &ServiceConfig>,
    errors: &mut Vec<ValidationError>,
) {
    if let Err(source) = service.fallback_if_rc.parse::<ConditionSpec>() {
        errors.push(ValidationError::InvalidFallbackCondition {
            service: service.name.clone(),
            source,
        });
    }

    if service.role == ServiceRole::Static && !(100..=599).contains(&service.static_status) {
        errors.push(ValidationError::InvalidStaticStatus {
            service: service.name.clone(),
            status: service.static_status,
        });
    }

    let target = service.fallback_service.as_str();
    if target.is_empty() {
        return;
    }
    if target == service.name {
        errors.push(ValidationError::SelfFallback(service.name.clone()));
        return;
    }
    match services.get(target) {
        None => errors.push(ValidationError::UnknownFallbackService {
            service: service.name.clone(),
            target: target.to_string(),
        }),
        Some(fallback) if fallback.role != ServiceRole::ReverseProxy => {
            errors.push(ValidationError::FallbackNotReverseProxy {
                service: service.name.clone(),
                target: target.to_string(),
            })
        }
        Some(_) => {}
    }
}
