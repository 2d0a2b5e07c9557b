use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::config::ServiceRole;
use crate::fallback::ResolutionState;
use crate::service::{RegistryError, Service};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub services: usize,
    pub enabled_services: usize,
}

#[derive(Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub address: String,
    pub healthy: bool,
    pub active_connections: usize,
}

#[derive(Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub role: ServiceRole,
    pub enabled: bool,
    pub fallback_service: Option<String>,
    pub fallback_if_rc: String,
    pub fallback_state: ResolutionState,
    pub requests: u64,
    pub handoffs: u64,
    pub backends: Vec<BackendStatus>,
}

impl From<&Service> for ServiceStatus {
    fn from(service: &Service) -> Self {
        Self {
            name: service.name().to_string(),
            role: service.role(),
            enabled: service.is_enabled(),
            fallback_service: service.fallback().name().map(str::to_string),
            fallback_if_rc: service.condition().to_string(),
            fallback_state: service.fallback().state(),
            requests: service.stats().requests(),
            handoffs: service.stats().handoffs(),
            backends: service
                .pool()
                .backends()
                .iter()
                .map(|b| BackendStatus {
                    name: b.name.clone(),
                    address: b.addr.to_string(),
                    healthy: b.is_healthy(),
                    active_connections: b.active_connections(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct ServiceToggle {
    pub service: String,
    pub enabled: bool,
    /// False when the service already was in the requested state.
    pub changed: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let services = state.registry.all();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        services: services.len(),
        enabled_services: services.iter().filter(|s| s.is_enabled()).count(),
    })
}

pub async fn get_services(State(state): State<AdminState>) -> Json<Vec<ServiceStatus>> {
    Json(
        state
            .registry
            .all()
            .iter()
            .map(|s| ServiceStatus::from(s.as_ref()))
            .collect(),
    )
}

pub async fn enable_service(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceToggle>, (StatusCode, String)> {
    toggle(&state, name, true)
}

pub async fn disable_service(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceToggle>, (StatusCode, String)> {
    toggle(&state, name, false)
}

fn toggle(state: &AdminState, name: String, enabled: bool) -> Result<Json<ServiceToggle>, (StatusCode, String)> {
    let result = if enabled {
        state.registry.enable(&name)
    } else {
        state.registry.disable(&name)
    };

    match result {
        Ok(previous) => {
            tracing::debug!(service = %name, enabled, "Admin toggle applied");
            Ok(Json(ServiceToggle {
                service: name,
                enabled,
                changed: previous != enabled,
            }))
        }
        Err(e @ RegistryError::UnknownService(_)) => Err((StatusCode::NOT_FOUND, e.to_string())),
    }
}
