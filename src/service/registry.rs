//! Service registry.
//!
//! # Responsibilities
//! - Build every configured service after validating the configuration
//! - Look up enabled services by name (routing, fallback resolution)
//! - Enable/disable services at runtime (admin API)

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::config::validation::{validate_config, ValidationError};
use crate::config::ProxyConfig;
use crate::service::Service;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown service {0:?}")]
    UnknownService(String),
}

/// Owns all configured services.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Arc<Service>>,
}

impl ServiceRegistry {
    /// Validate `config` and build its services. Any validation failure
    /// rejects the whole configuration.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, Vec<ValidationError>> {
        validate_config(config)?;

        let registry = Self::default();
        let mut errors = Vec::new();
        for service_config in &config.services {
            match Service::from_config(service_config, &config.backends) {
                Ok(service) => {
                    registry.register(service);
                }
                Err(source) => errors.push(ValidationError::InvalidFallbackCondition {
                    service: service_config.name.clone(),
                    source,
                }),
            }
        }

        if errors.is_empty() {
            tracing::info!(services = registry.services.len(), "Service registry built");
            Ok(registry)
        } else {
            Err(errors)
        }
    }

    /// Insert a service, replacing any service with the same name.
    pub fn register(&self, service: Service) -> Arc<Service> {
        let service = Arc::new(service);
        if let Some(previous) = self
            .services
            .insert(service.name().to_string(), Arc::clone(&service))
        {
            tracing::info!(service = %previous.name(), "Service replaced");
        }
        service
    }

    /// Enabled service with the given name.
    pub fn lookup(&self, name: &str) -> Option<Arc<Service>> {
        self.services
            .get(name)
            .filter(|entry| entry.is_enabled())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Service with the given name, enabled or not.
    pub fn get(&self, name: &str) -> Option<Arc<Service>> {
        self.services.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// All services, sorted by name.
    pub fn all(&self) -> Vec<Arc<Service>> {
        let mut services: Vec<_> = self
            .services
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        services.sort_by(|a, b| a.name().cmp(b.name()));
        services
    }

    /// Returns whether the service was previously enabled.
    pub fn enable(&self, name: &str) -> Result<bool, RegistryError> {
        self.set_enabled(name, true)
    }

    /// Returns whether the service was previously enabled.
    pub fn disable(&self, name: &str) -> Result<bool, RegistryError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool, RegistryError> {
        let service = self
            .get(name)
            .ok_or_else(|| RegistryError::UnknownService(name.to_string()))?;
        let previous = service.set_enabled(enabled);
        if previous != enabled {
            tracing::info!(service = %name, enabled, "Service state changed");
        }
        Ok(previous)
    }
}
