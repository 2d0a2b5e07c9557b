//! Per-service backend pool.
//!
//! # Responsibilities
//! - Hold the backends of one service
//! - Apply the service's load balancing algorithm
//! - Provide connection guards for tracking

use std::sync::Arc;

use crate::config::{BackendConfig, LbAlgorithm};
use crate::load_balancer::{
    backend::{Backend, BackendConnectionGuard},
    for_algorithm, LoadBalancer,
};

#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
    balancer: Box<dyn LoadBalancer>,
}

impl BackendPool {
    pub fn new<'a>(configs: impl IntoIterator<Item = &'a BackendConfig>, algorithm: LbAlgorithm) -> Self {
        let mut backends = Vec::new();
        for config in configs {
            match config.address.parse() {
                Ok(addr) => backends.push(Arc::new(Backend::new(
                    config.name.clone(),
                    addr,
                    config.max_connections,
                ))),
                Err(_) => tracing::warn!(backend = %config.name, address = %config.address, "Invalid backend address"),
            }
        }

        Self {
            backends,
            balancer: for_algorithm(algorithm),
        }
    }

    /// Select a backend and take a connection slot on it.
    pub fn select(&self) -> Option<BackendConnectionGuard> {
        match self.balancer.next_server(&self.backends) {
            Some(backend) => backend.try_create_guard(),
            None => {
                tracing::debug!(backend_count = self.backends.len(), "No healthy backends in pool");
                for b in &self.backends {
                    tracing::debug!(backend = %b.name, addr = %b.addr, state = ?b.health(), "Backend status");
                }
                None
            }
        }
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
