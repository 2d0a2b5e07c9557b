//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Service selected (route or fallback adoption)
//!     → pool.rs (the service's backends)
//!     → Apply the service's load balancing algorithm:
//!         - round_robin.rs (rotate through backends)
//!         - least_conn.rs (pick backend with fewest connections)
//!     → backend.rs (take a connection slot)
//!     → Return a slot guard or None
//! ```
//!
//! # Design Decisions
//! - One pool per service; a fallback hand-off simply selects from the
//!   fallback service's pool
//! - Unhealthy backends excluded from selection
//! - Connection slots are RAII guards so a released exchange frees its slot

use std::sync::Arc;

use crate::config::LbAlgorithm;
use crate::load_balancer::backend::Backend;

pub mod backend;
pub mod least_conn;
pub mod pool;
pub mod round_robin;

/// Backend selection strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick a healthy backend, or `None` if there is none.
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;
}

/// Strategy for a configured algorithm.
pub fn for_algorithm(algorithm: LbAlgorithm) -> Box<dyn LoadBalancer> {
    match algorithm {
        LbAlgorithm::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        LbAlgorithm::LeastConnections => Box::new(least_conn::LeastConnections::new()),
    }
}
