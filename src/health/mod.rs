//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe every backend of every service
//!     → Backend::mark_success / mark_failure
//!
//! Passive health checks (passive.rs):
//!     Proxied response or connection error observed
//!     → Backend::mark_success / mark_failure
//! ```
//!
//! # Backend States
//! ```text
//! Healthy → Unhealthy: consecutive failures >= unhealthy_threshold
//! Unhealthy → Healthy: consecutive successes >= healthy_threshold
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - Health state is per-backend, not per-service
//! - A service whose backends are all unhealthy answers 503; it is not
//!   disabled, so fallback resolution is unaffected

pub mod active;
pub mod passive;
