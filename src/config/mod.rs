//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → ProxyConfig (validated, immutable)
//!     → ServiceRegistry::from_config builds one Service per entry
//! ```
//!
//! # Design Decisions
//! - Config is load-time only; nothing re-reads it while serving
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Fallback conditions are parsed during validation, so a bad
//!   `fallback_if_rc` keeps the proxy from starting

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    AdminConfig, BackendConfig, HealthCheckConfig, LbAlgorithm, ListenerConfig, LogFormat,
    ObservabilityConfig, ProxyConfig, RouteConfig, ServiceConfig, ServiceRole, TimeoutConfig,
};
pub use loader::{load_config, parse_config, ConfigError};
