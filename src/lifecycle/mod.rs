//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build registry → Start listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: an invalid configuration never reaches the listener
//! - Ordered shutdown: stop accept, drain, close
//! - Draining has a deadline (`timeouts.drain_secs`)

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
