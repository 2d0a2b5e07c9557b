//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → connection.rs (id assignment, in-flight tracking)
//!     → ClientConnection carries the id through the pipeline
//!     → Guard dropped when the response is handed back
//! ```
//!
//! # Design Decisions
//! - Every routed request is tracked so shutdown can drain them
//! - Connection ids are process-unique and used as the log correlation key

pub mod connection;
