//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, middleware, route match)
//!     → request.rs (request id)
//!     → pipeline.rs (dispatch loop: backend → hooks → maybe re-dispatch)
//!     → restoration hook, metrics, access log
//!     → Send to client
//! ```

pub mod pipeline;
pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::HttpServer;
