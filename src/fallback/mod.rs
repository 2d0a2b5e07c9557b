//! Conditional fallback between services.
//!
//! # Data Flow
//! ```text
//! primary backend response headers
//!     → hooks.rs (on_backend_response_received)
//!     → handoff.rs (condition.rs evaluate, resolver.rs resolve)
//!     → detach client, release exchange, adopt into fallback service
//!     → host re-dispatches to the fallback backend
//!     → hooks.rs (on_return_to_originating_service)
//!     → owning service restored before logging and metrics
//! ```
//!
//! # Design Decisions
//! - Conditions are parsed at config load, never per request
//! - One hop only: a request that already fell back is never handed off again
//! - Requests with a body are never handed off (the body is not buffered)
//! - Every failure degrades to "no fallback configured"; nothing here fails
//!   a client request

use std::fmt;

use thiserror::Error;

use crate::service::RequestBody;

pub mod condition;
pub mod handoff;
pub mod hooks;
pub mod resolver;

pub use condition::{ConditionError, ConditionSpec};
pub use handoff::{HandoffOrchestrator, HandoffOutcome, HandoffState, NormalCompletion};
pub use hooks::{FallbackHooks, PipelineHooks, ProcessingDecision};
pub use resolver::{FallbackTarget, ResolutionState};

/// Why a hand-off that was otherwise due did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackError {
    #[error("fallback service {target:?} is not available")]
    ResolutionFailed { target: String },

    #[error("request body ({body}) cannot be replayed to another backend")]
    UnsafeRetry { body: RequestBody },

    #[error("hand-off to {target:?} abandoned: {reason}")]
    RaceAbandoned {
        target: String,
        reason: AbandonReason,
    },
}

impl FallbackError {
    /// Short label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FallbackError::ResolutionFailed { .. } => "resolution_failed",
            FallbackError::UnsafeRetry { .. } => "unsafe_retry",
            FallbackError::RaceAbandoned { .. } => "race_abandoned",
        }
    }
}

/// What changed between deciding to fall back and handing off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The client connection closed.
    ClientClosed,
    /// The fallback service was disabled or replaced.
    TargetUnavailable,
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonReason::ClientClosed => f.write_str("client connection closed"),
            AbandonReason::TargetUnavailable => f.write_str("fallback service became unavailable"),
        }
    }
}
