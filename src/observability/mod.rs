//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Connection id flows through every fallback log line
//! - Requests are counted against the owning service only after the
//!   restoration hook has run, so fallbacks stay invisible in per-service stats

pub mod logging;
pub mod metrics;
