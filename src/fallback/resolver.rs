//! Fallback target resolution.
//!
//! The configured fallback service name is resolved against the registry on
//! first use and the result memoized on the owning service. The memo holds a
//! `Weak` handle: the registry owns services, the memo only remembers where
//! to find one. A remembered handle is revalidated on every use and a failed
//! lookup is never remembered as final, so a fallback service that is enabled
//! later is picked up by the next request.

use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::fallback::FallbackError;
use crate::service::{Service, ServiceRegistry};

/// Memoized lookup result.
#[derive(Debug, Default)]
enum Resolution {
    #[default]
    NotAttempted,
    Failed,
    Resolved(Weak<Service>),
}

/// Externally visible resolution state, for the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    Disabled,
    NotAttempted,
    Failed,
    Resolved,
}

/// The fallback service a service hands requests to.
#[derive(Debug)]
pub struct FallbackTarget {
    name: String,
    memo: ArcSwap<Resolution>,
}

impl FallbackTarget {
    /// An empty `name` disables fallback.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            memo: ArcSwap::from_pointee(Resolution::NotAttempted),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.name.is_empty()
    }

    /// Configured service name, `None` when fallback is disabled.
    pub fn name(&self) -> Option<&str> {
        self.is_configured().then_some(self.name.as_str())
    }

    pub fn state(&self) -> ResolutionState {
        if !self.is_configured() {
            return ResolutionState::Disabled;
        }
        match **self.memo.load() {
            Resolution::NotAttempted => ResolutionState::NotAttempted,
            Resolution::Failed => ResolutionState::Failed,
            Resolution::Resolved(_) => ResolutionState::Resolved,
        }
    }

    /// Resolve the target to a live, enabled service.
    pub fn resolve(&self, registry: &ServiceRegistry) -> Result<Arc<Service>, FallbackError> {
        if !self.is_configured() {
            return Err(self.not_found());
        }

        let current = self.memo.load();
        let found = registry.lookup(&self.name);
        if let Resolution::Resolved(handle) = &**current {
            // Still registered under this name and enabled.
            match (handle.upgrade(), &found) {
                (Some(cached), Some(live)) if Arc::ptr_eq(&cached, live) => return Ok(cached),
                _ => tracing::debug!(target_service = %self.name, "Cached fallback handle is stale, re-resolving"),
            }
        }

        let next = match &found {
            Some(service) => Resolution::Resolved(Arc::downgrade(service)),
            None => Resolution::Failed,
        };
        // Losing the race means another request stored an equally fresh answer.
        self.memo.compare_and_swap(&current, Arc::new(next));

        found.ok_or_else(|| self.not_found())
    }

    fn not_found(&self) -> FallbackError {
        FallbackError::ResolutionFailed {
            target: self.name.clone(),
        }
    }
}
