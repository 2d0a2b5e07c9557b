//! Extension points of the request pipeline.
//!
//! The pipeline calls [`PipelineHooks::on_backend_response_received`] as soon
//! as a backend's response headers arrive, and
//! [`PipelineHooks::on_return_to_originating_service`] once the request is
//! finished, before it is logged and counted. Both run synchronously inside
//! the request task and must not block.

use crate::fallback::handoff::{HandoffOrchestrator, HandoffOutcome};
use crate::observability::metrics;
use crate::service::{BackendExchange, ClientConnection};

/// Whether the host continues with its default processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingDecision {
    Continue,
    Stop,
}

pub trait PipelineHooks: Send + Sync {
    /// `Stop` means the client was handed to another service: the host
    /// must discard this exchange and dispatch the client again.
    fn on_backend_response_received(
        &self,
        client: &mut ClientConnection,
        exchange: &mut BackendExchange,
    ) -> ProcessingDecision;

    /// `Stop` means ownership was already settled and the host must skip
    /// its default attribution.
    fn on_return_to_originating_service(&self, client: &mut ClientConnection) -> ProcessingDecision;
}

/// Hooks installing the conditional fallback.
#[derive(Debug, Clone)]
pub struct FallbackHooks {
    orchestrator: HandoffOrchestrator,
}

impl FallbackHooks {
    pub fn new(orchestrator: HandoffOrchestrator) -> Self {
        Self { orchestrator }
    }
}

impl PipelineHooks for FallbackHooks {
    fn on_backend_response_received(
        &self,
        client: &mut ClientConnection,
        exchange: &mut BackendExchange,
    ) -> ProcessingDecision {
        let origin = client.service().name().to_string();
        let status = exchange.status();
        let outcome = self.orchestrator.on_response(client, exchange);

        match &outcome {
            HandoffOutcome::HandedOff { target } => {
                tracing::info!(
                    connection_id = %client.id(),
                    service = %origin,
                    fallback = %target,
                    status = status.as_u16(),
                    "Handing request to fallback service"
                );
                if let Some(owner) = client.selector_service() {
                    owner.stats().record_handoff();
                }
                metrics::record_fallback(&origin, target, outcome.label());
            }
            HandoffOutcome::Declined(err) => {
                tracing::debug!(
                    connection_id = %client.id(),
                    service = %origin,
                    status = status.as_u16(),
                    reason = %err,
                    "Fallback skipped"
                );
                let target = client.service().fallback().name().unwrap_or_default().to_string();
                metrics::record_fallback(&origin, &target, outcome.label());
            }
            HandoffOutcome::Normal(reason) => {
                tracing::trace!(connection_id = %client.id(), service = %origin, ?reason, "Normal completion");
            }
        }

        outcome.decision()
    }

    fn on_return_to_originating_service(&self, client: &mut ClientConnection) -> ProcessingDecision {
        let served_by = client.service().name().to_string();
        if self.orchestrator.restore_owner(client) {
            tracing::debug!(
                connection_id = %client.id(),
                served_by = %served_by,
                service = %client.service().name(),
                "Ownership returned to originating service"
            );
            ProcessingDecision::Stop
        } else {
            ProcessingDecision::Continue
        }
    }
}
