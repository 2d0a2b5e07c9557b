//! Hand-off state machine.
//!
//! # States
//! ```text
//! DispatchedPrimary ─┬─▶ CompletingNormal ───────────────────────────────▶ Done
//!                    └─▶ FallbackTriggered ─▶ DispatchedFallback
//!                                               ─▶ CompletingFallback ─▶ Done
//! ```
//!
//! # Transitions
//! `DispatchedPrimary → FallbackTriggered` requires, in this order:
//! 1. the owning service has a fallback configured
//! 2. the response status satisfies the service's condition
//! 3. the request carried no body
//! 4. the fallback service resolves to a live handle
//!
//! On `FallbackTriggered`, the client and target are checked once more and
//! then: backend detached, exchange released, selector service set to the
//! original owner, client adopted by the fallback service.

use std::sync::Arc;

use crate::fallback::{AbandonReason, FallbackError, ProcessingDecision};
use crate::service::{BackendExchange, ClientConnection, Service, ServiceRegistry};

/// Progress of one request through the fallback machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    DispatchedPrimary,
    CompletingNormal,
    FallbackTriggered,
    DispatchedFallback,
    CompletingFallback,
    Done,
}

/// Why a response completed on the path it arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalCompletion {
    /// The owning service has no fallback service.
    NotConfigured,
    /// The status does not satisfy the fallback condition.
    ConditionNotMatched,
    /// The request already fell back once.
    AlreadyFellBack,
    /// A response arrived while no dispatch was outstanding.
    OutOfSequence(HandoffState),
}

/// Result of inspecting one backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffOutcome {
    Normal(NormalCompletion),
    Declined(FallbackError),
    HandedOff { target: String },
}

impl HandoffOutcome {
    /// What the host pipeline should do with the exchange.
    pub fn decision(&self) -> ProcessingDecision {
        match self {
            HandoffOutcome::HandedOff { .. } => ProcessingDecision::Stop,
            HandoffOutcome::Normal(_) | HandoffOutcome::Declined(_) => ProcessingDecision::Continue,
        }
    }

    /// Short label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            HandoffOutcome::Normal(NormalCompletion::NotConfigured) => "not_configured",
            HandoffOutcome::Normal(NormalCompletion::ConditionNotMatched) => "condition_not_matched",
            HandoffOutcome::Normal(NormalCompletion::AlreadyFellBack) => "completed_fallback",
            HandoffOutcome::Normal(NormalCompletion::OutOfSequence(_)) => "out_of_sequence",
            HandoffOutcome::Declined(err) => err.label(),
            HandoffOutcome::HandedOff { .. } => "handed_off",
        }
    }
}

/// Drives the hand-off of client connections between services.
#[derive(Debug, Clone)]
pub struct HandoffOrchestrator {
    registry: Arc<ServiceRegistry>,
}

impl HandoffOrchestrator {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Inspect a backend response whose headers just arrived and either
    /// leave it to complete normally or hand the client to the fallback
    /// service.
    pub fn on_response(
        &self,
        client: &mut ClientConnection,
        exchange: &mut BackendExchange,
    ) -> HandoffOutcome {
        match client.handoff_state() {
            HandoffState::DispatchedPrimary => {}
            HandoffState::DispatchedFallback => {
                client.set_handoff_state(HandoffState::CompletingFallback);
                return HandoffOutcome::Normal(NormalCompletion::AlreadyFellBack);
            }
            state => {
                tracing::warn!(connection_id = %client.id(), ?state, "Response outside a dispatch, not handing off");
                return HandoffOutcome::Normal(NormalCompletion::OutOfSequence(state));
            }
        }

        let owner = Arc::clone(client.service());
        let status = exchange.status().as_u16();

        if !owner.fallback().is_configured() {
            return complete_normally(client, HandoffOutcome::Normal(NormalCompletion::NotConfigured));
        }
        if !owner.condition().evaluate(status) {
            return complete_normally(
                client,
                HandoffOutcome::Normal(NormalCompletion::ConditionNotMatched),
            );
        }
        let body = exchange.request_body();
        if !body.is_replay_safe() {
            return complete_normally(
                client,
                HandoffOutcome::Declined(FallbackError::UnsafeRetry { body }),
            );
        }
        let target = match owner.fallback().resolve(&self.registry) {
            Ok(target) => target,
            Err(err) => return complete_normally(client, HandoffOutcome::Declined(err)),
        };

        client.set_handoff_state(HandoffState::FallbackTriggered);
        if let Err(err) = preflight(client, &target) {
            return complete_normally(client, HandoffOutcome::Declined(err));
        }

        client.detach_backend();
        exchange.release();
        client.set_selector_service(owner);
        target.adopt(client);
        client.set_handoff_state(HandoffState::DispatchedFallback);

        HandoffOutcome::HandedOff {
            target: target.name().to_string(),
        }
    }

    /// Give the request back to the service that handed it off. Returns
    /// whether ownership was restored.
    pub fn restore_owner(&self, client: &mut ClientConnection) -> bool {
        let restored = match client.take_selector_service() {
            Some(origin) => {
                client.set_service(origin);
                true
            }
            None => false,
        };
        client.set_handoff_state(HandoffState::Done);
        restored
    }
}

fn complete_normally(client: &mut ClientConnection, outcome: HandoffOutcome) -> HandoffOutcome {
    client.set_handoff_state(HandoffState::CompletingNormal);
    outcome
}

/// Last check before the client is detached; nothing has been touched yet,
/// so a failure here leaves the primary exchange intact.
fn preflight(client: &ClientConnection, target: &Service) -> Result<(), FallbackError> {
    let reason = if !client.is_open() {
        AbandonReason::ClientClosed
    } else if !target.is_enabled() {
        AbandonReason::TargetUnavailable
    } else {
        return Ok(());
    };
    Err(FallbackError::RaceAbandoned {
        target: target.name().to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, ProxyConfig, ServiceConfig};
    use crate::service::RequestBody;
    use axum::body::Body;
    use axum::http::{header, HeaderMap, HeaderValue, Response};

    fn registry(condition: &str) -> Arc<ServiceRegistry> {
        let mut config = ProxyConfig::default();
        config.services.push(ServiceConfig::reverse_proxy("legacy").with_fallback("modern", condition));
        config.services.push(ServiceConfig::reverse_proxy("modern"));
        config.services.push(ServiceConfig::reverse_proxy("standalone"));
        config.backends.push(BackendConfig {
            name: "legacy-1".into(),
            service: "legacy".into(),
            address: "127.0.0.1:3000".into(),
            max_connections: 10,
        });
        Arc::new(ServiceRegistry::from_config(&config).unwrap())
    }

    fn client_for(registry: &ServiceRegistry, service: &str) -> ClientConnection {
        ClientConnection::new(None, registry.get(service).unwrap())
    }

    fn exchange(status: u16, request_headers: &HeaderMap) -> BackendExchange {
        let response = Response::builder().status(status).body(Body::empty()).unwrap();
        BackendExchange::new(request_headers, response)
    }

    /// Dispatch `client` to its service's first backend and return the exchange.
    fn dispatched(client: &mut ClientConnection, status: u16, request_headers: &HeaderMap) -> BackendExchange {
        let guard = client.service().pool().select().unwrap();
        client.request_backend(Arc::clone(&guard.backend));
        exchange(status, request_headers).with_guard(guard)
    }

    #[test]
    fn test_hands_off_on_matching_status() {
        let registry = registry("404");
        let orchestrator = HandoffOrchestrator::new(Arc::clone(&registry));
        let mut client = client_for(&registry, "legacy");
        let mut exchange = dispatched(&mut client, 404, &HeaderMap::new());
        let backend = Arc::clone(exchange.backend().unwrap());

        let outcome = orchestrator.on_response(&mut client, &mut exchange);

        assert_eq!(outcome, HandoffOutcome::HandedOff { target: "modern".into() });
        assert_eq!(outcome.decision(), ProcessingDecision::Stop);
        assert_eq!(client.service().name(), "modern");
        assert_eq!(client.selector_service().unwrap().name(), "legacy");
        assert!(!client.is_backend_requested());
        assert!(client.backend().is_none());
        assert!(exchange.is_released());
        assert_eq!(backend.active_connections(), 0);
        assert_eq!(client.handoff_state(), HandoffState::DispatchedFallback);
    }

    #[test]
    fn test_fallback_response_completes_and_restores_owner() {
        let registry = registry("404");
        let orchestrator = HandoffOrchestrator::new(Arc::clone(&registry));
        let mut client = client_for(&registry, "legacy");
        orchestrator.on_response(&mut client, &mut exchange(404, &HeaderMap::new()));

        // The fallback backend also answers 404: no second hop.
        let outcome = orchestrator.on_response(&mut client, &mut exchange(404, &HeaderMap::new()));
        assert_eq!(outcome, HandoffOutcome::Normal(NormalCompletion::AlreadyFellBack));
        assert_eq!(client.handoff_state(), HandoffState::CompletingFallback);

        assert!(orchestrator.restore_owner(&mut client));
        assert_eq!(client.service().name(), "legacy");
        assert!(client.selector_service().is_none());
        assert_eq!(client.handoff_state(), HandoffState::Done);
    }

    #[test]
    fn test_non_matching_status_completes_normally() {
        let registry = registry("!200,302");
        let orchestrator = HandoffOrchestrator::new(Arc::clone(&registry));
        let mut client = client_for(&registry, "legacy");
        let mut exchange = exchange(200, &HeaderMap::new());

        let outcome = orchestrator.on_response(&mut client, &mut exchange);

        assert_eq!(outcome, HandoffOutcome::Normal(NormalCompletion::ConditionNotMatched));
        assert_eq!(outcome.decision(), ProcessingDecision::Continue);
        assert_eq!(client.service().name(), "legacy");
        assert!(!exchange.is_released());
        assert_eq!(client.handoff_state(), HandoffState::CompletingNormal);

        assert!(!orchestrator.restore_owner(&mut client));
        assert_eq!(client.service().name(), "legacy");
    }

    #[test]
    fn test_negated_condition_hands_off_other_statuses() {
        let registry = registry("!200,302");
        let orchestrator = HandoffOrchestrator::new(Arc::clone(&registry));
        let mut client = client_for(&registry, "legacy");

        let outcome = orchestrator.on_response(&mut client, &mut exchange(500, &HeaderMap::new()));
        assert_eq!(outcome, HandoffOutcome::HandedOff { target: "modern".into() });
    }

    #[test]
    fn test_request_with_body_never_hands_off() {
        let registry = registry("404");
        let orchestrator = HandoffOrchestrator::new(Arc::clone(&registry));
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));

        for status in [200, 404, 500] {
            let mut client = client_for(&registry, "legacy");
            let mut exchange = dispatched(&mut client, status, &headers);
            let outcome = orchestrator.on_response(&mut client, &mut exchange);

            assert_eq!(outcome.decision(), ProcessingDecision::Continue);
            assert_eq!(client.service().name(), "legacy");
            assert!(client.is_backend_requested());
            assert!(!exchange.is_released());
        }

        let mut client = client_for(&registry, "legacy");
        let outcome = orchestrator.on_response(&mut client, &mut exchange(404, &headers));
        assert_eq!(
            outcome,
            HandoffOutcome::Declined(FallbackError::UnsafeRetry {
                body: RequestBody::Length(10)
            })
        );
    }

    #[test]
    fn test_zero_length_body_is_replay_safe() {
        let registry = registry("404");
        let orchestrator = HandoffOrchestrator::new(Arc::clone(&registry));
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        let mut client = client_for(&registry, "legacy");

        let outcome = orchestrator.on_response(&mut client, &mut exchange(404, &headers));
        assert_eq!(outcome.decision(), ProcessingDecision::Stop);
    }

    #[test]
    fn test_unresolvable_target_completes_normally() {
        let registry = registry("404");
        registry.disable("modern").unwrap();
        let orchestrator = HandoffOrchestrator::new(Arc::clone(&registry));
        let mut client = client_for(&registry, "legacy");
        let mut first = exchange(404, &HeaderMap::new());

        let outcome = orchestrator.on_response(&mut client, &mut first);
        assert_eq!(
            outcome,
            HandoffOutcome::Declined(FallbackError::ResolutionFailed { target: "modern".into() })
        );
        assert_eq!(client.service().name(), "legacy");
        assert!(!first.is_released());

        // Enabling the target later takes effect on the next request.
        registry.enable("modern").unwrap();
        let mut client = client_for(&registry, "legacy");
        let outcome = orchestrator.on_response(&mut client, &mut exchange(404, &HeaderMap::new()));
        assert_eq!(outcome.decision(), ProcessingDecision::Stop);
    }

    #[test]
    fn test_closed_client_is_not_adopted() {
        let registry = registry("404");
        let orchestrator = HandoffOrchestrator::new(Arc::clone(&registry));
        let mut client = client_for(&registry, "legacy");
        let mut exchange = dispatched(&mut client, 404, &HeaderMap::new());
        client.close();

        let outcome = orchestrator.on_response(&mut client, &mut exchange);
        assert_eq!(
            outcome,
            HandoffOutcome::Declined(FallbackError::RaceAbandoned {
                target: "modern".into(),
                reason: AbandonReason::ClientClosed,
            })
        );
        assert_eq!(client.service().name(), "legacy");
        assert!(client.is_backend_requested());
        assert!(client.selector_service().is_none());
        assert!(!exchange.is_released());
    }

    #[test]
    fn test_target_disabled_after_resolution() {
        let registry = registry("404");
        let orchestrator = HandoffOrchestrator::new(Arc::clone(&registry));
        let modern = registry.get("modern").unwrap();

        assert!(preflight(&client_for(&registry, "legacy"), &modern).is_ok());
        registry.disable("modern").unwrap();
        assert_eq!(
            preflight(&client_for(&registry, "legacy"), &modern),
            Err(FallbackError::RaceAbandoned {
                target: "modern".into(),
                reason: AbandonReason::TargetUnavailable,
            })
        );

        // Through the orchestrator the stale memo is caught at resolution.
        let mut client = client_for(&registry, "legacy");
        let outcome = orchestrator.on_response(&mut client, &mut exchange(404, &HeaderMap::new()));
        assert_eq!(outcome.decision(), ProcessingDecision::Continue);
    }

    #[test]
    fn test_service_without_fallback() {
        let registry = registry("404");
        let orchestrator = HandoffOrchestrator::new(Arc::clone(&registry));
        let mut client = client_for(&registry, "standalone");

        let outcome = orchestrator.on_response(&mut client, &mut exchange(404, &HeaderMap::new()));
        assert_eq!(outcome, HandoffOutcome::Normal(NormalCompletion::NotConfigured));
    }

    #[test]
    fn test_response_after_completion_is_out_of_sequence() {
        let registry = registry("404");
        let orchestrator = HandoffOrchestrator::new(Arc::clone(&registry));
        let mut client = client_for(&registry, "legacy");

        orchestrator.on_response(&mut client, &mut exchange(200, &HeaderMap::new()));
        assert_eq!(client.handoff_state(), HandoffState::CompletingNormal);

        let outcome = orchestrator.on_response(&mut client, &mut exchange(404, &HeaderMap::new()));
        assert_eq!(
            outcome,
            HandoffOutcome::Normal(NormalCompletion::OutOfSequence(HandoffState::CompletingNormal))
        );
        assert_eq!(outcome.label(), "out_of_sequence");
        assert_eq!(outcome.decision(), ProcessingDecision::Continue);
        assert_eq!(client.service().name(), "legacy");

        orchestrator.restore_owner(&mut client);
        let outcome = orchestrator.on_response(&mut client, &mut exchange(404, &HeaderMap::new()));
        assert_eq!(outcome, HandoffOutcome::Normal(NormalCompletion::OutOfSequence(HandoffState::Done)));
    }
}
