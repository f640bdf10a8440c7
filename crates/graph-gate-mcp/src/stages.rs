// crates/graph-gate-mcp/src/stages.rs
// ============================================================================
// Module: Gateway Stages
// Description: Concrete pipeline stages wrapping the guards and validators.
// Purpose: Bind path, CORS, credential, probe, and token checks to exchanges.
// Dependencies: async-trait, axum, graph-gate-config
// ============================================================================

//! ## Overview
//! Each stage adapts one guard to the [`GatewayStage`] contract. Stages only
//! write to the exchange they are given; none of them keep per-request
//! state. Authentication denials are audited where they happen.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use axum::http::header::ORIGIN;
use graph_gate_config::AuthMode;

use crate::audit::AuthAuditEvent;
use crate::audit::AuthAuditSink;
use crate::auth::AuthError;
use crate::auth::BasicPrincipal;
use crate::auth::Credential;
use crate::auth::CredentialExtractor;
use crate::auth::RequestIdentity;
use crate::classify::MethodClass;
use crate::classify::MethodClassifier;
use crate::classify::UnauthenticatedProbeGuard;
use crate::classify::read_and_restore;
use crate::guards::CorsGuard;
use crate::guards::PathGuard;
use crate::pipeline::Exchange;
use crate::pipeline::GatewayStage;
use crate::pipeline::Rejection;
use crate::pipeline::StageOutcome;
use crate::token::TokenValidator;

// ============================================================================
// SECTION: Path
// ============================================================================

/// Rejects requests outside the gateway endpoint.
pub struct PathStage {
    /// Endpoint guard.
    guard: PathGuard,
}

impl PathStage {
    /// Wraps a path guard.
    #[must_use]
    pub const fn new(guard: PathGuard) -> Self {
        Self {
            guard,
        }
    }
}

#[async_trait]
impl GatewayStage for PathStage {
    fn name(&self) -> &'static str {
        "path"
    }

    async fn process(&self, exchange: &mut Exchange) -> StageOutcome {
        match self.guard.check(exchange.request.method(), exchange.request.uri().path()) {
            Ok(()) => StageOutcome::Continue,
            Err(rejection) => StageOutcome::Reject(rejection),
        }
    }
}

// ============================================================================
// SECTION: CORS
// ============================================================================

/// Collects CORS headers and answers preflight requests.
pub struct CorsStage {
    /// Origin guard.
    guard: CorsGuard,
}

impl CorsStage {
    /// Wraps a CORS guard.
    #[must_use]
    pub const fn new(guard: CorsGuard) -> Self {
        Self {
            guard,
        }
    }
}

#[async_trait]
impl GatewayStage for CorsStage {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn process(&self, exchange: &mut Exchange) -> StageOutcome {
        let headers = self.guard.headers_for(exchange.request.headers().get(ORIGIN));
        exchange.response_headers.extend(headers);
        if exchange.request.method() == Method::OPTIONS {
            return StageOutcome::Respond(self.guard.preflight_response());
        }
        StageOutcome::Continue
    }
}

// ============================================================================
// SECTION: Credential
// ============================================================================

/// Parses the credential header.
pub struct CredentialStage {
    /// Header parser.
    extractor: CredentialExtractor,
    /// Decision audit sink.
    audit: Arc<dyn AuthAuditSink>,
}

impl CredentialStage {
    /// Builds the stage.
    #[must_use]
    pub fn new(extractor: CredentialExtractor, audit: Arc<dyn AuthAuditSink>) -> Self {
        Self {
            extractor,
            audit,
        }
    }
}

#[async_trait]
impl GatewayStage for CredentialStage {
    fn name(&self) -> &'static str {
        "credential"
    }

    async fn process(&self, exchange: &mut Exchange) -> StageOutcome {
        self.extractor.normalize(exchange.request.headers_mut());
        match self.extractor.extract(exchange.request.headers()) {
            Ok(credential) => {
                exchange.credential = credential;
                StageOutcome::Continue
            }
            Err(error) => {
                self.audit.record(&AuthAuditEvent::denied(
                    "credential",
                    &RequestIdentity::Anonymous,
                    error.description(),
                ));
                StageOutcome::Reject(Rejection::Unauthenticated(error))
            }
        }
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Reads the body, classifies the method, and applies the probe exception.
pub struct ClassifyStage {
    /// Method classifier.
    classifier: MethodClassifier,
    /// Unauthenticated probe policy.
    probe: UnauthenticatedProbeGuard,
    /// Gateway auth mode.
    mode: AuthMode,
    /// Body cap for every request; anonymous probes are further capped.
    max_body_bytes: usize,
    /// Decision audit sink.
    audit: Arc<dyn AuthAuditSink>,
}

impl ClassifyStage {
    /// Builds the stage.
    #[must_use]
    pub fn new(
        probe: UnauthenticatedProbeGuard,
        mode: AuthMode,
        max_body_bytes: usize,
        audit: Arc<dyn AuthAuditSink>,
    ) -> Self {
        Self {
            classifier: MethodClassifier,
            probe,
            mode,
            max_body_bytes,
            audit,
        }
    }
}

#[async_trait]
impl GatewayStage for ClassifyStage {
    fn name(&self) -> &'static str {
        "classify"
    }

    async fn process(&self, exchange: &mut Exchange) -> StageOutcome {
        let anonymous = exchange.credential == Credential::Absent && self.mode == AuthMode::Required;
        exchange.body = match read_and_restore(&mut exchange.request, self.max_body_bytes).await {
            Ok(body) => body,
            Err(rejection) => return StageOutcome::Reject(rejection),
        };
        exchange.rpc_method = self.classifier.peek_method(&exchange.body);
        if !anonymous {
            return StageOutcome::Continue;
        }

        let method = exchange.rpc_method.as_deref();
        match self.classifier.classify(method) {
            MethodClass::Public => StageOutcome::Continue,
            MethodClass::Probe if method.is_some_and(|name| self.probe.permits(name)) => {
                if let Err(rejection) = self.probe.check_method(exchange.request.method()) {
                    return StageOutcome::Reject(rejection);
                }
                if exchange.body.len() > self.probe.max_body_bytes() {
                    return StageOutcome::Reject(Rejection::PayloadTooLarge {
                        limit: self.probe.max_body_bytes(),
                    });
                }
                exchange.probe = true;
                StageOutcome::Continue
            }
            MethodClass::Probe | MethodClass::Protected => {
                self.audit.record(
                    &AuthAuditEvent::denied("classify", &RequestIdentity::Anonymous, "authentication required")
                        .with_rpc_method(method),
                );
                StageOutcome::Reject(Rejection::Unauthenticated(AuthError::InvalidRequest(
                    "authentication required".to_string(),
                )))
            }
        }
    }
}

// ============================================================================
// SECTION: Token
// ============================================================================

/// Turns the parsed credential into a request identity.
pub struct TokenStage {
    /// Bearer validator; bearer tokens are refused when absent.
    validator: Option<Arc<TokenValidator>>,
    /// Decision audit sink.
    audit: Arc<dyn AuthAuditSink>,
}

impl TokenStage {
    /// Builds the stage.
    #[must_use]
    pub fn new(validator: Option<Arc<TokenValidator>>, audit: Arc<dyn AuthAuditSink>) -> Self {
        Self {
            validator,
            audit,
        }
    }
}

#[async_trait]
impl GatewayStage for TokenStage {
    fn name(&self) -> &'static str {
        "token"
    }

    async fn process(&self, exchange: &mut Exchange) -> StageOutcome {
        let identity = match &exchange.credential {
            Credential::Absent => RequestIdentity::Anonymous,
            Credential::Basic {
                username,
                password,
            } => RequestIdentity::Basic(BasicPrincipal::new(username.as_str(), password.as_str())),
            Credential::Bearer(token) => {
                let Some(validator) = &self.validator else {
                    let error = AuthError::InvalidToken(
                        "bearer tokens are not accepted by this server".to_string(),
                    );
                    self.audit.record(&AuthAuditEvent::denied(
                        "token",
                        &RequestIdentity::Anonymous,
                        error.description(),
                    ));
                    return StageOutcome::Reject(Rejection::Unauthenticated(error));
                };
                match validator.validate(token).await {
                    Ok(principal) => RequestIdentity::Bearer(principal),
                    Err(error) => {
                        let mut event = AuthAuditEvent::denied(
                            "token",
                            &RequestIdentity::Anonymous,
                            error.description(),
                        );
                        event.token_fingerprint = Some(crate::auth::token_fingerprint(token));
                        self.audit.record(&event.with_rpc_method(exchange.rpc_method.as_deref()));
                        return StageOutcome::Reject(Rejection::Unauthenticated(error.into()));
                    }
                }
            }
        };
        exchange.identity = identity;
        StageOutcome::Continue
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
