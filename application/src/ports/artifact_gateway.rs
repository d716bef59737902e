//! Artifact gateway port
//!
//! Defines the interface for requesting generated facilitation content from
//! the external AI backend. Implementations (adapters) live in the
//! infrastructure layer; retry, timeout budgeting, and request deduplication
//! are layered on top by [`crate::gateway::ArtifactBroker`] and are not the
//! adapter's concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storm_domain::{ArtifactKind, ContextSnapshot, RequestId, SessionError};
use thiserror::Error;

/// Errors that can occur during gateway operations.
///
/// Clonable so an in-flight result can be shared between deduplicated
/// callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The request exceeded its time budget.
    #[error("request timed out")]
    Timeout,

    /// The backend could not be reached or answered with a server-side
    /// failure. Worth retrying.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request (policy, malformed context). Not
    /// retryable.
    #[error("provider rejected request: {0}")]
    Rejected(String),

    /// The backend answered with something we could not use.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// Transient failures are retried with backoff; the rest fail fast.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Timeout | GatewayError::Unavailable(_))
    }
}

impl From<GatewayError> for SessionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timeout | GatewayError::Unavailable(_) => SessionError::Timeout,
            GatewayError::Rejected(reason) => SessionError::ProviderRejected(reason),
            GatewayError::MalformedResponse(reason) => SessionError::ProviderRejected(reason),
        }
    }
}

/// One generation request: which artifact family, and the context snapshot
/// the backend reconstructs everything from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub request: RequestId,
    pub kind: ArtifactKind,
    pub context: ContextSnapshot,
}

impl GenerationRequest {
    pub fn new(kind: ArtifactKind, context: ContextSnapshot) -> Self {
        Self {
            request: RequestId::generate(),
            kind,
            context,
        }
    }
}

/// Successful backend response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedContent {
    pub content: String,
    /// Opaque provider details (model name, token counts); logged, never
    /// interpreted.
    #[serde(default)]
    pub provider_metadata: Option<serde_json::Value>,
}

/// Gateway to the generative backend.
#[async_trait]
pub trait ArtifactGateway: Send + Sync {
    /// Issue one generation call. A single attempt, no retry inside.
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GatewayError>;
}
