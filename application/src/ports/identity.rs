//! Identity verification port
//!
//! The account/auth collaborator turns an opaque join token into a verified
//! participant identity. The orchestrator trusts the returned identity and
//! role claim as given; authentication itself is out of scope.

use async_trait::async_trait;
use storm_domain::{ParticipantId, Role, SessionId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdentityError {
    #[error("unknown or expired token")]
    UnknownToken,

    #[error("token is not valid for this session")]
    WrongSession,
}

/// A verified identity as supplied by the account collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    pub participant: ParticipantId,
    pub display_name: String,
    pub role: Role,
}

impl VerifiedIdentity {
    pub fn new(participant: ParticipantId, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            participant,
            display_name: display_name.into(),
            role,
        }
    }
}

/// Resolves join tokens to identities.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(
        &self,
        session: &SessionId,
        token: &str,
    ) -> Result<VerifiedIdentity, IdentityError>;
}
