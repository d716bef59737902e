//! Roster-backed identity verification
//!
//! An in-memory token roster: each join token is enrolled for one session
//! and resolves to a fixed identity. This mirrors the invitation-token model
//! of the surrounding product; the real account service sits behind the
//! same port in production deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use storm_application::ports::identity::{IdentityError, IdentityVerifier, VerifiedIdentity};
use storm_domain::SessionId;

pub struct RosterIdentityVerifier {
    tokens: RwLock<HashMap<String, (SessionId, VerifiedIdentity)>>,
}

impl RosterIdentityVerifier {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Enroll a token for a session. Re-enrolling a token replaces its
    /// previous binding.
    pub fn enroll(&self, session: SessionId, token: impl Into<String>, identity: VerifiedIdentity) {
        self.tokens
            .write()
            .expect("roster lock poisoned")
            .insert(token.into(), (session, identity));
    }

    /// Remove a token, e.g. when a participant is uninvited.
    pub fn revoke(&self, token: &str) {
        self.tokens
            .write()
            .expect("roster lock poisoned")
            .remove(token);
    }
}

impl Default for RosterIdentityVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityVerifier for RosterIdentityVerifier {
    async fn verify(
        &self,
        session: &SessionId,
        token: &str,
    ) -> Result<VerifiedIdentity, IdentityError> {
        let tokens = self.tokens.read().expect("roster lock poisoned");
        let (enrolled_session, identity) =
            tokens.get(token).ok_or(IdentityError::UnknownToken)?;
        if enrolled_session != session {
            return Err(IdentityError::WrongSession);
        }
        Ok(identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_domain::{ParticipantId, Role};

    fn identity() -> VerifiedIdentity {
        VerifiedIdentity::new(ParticipantId::new("alice"), "Alice", Role::Member)
    }

    #[tokio::test]
    async fn test_enrolled_token_verifies_for_its_session() {
        let roster = RosterIdentityVerifier::new();
        roster.enroll(SessionId::new("s-1"), "tok-1", identity());

        let verified = roster.verify(&SessionId::new("s-1"), "tok-1").await.unwrap();
        assert_eq!(verified.participant, ParticipantId::new("alice"));
        assert_eq!(verified.role, Role::Member);
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let roster = RosterIdentityVerifier::new();
        let err = roster
            .verify(&SessionId::new("s-1"), "nope")
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::UnknownToken);
    }

    #[tokio::test]
    async fn test_token_is_bound_to_its_session() {
        let roster = RosterIdentityVerifier::new();
        roster.enroll(SessionId::new("s-1"), "tok-1", identity());

        let err = roster
            .verify(&SessionId::new("s-2"), "tok-1")
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::WrongSession);
    }

    #[tokio::test]
    async fn test_revoked_token_stops_working() {
        let roster = RosterIdentityVerifier::new();
        roster.enroll(SessionId::new("s-1"), "tok-1", identity());
        roster.revoke("tok-1");

        let err = roster
            .verify(&SessionId::new("s-1"), "tok-1")
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::UnknownToken);
    }
}
