//! Session events
//!
//! A [`SessionEvent`] is the unit delivered to every subscribed connection.
//! Sequence numbers are drawn from the owning session under its lock and are
//! strictly increasing with no gaps; total order holds within a session and
//! nothing is promised across sessions.

use super::entities::{ChatMessage, Role};
use crate::core::id::{IdeaId, ParticipantId, SessionId, now_millis};
use crate::facilitation::artifact::{ArtifactKind, FacilitationArtifact};
use crate::facilitation::stage::{Stage, StageStatus};
use serde::{Deserialize, Serialize};

/// Envelope broadcast to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub sequence: u64,
    pub session: SessionId,
    pub timestamp: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl SessionEvent {
    pub fn new(session: SessionId, sequence: u64, kind: EventKind) -> Self {
        Self {
            sequence,
            session,
            timestamp: now_millis(),
            kind,
        }
    }
}

/// Everything that can happen in a session, with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    ParticipantJoined {
        participant: ParticipantId,
        display_name: String,
        role: Role,
    },
    ParticipantLeft {
        participant: ParticipantId,
    },
    ChatPosted {
        message: ChatMessage,
    },
    IdeaSubmitted {
        idea_id: IdeaId,
        author: ParticipantId,
        content: String,
    },
    VoteCast {
        participant: ParticipantId,
        idea_id: IdeaId,
        weight: u32,
    },
    StageAdvanced {
        stage: Stage,
        status: StageStatus,
    },
    ArtifactGenerated {
        artifact: FacilitationArtifact,
    },
    ArtifactFailed {
        artifact_kind: ArtifactKind,
        reason: String,
        /// True when attempts are exhausted and fallback content follows.
        degraded: bool,
    },
    SessionConcluded,
}

impl EventKind {
    /// Stable name, for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ParticipantJoined { .. } => "participant_joined",
            EventKind::ParticipantLeft { .. } => "participant_left",
            EventKind::ChatPosted { .. } => "chat_posted",
            EventKind::IdeaSubmitted { .. } => "idea_submitted",
            EventKind::VoteCast { .. } => "vote_cast",
            EventKind::StageAdvanced { .. } => "stage_advanced",
            EventKind::ArtifactGenerated { .. } => "artifact_generated",
            EventKind::ArtifactFailed { .. } => "artifact_failed",
            EventKind::SessionConcluded => "session_concluded",
        }
    }
}
