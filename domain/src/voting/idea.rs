//! Idea records

use crate::core::id::{IdeaId, ParticipantId, now_millis};
use serde::{Deserialize, Serialize};

/// One submitted idea.
///
/// Content is immutable after submission. The vote tally and rank are
/// derived at read time and never stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaRecord {
    pub id: IdeaId,
    pub author: ParticipantId,
    pub content: String,
    pub submitted_at: u64,
}

impl IdeaRecord {
    pub fn new(author: ParticipantId, content: impl Into<String>) -> Self {
        Self {
            id: IdeaId::generate(),
            author,
            content: content.into(),
            submitted_at: now_millis(),
        }
    }

    /// Construct with explicit id and timestamp. Used for replays and tests
    /// where ordering must be controlled.
    pub fn with_parts(
        id: IdeaId,
        author: ParticipantId,
        content: impl Into<String>,
        submitted_at: u64,
    ) -> Self {
        Self {
            id,
            author,
            content: content.into(),
            submitted_at,
        }
    }
}
