//! Context snapshot passed to the AI backend
//!
//! The generative backend is stateless: everything it appears to "remember"
//! about a session is carried in this snapshot, rebuilt from authoritative
//! state for every request. Keeping the snapshot small and explicit is what
//! rules out hidden cross-call state.

use super::stage::Stage;
use serde::{Deserialize, Serialize};

/// Point-in-time summary of a session, sized for a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub title: String,
    pub objective: Option<String>,
    pub stage: Stage,
    pub participant_count: usize,
    /// Idea texts, best-ranked first, capped at [`ContextSnapshot::MAX_IDEAS`].
    pub top_ideas: Vec<String>,
    /// Most recent chat lines, oldest first, capped at
    /// [`ContextSnapshot::MAX_CHAT_LINES`].
    pub recent_chat: Vec<String>,
}

impl ContextSnapshot {
    pub const MAX_IDEAS: usize = 10;
    pub const MAX_CHAT_LINES: usize = 10;

    pub fn new(
        title: impl Into<String>,
        objective: Option<String>,
        stage: Stage,
        participant_count: usize,
        top_ideas: Vec<String>,
        recent_chat: Vec<String>,
    ) -> Self {
        let mut top_ideas = top_ideas;
        top_ideas.truncate(Self::MAX_IDEAS);
        let mut recent_chat = recent_chat;
        if recent_chat.len() > Self::MAX_CHAT_LINES {
            recent_chat.drain(..recent_chat.len() - Self::MAX_CHAT_LINES);
        }
        Self {
            title: title.into(),
            objective,
            stage,
            participant_count,
            top_ideas,
            recent_chat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_caps_ideas_and_chat() {
        let ideas: Vec<String> = (0..20).map(|i| format!("idea {i}")).collect();
        let chat: Vec<String> = (0..20).map(|i| format!("line {i}")).collect();
        let snapshot = ContextSnapshot::new("t", None, Stage::WorkingSession, 4, ideas, chat);

        assert_eq!(snapshot.top_ideas.len(), ContextSnapshot::MAX_IDEAS);
        assert_eq!(snapshot.top_ideas[0], "idea 0");
        assert_eq!(snapshot.recent_chat.len(), ContextSnapshot::MAX_CHAT_LINES);
        // chat keeps the most recent lines
        assert_eq!(snapshot.recent_chat.last().unwrap(), "line 19");
    }
}
