//! Facilitation artifacts
//!
//! An artifact is one piece of AI-generated facilitation content attached to
//! a session: an agenda proposal, ground rules, an icebreaker, a working
//! task, a tip, a nudge, or the closing action plan. Artifacts are immutable
//! once created; regenerating replaces nothing in place, it appends a newer
//! artifact of the same kind which supersedes the older one.

use crate::core::id::{RequestId, now_millis};
use serde::{Deserialize, Serialize};

/// The family an artifact belongs to.
///
/// Stage-bound kinds (`Agenda`, `Rules`, `Icebreaker`, `Task`, `Plan`) are
/// generated when their stage is entered. `Tip` and `Nudge` are ad hoc
/// facilitation aids the organizer can request during the working session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Agenda,
    Plan,
    Rules,
    Icebreaker,
    Tip,
    Task,
    Nudge,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Agenda => "agenda",
            ArtifactKind::Plan => "plan",
            ArtifactKind::Rules => "rules",
            ArtifactKind::Icebreaker => "icebreaker",
            ArtifactKind::Tip => "tip",
            ArtifactKind::Task => "task",
            ArtifactKind::Nudge => "nudge",
        }
    }

    /// Static content used when generation is exhausted and the stage
    /// proceeds degraded.
    pub fn fallback_content(&self) -> &'static str {
        match self {
            ArtifactKind::Agenda => {
                "- Welcome and objective recap (5 min)\n\
                 - Idea generation (20 min)\n\
                 - Discussion and voting (15 min)\n\
                 - Prioritization and next steps (10 min)"
            }
            ArtifactKind::Plan => {
                "Review the top-ranked ideas with their owners and agree on \
                 one concrete next step per idea before closing."
            }
            ArtifactKind::Rules => {
                "1. One conversation at a time.\n\
                 2. Defer judgement while ideas are being collected.\n\
                 3. Build on the ideas of others.\n\
                 4. Stay on topic; park side discussions."
            }
            ArtifactKind::Icebreaker => {
                "In one sentence, share the most surprising thing you learned \
                 this week."
            }
            ArtifactKind::Tip => {
                "Quantity breeds quality: aim for many rough ideas before \
                 polishing any single one."
            }
            ArtifactKind::Task => {
                "Individually write down as many ideas addressing the \
                 workshop objective as you can. Short phrases are enough."
            }
            ArtifactKind::Nudge => {
                "A few voices have gone quiet. Take a minute and add at least \
                 one more idea, however rough."
            }
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One generated (or fallback) facilitation artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilitationArtifact {
    pub kind: ArtifactKind,
    pub content: String,
    pub generated_at: u64,
    /// Id of the gateway request that produced this artifact. Fallback
    /// artifacts carry the id of the final failed request.
    pub request: RequestId,
    /// True when this is static fallback content rather than generated text.
    pub fallback: bool,
}

impl FacilitationArtifact {
    pub fn generated(kind: ArtifactKind, content: impl Into<String>, request: RequestId) -> Self {
        Self {
            kind,
            content: content.into(),
            generated_at: now_millis(),
            request,
            fallback: false,
        }
    }

    pub fn fallback(kind: ArtifactKind, request: RequestId) -> Self {
        Self {
            kind,
            content: kind.fallback_content().to_string(),
            generated_at: now_millis(),
            request,
            fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_artifact_is_flagged() {
        let artifact = FacilitationArtifact::fallback(ArtifactKind::Rules, RequestId::new("r-1"));
        assert!(artifact.fallback);
        assert_eq!(artifact.kind, ArtifactKind::Rules);
        assert_eq!(artifact.content, ArtifactKind::Rules.fallback_content());
    }

    #[test]
    fn test_generated_artifact() {
        let artifact = FacilitationArtifact::generated(
            ArtifactKind::Agenda,
            "1. Kickoff",
            RequestId::new("r-2"),
        );
        assert!(!artifact.fallback);
        assert_eq!(artifact.content, "1. Kickoff");
    }

    #[test]
    fn test_kind_serde_shape() {
        let json = serde_json::to_string(&ArtifactKind::Icebreaker).unwrap();
        assert_eq!(json, "\"icebreaker\"");
    }
}
