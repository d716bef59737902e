//! Voting quorum policy
//!
//! Voting completes when every active contributor has a ballot in, or when
//! the organizer-configured window runs out, whichever comes first.
//! Crossing quorum is what auto-advances the pipeline out of the voting
//! stage.

use super::ballot::BallotBox;
use crate::core::id::ParticipantId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// When is voting considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumPolicy {
    /// Time window for the voting stage, in milliseconds.
    pub window_ms: u64,
}

impl QuorumPolicy {
    pub fn new(window_ms: u64) -> Self {
        Self { window_ms }
    }

    /// Full coverage: every active contributor has cast at least one ballot.
    ///
    /// An empty contributor set never satisfies quorum; a room nobody is in
    /// cannot finish voting.
    pub fn coverage_reached(
        &self,
        active_contributors: &HashSet<ParticipantId>,
        ballots: &BallotBox,
    ) -> bool {
        if active_contributors.is_empty() {
            return false;
        }
        active_contributors.iter().all(|p| ballots.has_voted(p))
    }

    /// Combined rule: coverage or elapsed window.
    pub fn is_satisfied(
        &self,
        active_contributors: &HashSet<ParticipantId>,
        ballots: &BallotBox,
        elapsed_ms: u64,
    ) -> bool {
        self.coverage_reached(active_contributors, ballots) || elapsed_ms >= self.window_ms
    }
}

impl Default for QuorumPolicy {
    /// 5 minutes.
    fn default() -> Self {
        Self {
            window_ms: 5 * 60 * 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::id::IdeaId;

    fn contributors(ids: &[&str]) -> HashSet<ParticipantId> {
        ids.iter().map(|s| ParticipantId::new(*s)).collect()
    }

    #[test]
    fn test_coverage_requires_every_active_contributor() {
        let policy = QuorumPolicy::default();
        let active = contributors(&["alice", "bob"]);
        let mut ballots = BallotBox::new();
        ballots.cast(ParticipantId::new("alice"), IdeaId::new("x"), 1);

        assert!(!policy.coverage_reached(&active, &ballots));
        ballots.cast(ParticipantId::new("bob"), IdeaId::new("x"), 1);
        assert!(policy.coverage_reached(&active, &ballots));
    }

    #[test]
    fn test_empty_room_never_reaches_coverage() {
        let policy = QuorumPolicy::default();
        assert!(!policy.coverage_reached(&HashSet::new(), &BallotBox::new()));
    }

    #[test]
    fn test_window_elapse_satisfies_quorum() {
        let policy = QuorumPolicy::new(1000);
        let active = contributors(&["alice"]);
        let ballots = BallotBox::new();

        assert!(!policy.is_satisfied(&active, &ballots, 999));
        assert!(policy.is_satisfied(&active, &ballots, 1000));
    }
}
