//! Idea ranking
//!
//! Ranking rule: total vote weight descending, then earlier submission
//! first, then idea id. The last key makes the order total, so repeated
//! tallies over unchanged state are identical.

use super::ballot::BallotBox;
use super::idea::IdeaRecord;
use serde::{Deserialize, Serialize};

/// One idea with its derived standing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedIdea {
    pub idea: IdeaRecord,
    pub total_weight: u64,
    /// 1-based position in the ranking.
    pub rank: usize,
}

/// Rank all ideas of a session.
pub fn tally(ideas: &[IdeaRecord], ballots: &BallotBox) -> Vec<RankedIdea> {
    let mut ranked: Vec<RankedIdea> = ideas
        .iter()
        .map(|idea| RankedIdea {
            total_weight: ballots.weight_for(&idea.id),
            idea: idea.clone(),
            rank: 0,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total_weight
            .cmp(&a.total_weight)
            .then(a.idea.submitted_at.cmp(&b.idea.submitted_at))
            .then(a.idea.id.cmp(&b.idea.id))
    });

    for (position, entry) in ranked.iter_mut().enumerate() {
        entry.rank = position + 1;
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::id::{IdeaId, ParticipantId};

    fn idea(id: &str, at: u64) -> IdeaRecord {
        IdeaRecord::with_parts(
            IdeaId::new(id),
            ParticipantId::new("author"),
            format!("idea {id}"),
            at,
        )
    }

    #[test]
    fn test_higher_weight_ranks_first() {
        let ideas = vec![idea("a", 0), idea("b", 1)];
        let mut ballots = BallotBox::new();
        ballots.cast(ParticipantId::new("p1"), IdeaId::new("b"), 2);
        ballots.cast(ParticipantId::new("p2"), IdeaId::new("a"), 1);

        let ranked = tally(&ideas, &ballots);
        assert_eq!(ranked[0].idea.id, IdeaId::new("b"));
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].idea.id, IdeaId::new("a"));
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn test_tie_breaks_by_earlier_submission() {
        let ideas = vec![idea("late", 100), idea("early", 5)];
        let mut ballots = BallotBox::new();
        ballots.cast(ParticipantId::new("p1"), IdeaId::new("late"), 1);
        ballots.cast(ParticipantId::new("p2"), IdeaId::new("early"), 1);

        let ranked = tally(&ideas, &ballots);
        assert_eq!(ranked[0].idea.id, IdeaId::new("early"));
        assert_eq!(ranked[1].idea.id, IdeaId::new("late"));
    }

    #[test]
    fn test_residual_tie_breaks_by_id() {
        let ideas = vec![idea("b", 7), idea("a", 7)];
        let ballots = BallotBox::new();

        let ranked = tally(&ideas, &ballots);
        assert_eq!(ranked[0].idea.id, IdeaId::new("a"));
        assert_eq!(ranked[1].idea.id, IdeaId::new("b"));
    }

    #[test]
    fn test_tally_is_deterministic_across_calls() {
        let ideas = vec![idea("a", 1), idea("b", 1), idea("c", 2)];
        let mut ballots = BallotBox::new();
        ballots.cast(ParticipantId::new("p1"), IdeaId::new("c"), 1);

        let first = tally(&ideas, &ballots);
        let second = tally(&ideas, &ballots);
        assert_eq!(first, second);
    }
}
