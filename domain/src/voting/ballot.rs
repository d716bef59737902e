//! Ballots and the per-session ballot box
//!
//! Each participant holds at most one active ballot. Casting again replaces
//! the previous ballot wholesale: the prior weight is removed before the new
//! one applies, so a vote can move between ideas but never double-count.

use crate::core::id::{IdeaId, ParticipantId, now_millis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A participant's current vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    pub idea: IdeaId,
    pub weight: u32,
    pub cast_at: u64,
}

impl Ballot {
    pub fn new(idea: IdeaId, weight: u32) -> Self {
        Self {
            idea,
            weight,
            cast_at: now_millis(),
        }
    }
}

/// All active ballots of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BallotBox {
    ballots: HashMap<ParticipantId, Ballot>,
}

impl BallotBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cast or replace the participant's ballot.
    ///
    /// Returns the replaced ballot, if any.
    pub fn cast(&mut self, participant: ParticipantId, idea: IdeaId, weight: u32) -> Option<Ballot> {
        self.ballots.insert(participant, Ballot::new(idea, weight))
    }

    pub fn ballot(&self, participant: &ParticipantId) -> Option<&Ballot> {
        self.ballots.get(participant)
    }

    pub fn has_voted(&self, participant: &ParticipantId) -> bool {
        self.ballots.contains_key(participant)
    }

    pub fn voters(&self) -> impl Iterator<Item = &ParticipantId> {
        self.ballots.keys()
    }

    pub fn len(&self) -> usize {
        self.ballots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ballots.is_empty()
    }

    /// Total weight currently behind the given idea.
    pub fn weight_for(&self, idea: &IdeaId) -> u64 {
        self.ballots
            .values()
            .filter(|b| &b.idea == idea)
            .map(|b| b.weight as u64)
            .sum()
    }
}
