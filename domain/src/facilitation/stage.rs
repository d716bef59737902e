//! Facilitation stages
//!
//! A workshop walks through a fixed sequence of stages. Some stages need
//! generated content before they are fully usable; those enter as `Pending`
//! and become `Ready` when their artifact commits, or `Degraded` when
//! generation is exhausted and static fallback content is used instead.

use super::artifact::ArtifactKind;
use serde::{Deserialize, Serialize};

/// A named phase of the facilitation pipeline, in running order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Agenda,
    Rules,
    Icebreaker,
    WorkingSession,
    Voting,
    Prioritization,
    Report,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Agenda,
        Stage::Rules,
        Stage::Icebreaker,
        Stage::WorkingSession,
        Stage::Voting,
        Stage::Prioritization,
        Stage::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Agenda => "agenda",
            Stage::Rules => "rules",
            Stage::Icebreaker => "icebreaker",
            Stage::WorkingSession => "working_session",
            Stage::Voting => "voting",
            Stage::Prioritization => "prioritization",
            Stage::Report => "report",
        }
    }

    /// The artifact kind generated on entry, if the stage needs one.
    ///
    /// Voting and Prioritization run on participant input alone.
    pub fn artifact_kind(&self) -> Option<ArtifactKind> {
        match self {
            Stage::Agenda => Some(ArtifactKind::Agenda),
            Stage::Rules => Some(ArtifactKind::Rules),
            Stage::Icebreaker => Some(ArtifactKind::Icebreaker),
            Stage::WorkingSession => Some(ArtifactKind::Task),
            Stage::Voting => None,
            Stage::Prioritization => None,
            Stage::Report => Some(ArtifactKind::Plan),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Readiness of the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Waiting for its artifact (or retryable after a failed attempt).
    Pending,
    /// Usable: artifact committed, or no artifact required.
    Ready,
    /// Generation exhausted; proceeding on fallback content.
    Degraded,
}

/// Per-session stage state machine.
///
/// Tracks the current stage index, its readiness, and how many generation
/// attempts the current stage has burned. Attempt bookkeeping resets on every
/// advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTrack {
    index: usize,
    status: StageStatus,
    attempts: u8,
}

impl StageTrack {
    /// Generation attempts allowed per stage before it degrades.
    pub const MAX_ATTEMPTS: u8 = 3;

    pub fn new() -> Self {
        Self {
            index: 0,
            status: initial_status(Stage::ALL[0]),
            attempts: 0,
        }
    }

    pub fn current(&self) -> Stage {
        Stage::ALL[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn status(&self) -> StageStatus {
        self.status
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == Stage::ALL.len()
    }

    /// Move to the next stage, resetting readiness and attempt count.
    ///
    /// Returns the newly entered stage, or `None` when already at the final
    /// stage (the session concludes instead).
    pub fn advance(&mut self) -> Option<Stage> {
        if self.is_last() {
            return None;
        }
        self.index += 1;
        let entered = self.current();
        self.status = initial_status(entered);
        self.attempts = 0;
        Some(entered)
    }

    /// Record a failed generation attempt for the current stage.
    ///
    /// Returns the total number of attempts consumed so far.
    pub fn record_failed_attempt(&mut self) -> u8 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= Self::MAX_ATTEMPTS
    }

    pub fn mark_ready(&mut self) {
        self.status = StageStatus::Ready;
    }

    pub fn mark_degraded(&mut self) {
        self.status = StageStatus::Degraded;
    }
}

impl Default for StageTrack {
    fn default() -> Self {
        Self::new()
    }
}

fn initial_status(stage: Stage) -> StageStatus {
    if stage.artifact_kind().is_some() {
        StageStatus::Pending
    } else {
        StageStatus::Ready
    }
}
