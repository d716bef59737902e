//! Session domain entities
//!
//! The [`Session`] aggregate owns everything that belongs to one live
//! workshop: participants, transcript, ideas, ballots, artifacts, and the
//! facilitation stage machine. It is only ever mutated under the state
//! store's per-session lock, so none of these methods need interior
//! synchronization; they encode invariants, not concurrency.

use crate::core::error::SessionError;
use crate::core::id::{IdeaId, MessageId, ParticipantId, SessionId, now_millis};
use crate::facilitation::artifact::{ArtifactKind, FacilitationArtifact};
use crate::facilitation::context::ContextSnapshot;
use crate::facilitation::stage::{Stage, StageStatus, StageTrack};
use crate::voting::ballot::{Ballot, BallotBox};
use crate::voting::idea::IdeaRecord;
use crate::voting::quorum::QuorumPolicy;
use crate::voting::tally::{RankedIdea, tally};
use serde::{Deserialize, Serialize};

/// What a participant is allowed to do in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Organizer,
    Member,
    Observer,
}

impl Role {
    pub fn is_organizer(&self) -> bool {
        matches!(self, Role::Organizer)
    }

    /// Observers follow along and may chat, but do not submit ideas or vote.
    pub fn may_contribute(&self) -> bool {
        !matches!(self, Role::Observer)
    }
}

/// Lifecycle of a session as a whole, coarser than the stage machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionLifecycle {
    Created,
    Lobby,
    Active,
    Voting,
    Concluded,
}

impl SessionLifecycle {
    pub fn is_concluded(&self) -> bool {
        matches!(self, SessionLifecycle::Concluded)
    }
}

/// A participant record. Created on first join and kept for the lifetime of
/// the session. Disconnecting removes presence, not this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub role: Role,
    pub joined_at: u64,
}

/// One chat message with its session-local sequence number.
///
/// Chat sequence numbers are strictly increasing and contiguous per session;
/// they are the ordering backbone for transcript replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: ParticipantId,
    pub sequence: u64,
    pub sent_at: u64,
    pub content: String,
}

/// One live workshop session (aggregate root).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    organizer: ParticipantId,
    title: String,
    objective: Option<String>,
    lifecycle: SessionLifecycle,
    stages: StageTrack,
    quorum: QuorumPolicy,
    participants: Vec<Participant>,
    transcript: Vec<ChatMessage>,
    chat_seq: u64,
    ideas: Vec<IdeaRecord>,
    ballots: BallotBox,
    artifacts: Vec<FacilitationArtifact>,
    event_seq: u64,
    voting_opened_at: Option<u64>,
    quarantined: bool,
    created_at: u64,
}

impl Session {
    pub fn new(
        id: SessionId,
        organizer: ParticipantId,
        title: impl Into<String>,
        objective: Option<String>,
        quorum: QuorumPolicy,
    ) -> Self {
        Self {
            id,
            organizer,
            title: title.into(),
            objective,
            lifecycle: SessionLifecycle::Created,
            stages: StageTrack::new(),
            quorum,
            participants: Vec::new(),
            transcript: Vec::new(),
            chat_seq: 0,
            ideas: Vec::new(),
            ballots: BallotBox::new(),
            artifacts: Vec::new(),
            event_seq: 0,
            voting_opened_at: None,
            quarantined: false,
            created_at: now_millis(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn organizer(&self) -> &ParticipantId {
        &self.organizer
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn objective(&self) -> Option<&str> {
        self.objective.as_deref()
    }

    pub fn lifecycle(&self) -> SessionLifecycle {
        self.lifecycle
    }

    pub fn stages(&self) -> &StageTrack {
        &self.stages
    }

    pub fn stages_mut(&mut self) -> &mut StageTrack {
        &mut self.stages
    }

    pub fn quorum(&self) -> QuorumPolicy {
        self.quorum
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn ideas(&self) -> &[IdeaRecord] {
        &self.ideas
    }

    pub fn ballots(&self) -> &BallotBox {
        &self.ballots
    }

    pub fn artifacts(&self) -> &[FacilitationArtifact] {
        &self.artifacts
    }

    pub fn voting_opened_at(&self) -> Option<u64> {
        self.voting_opened_at
    }

    pub fn is_quarantined(&self) -> bool {
        self.quarantined
    }

    /// Mark the session as unsafe for further writes after an invariant
    /// violation. Cleared only by manual intervention, never in code.
    pub fn quarantine(&mut self) {
        self.quarantined = true;
    }

    /// Next event sequence number. Sequences start at 1 and are contiguous;
    /// callers must publish every number they draw.
    pub fn next_event_seq(&mut self) -> u64 {
        self.event_seq += 1;
        self.event_seq
    }

    pub fn last_event_seq(&self) -> u64 {
        self.event_seq
    }

    /// Add a participant record, or recognize a returning one.
    ///
    /// Returns `true` when the participant is new to this session. A
    /// returning participant keeps their original record (the transcript
    /// references it), so reconnects do not produce duplicates.
    pub fn register_participant(
        &mut self,
        id: ParticipantId,
        display_name: impl Into<String>,
        role: Role,
    ) -> bool {
        if self.participants.iter().any(|p| p.id == id) {
            return false;
        }
        self.participants.push(Participant {
            id,
            display_name: display_name.into(),
            role,
            joined_at: now_millis(),
        });
        if self.lifecycle == SessionLifecycle::Created {
            self.lifecycle = SessionLifecycle::Lobby;
        }
        true
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub fn role_of(&self, id: &ParticipantId) -> Option<Role> {
        self.participant(id).map(|p| p.role)
    }

    /// Append a chat message, assigning the next contiguous chat sequence.
    pub fn post_chat(
        &mut self,
        sender: ParticipantId,
        content: impl Into<String>,
    ) -> Result<ChatMessage, SessionError> {
        if self.participant(&sender).is_none() {
            return Err(SessionError::NotFound(format!(
                "participant {sender} is not in session {}",
                self.id
            )));
        }
        self.chat_seq += 1;
        let message = ChatMessage {
            id: MessageId::generate(),
            sender,
            sequence: self.chat_seq,
            sent_at: now_millis(),
            content: content.into(),
        };
        self.transcript.push(message.clone());
        Ok(message)
    }

    /// Record a new idea. Content is trimmed; empty submissions are
    /// rejected.
    pub fn submit_idea(
        &mut self,
        author: ParticipantId,
        content: &str,
    ) -> Result<IdeaRecord, SessionError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SessionError::Conflict("idea text is empty".to_string()));
        }
        if self.participant(&author).is_none() {
            return Err(SessionError::NotFound(format!(
                "participant {author} is not in session {}",
                self.id
            )));
        }
        let idea = IdeaRecord::new(author, content);
        self.ideas.push(idea.clone());
        Ok(idea)
    }

    pub fn idea(&self, id: &IdeaId) -> Option<&IdeaRecord> {
        self.ideas.iter().find(|i| &i.id == id)
    }

    /// Cast (or move) a participant's ballot.
    pub fn cast_ballot(
        &mut self,
        participant: ParticipantId,
        idea: IdeaId,
        weight: u32,
    ) -> Result<Option<Ballot>, SessionError> {
        if self.idea(&idea).is_none() {
            return Err(SessionError::NotFound(format!("idea {idea} does not exist")));
        }
        if self.participant(&participant).is_none() {
            return Err(SessionError::NotFound(format!(
                "participant {participant} is not in session {}",
                self.id
            )));
        }
        Ok(self.ballots.cast(participant, idea, weight))
    }

    /// Current ranking, recomputed from ideas and ballots.
    pub fn tally(&self) -> Vec<RankedIdea> {
        tally(&self.ideas, &self.ballots)
    }

    /// Attach an artifact. The latest artifact of a kind supersedes earlier
    /// ones; nothing is removed, superseded artifacts stay in history.
    pub fn attach_artifact(&mut self, artifact: FacilitationArtifact) {
        self.artifacts.push(artifact);
    }

    /// The currently effective artifact of the given kind.
    pub fn latest_artifact(&self, kind: ArtifactKind) -> Option<&FacilitationArtifact> {
        self.artifacts.iter().rev().find(|a| a.kind == kind)
    }

    /// Advance the stage machine and keep the coarse lifecycle in step.
    ///
    /// Returns the entered stage, or `None` when the final stage was already
    /// current (the caller concludes the session instead).
    pub fn advance_stage(&mut self) -> Option<Stage> {
        let entered = self.stages.advance()?;
        self.lifecycle = match entered {
            Stage::Voting => {
                self.voting_opened_at = Some(now_millis());
                SessionLifecycle::Voting
            }
            _ => SessionLifecycle::Active,
        };
        Some(entered)
    }

    pub fn conclude(&mut self) {
        self.lifecycle = SessionLifecycle::Concluded;
    }

    /// Build the AI context for the current state. Rebuilt per request;
    /// the generative backend holds no memory of its own.
    pub fn snapshot_context(&self) -> ContextSnapshot {
        let top_ideas = self
            .tally()
            .into_iter()
            .map(|r| r.idea.content)
            .collect::<Vec<_>>();
        let recent_chat = self
            .transcript
            .iter()
            .rev()
            .take(ContextSnapshot::MAX_CHAT_LINES)
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        ContextSnapshot::new(
            self.title.clone(),
            self.objective.clone(),
            self.stages.current(),
            self.participants.len(),
            top_ideas,
            recent_chat,
        )
    }
}

/// Serializable point-in-time copy of a session, used for the archive
/// hand-off at conclusion and as the full-state fallback when a
/// reconnecting client is beyond the replay window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub title: String,
    pub objective: Option<String>,
    pub organizer: ParticipantId,
    pub lifecycle: SessionLifecycle,
    pub stage: Stage,
    pub stage_status: StageStatus,
    pub participants: Vec<Participant>,
    pub transcript: Vec<ChatMessage>,
    pub ranking: Vec<RankedIdea>,
    pub artifacts: Vec<FacilitationArtifact>,
    /// Sequence of the last event published; resubscribe from here.
    pub event_seq: u64,
    pub taken_at: u64,
}

impl Session {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            title: self.title.clone(),
            objective: self.objective.clone(),
            organizer: self.organizer.clone(),
            lifecycle: self.lifecycle,
            stage: self.stages.current(),
            stage_status: self.stages.status(),
            participants: self.participants.clone(),
            transcript: self.transcript.clone(),
            ranking: self.tally(),
            artifacts: self.artifacts.clone(),
            event_seq: self.event_seq,
            taken_at: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let mut s = Session::new(
            SessionId::new("s-1"),
            ParticipantId::new("org"),
            "Quarterly retro",
            Some("What should we change".to_string()),
            QuorumPolicy::default(),
        );
        s.register_participant(ParticipantId::new("org"), "Dana", Role::Organizer);
        s.register_participant(ParticipantId::new("alice"), "Alice", Role::Member);
        s
    }

    #[test]
    fn test_first_join_moves_created_to_lobby() {
        let mut s = Session::new(
            SessionId::new("s-1"),
            ParticipantId::new("org"),
            "t",
            None,
            QuorumPolicy::default(),
        );
        assert_eq!(s.lifecycle(), SessionLifecycle::Created);
        assert!(s.register_participant(ParticipantId::new("org"), "Dana", Role::Organizer));
        assert_eq!(s.lifecycle(), SessionLifecycle::Lobby);
    }

    #[test]
    fn test_returning_participant_is_not_duplicated() {
        let mut s = session();
        assert!(!s.register_participant(ParticipantId::new("alice"), "Alice", Role::Member));
        assert_eq!(s.participants().len(), 2);
    }

    #[test]
    fn test_chat_sequence_is_contiguous() {
        let mut s = session();
        let m1 = s.post_chat(ParticipantId::new("alice"), "hello").unwrap();
        let m2 = s.post_chat(ParticipantId::new("org"), "hi").unwrap();
        let m3 = s.post_chat(ParticipantId::new("alice"), "ready?").unwrap();
        assert_eq!((m1.sequence, m2.sequence, m3.sequence), (1, 2, 3));
    }

    #[test]
    fn test_chat_from_stranger_is_rejected() {
        let mut s = session();
        let err = s.post_chat(ParticipantId::new("ghost"), "boo").unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[test]
    fn test_empty_idea_is_rejected() {
        let mut s = session();
        let err = s.submit_idea(ParticipantId::new("alice"), "   ").unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));
    }

    #[test]
    fn test_vote_on_unknown_idea_is_not_found() {
        let mut s = session();
        let err = s
            .cast_ballot(ParticipantId::new("alice"), IdeaId::new("nope"), 1)
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[test]
    fn test_event_seq_starts_at_one_and_increments() {
        let mut s = session();
        assert_eq!(s.last_event_seq(), 0);
        assert_eq!(s.next_event_seq(), 1);
        assert_eq!(s.next_event_seq(), 2);
        assert_eq!(s.last_event_seq(), 2);
    }

    #[test]
    fn test_latest_artifact_supersedes() {
        let mut s = session();
        s.attach_artifact(FacilitationArtifact::generated(
            ArtifactKind::Agenda,
            "v1",
            crate::core::id::RequestId::new("r1"),
        ));
        s.attach_artifact(FacilitationArtifact::generated(
            ArtifactKind::Agenda,
            "v2",
            crate::core::id::RequestId::new("r2"),
        ));
        assert_eq!(s.latest_artifact(ArtifactKind::Agenda).unwrap().content, "v2");
        assert_eq!(s.artifacts().len(), 2);
    }

    #[test]
    fn test_advance_into_voting_sets_lifecycle_and_clock() {
        let mut s = session();
        // agenda -> rules -> icebreaker -> working_session -> voting
        for _ in 0..3 {
            s.advance_stage();
        }
        assert_eq!(s.lifecycle(), SessionLifecycle::Active);
        assert!(s.voting_opened_at().is_none());

        let entered = s.advance_stage();
        assert_eq!(entered, Some(Stage::Voting));
        assert_eq!(s.lifecycle(), SessionLifecycle::Voting);
        assert!(s.voting_opened_at().is_some());
    }

    #[test]
    fn test_snapshot_carries_ranking_and_seq() {
        let mut s = session();
        let idea = s.submit_idea(ParticipantId::new("alice"), "try mob reviews").unwrap();
        s.cast_ballot(ParticipantId::new("org"), idea.id.clone(), 1)
            .unwrap();
        s.next_event_seq();

        let snapshot = s.snapshot();
        assert_eq!(snapshot.event_seq, 1);
        assert_eq!(snapshot.ranking.len(), 1);
        assert_eq!(snapshot.ranking[0].total_weight, 1);
    }
}
