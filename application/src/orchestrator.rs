//! Session orchestrator
//!
//! Top-level dispatcher over the store, presence tracker, pipeline, and
//! broadcast hub. Every inbound action is validated against the acting
//! participant's role, applied under the session's lock, and its event is
//! published from inside that critical section — commit and publish are one
//! atomic step per session, which is what keeps the event stream gapless and
//! in order. Failures never publish anything.

use crate::broadcast::{BroadcastHub, EventStream};
use crate::pipeline::FacilitationPipeline;
use crate::ports::archive::SessionArchive;
use crate::ports::identity::{IdentityError, IdentityVerifier, VerifiedIdentity};
use crate::presence::PresenceTracker;
use crate::store::SessionStateStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storm_domain::{
    ArtifactKind, ChatMessage, ConnectionId, EventKind, IdeaId, IdeaRecord, ParticipantId,
    QuorumPolicy, RankedIdea, Role, Session, SessionError, SessionId, SessionSnapshot, Stage,
};
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Hard cap applied to client-supplied vote weights.
pub const DEFAULT_MAX_VOTE_WEIGHT: u32 = 3;

/// Result of a successful join: who the connection acts as, plus the ordered
/// event stream (replayed from `last_seen` on a reconnect).
#[derive(Debug)]
pub struct JoinAccept {
    pub participant: ParticipantId,
    pub display_name: String,
    pub role: Role,
    pub stream: EventStream,
}

enum AdvanceOutcome {
    /// Stale from-index: duplicate or out-of-date request, nothing changed.
    NoOp(Stage),
    Entered(Stage),
    /// Advance past the final stage concludes the session.
    Conclude,
}

/// Composes the session components into the inbound action surface.
///
/// Cheap to clone; clones share every underlying component.
#[derive(Clone)]
pub struct SessionOrchestrator {
    store: Arc<SessionStateStore>,
    hub: Arc<BroadcastHub>,
    presence: Arc<PresenceTracker>,
    pipeline: FacilitationPipeline,
    identity: Arc<dyn IdentityVerifier>,
    archive: Arc<dyn SessionArchive>,
    max_vote_weight: u32,
}

impl SessionOrchestrator {
    pub fn new(
        store: Arc<SessionStateStore>,
        hub: Arc<BroadcastHub>,
        presence: Arc<PresenceTracker>,
        pipeline: FacilitationPipeline,
        identity: Arc<dyn IdentityVerifier>,
        archive: Arc<dyn SessionArchive>,
    ) -> Self {
        Self {
            store,
            hub,
            presence,
            pipeline,
            identity,
            archive,
            max_vote_weight: DEFAULT_MAX_VOTE_WEIGHT,
        }
    }

    pub fn with_max_vote_weight(mut self, cap: u32) -> Self {
        self.max_vote_weight = cap.max(1);
        self
    }

    /// Create a session and start generating its agenda.
    pub fn create_session(
        &self,
        organizer: VerifiedIdentity,
        title: &str,
        objective: Option<String>,
        quorum: QuorumPolicy,
    ) -> Result<SessionId, SessionError> {
        if !organizer.role.is_organizer() {
            return Err(SessionError::Forbidden(
                "only an organizer can create a session".to_string(),
            ));
        }
        let title = title.trim();
        if title.is_empty() {
            return Err(SessionError::Conflict("session title is empty".to_string()));
        }

        let session = Session::new(
            SessionId::generate(),
            organizer.participant,
            title,
            objective,
            quorum,
        );
        let opening_stage = session.stages().current();
        let id = self.store.insert(session);
        self.hub.register(id.clone());
        info!(session = %id, title, "session created");

        self.pipeline.spawn_stage_generation(id.clone(), opening_stage);
        Ok(id)
    }

    /// Join (or rejoin) a session.
    ///
    /// A reconnect with the same participant identity rebinds to the
    /// historical record and resyncs via replay from `last_seen`; it is not
    /// announced as a fresh join. When `last_seen` is beyond the replay
    /// window this fails with `SnapshotRequired`; fetch [`Self::snapshot`]
    /// and join again from its `event_seq`.
    pub async fn join(
        &self,
        session: &SessionId,
        conn: ConnectionId,
        token: &str,
        last_seen: Option<u64>,
    ) -> Result<JoinAccept, SessionError> {
        let identity = self.identity.verify(session, token).await.map_err(|err| {
            debug!(%session, error = %err, "join token rejected");
            match err {
                IdentityError::UnknownToken => {
                    SessionError::Forbidden("unknown or expired token".to_string())
                }
                IdentityError::WrongSession => {
                    SessionError::Forbidden("token is not valid for this session".to_string())
                }
            }
        })?;

        let accepted = identity.clone();
        self.store
            .apply(session, |s| {
                s.register_participant(
                    identity.participant.clone(),
                    identity.display_name.clone(),
                    identity.role,
                );
                let outcome = self.presence.bind(
                    conn.clone(),
                    session.clone(),
                    identity.participant.clone(),
                );
                if outcome.came_online {
                    self.hub.emit(
                        s,
                        EventKind::ParticipantJoined {
                            participant: identity.participant.clone(),
                            display_name: identity.display_name.clone(),
                            role: identity.role,
                        },
                    )?;
                }
                Ok(())
            })
            .await?;

        let stream = self.hub.subscribe(session, last_seen)?;
        Ok(JoinAccept {
            participant: accepted.participant,
            display_name: accepted.display_name,
            role: accepted.role,
            stream,
        })
    }

    /// Leave a session. Unknown connections are a no-op; leaving a concluded
    /// session just clears presence.
    pub async fn leave(&self, session: &SessionId, conn: &ConnectionId) -> Result<(), SessionError> {
        let result = self
            .store
            .apply(session, |s| {
                if let Some(unbound) = self.presence.unbind(conn) {
                    if unbound.went_offline {
                        self.hub.emit(
                            s,
                            EventKind::ParticipantLeft {
                                participant: unbound.participant,
                            },
                        )?;
                    }
                }
                Ok(())
            })
            .await;
        match result {
            Err(SessionError::Conflict(_)) => {
                self.presence.unbind(conn);
                Ok(())
            }
            other => other,
        }
    }

    /// Liveness ping for a connection.
    pub fn heartbeat(&self, conn: &ConnectionId) -> bool {
        self.presence.heartbeat(conn)
    }

    /// Post a chat message.
    pub async fn send_chat(
        &self,
        session: &SessionId,
        conn: &ConnectionId,
        text: &str,
    ) -> Result<ChatMessage, SessionError> {
        let actor = self.actor_for(session, conn)?;
        self.store
            .apply(session, |s| {
                let message = s.post_chat(actor.clone(), text)?;
                self.hub.emit(
                    s,
                    EventKind::ChatPosted {
                        message: message.clone(),
                    },
                )?;
                Ok(message)
            })
            .await
    }

    /// Submit an idea. Observers cannot contribute.
    pub async fn submit_idea(
        &self,
        session: &SessionId,
        conn: &ConnectionId,
        text: &str,
    ) -> Result<IdeaRecord, SessionError> {
        let actor = self.actor_for(session, conn)?;
        self.store
            .apply(session, |s| {
                Self::require_contributor(s, &actor)?;
                let idea = s.submit_idea(actor.clone(), text)?;
                self.hub.emit(
                    s,
                    EventKind::IdeaSubmitted {
                        idea_id: idea.id.clone(),
                        author: idea.author.clone(),
                        content: idea.content.clone(),
                    },
                )?;
                Ok(idea)
            })
            .await
    }

    /// Cast (or move) a vote. Crossing quorum coverage auto-advances the
    /// voting stage.
    pub async fn cast_vote(
        &self,
        session: &SessionId,
        conn: &ConnectionId,
        idea: &IdeaId,
        weight: Option<u32>,
    ) -> Result<(), SessionError> {
        let actor = self.actor_for(session, conn)?;
        let weight = weight.unwrap_or(1).clamp(1, self.max_vote_weight);

        let advanced = self
            .store
            .apply(session, |s| {
                Self::require_contributor(s, &actor)?;
                s.cast_ballot(actor.clone(), idea.clone(), weight)?;
                self.hub.emit(
                    s,
                    EventKind::VoteCast {
                        participant: actor.clone(),
                        idea_id: idea.clone(),
                        weight,
                    },
                )?;

                if s.stages().current() == Stage::Voting && self.quorum_covered(s) {
                    info!(session = %s.id(), "voting quorum covered, advancing");
                    return Ok(self.advance_within(s)?);
                }
                Ok(None)
            })
            .await?;

        if let Some(stage) = advanced {
            self.after_advance(session, stage);
        }
        Ok(())
    }

    /// Current ranking of the session's ideas.
    pub async fn tally(&self, session: &SessionId) -> Result<Vec<RankedIdea>, SessionError> {
        self.store.read(session, |s| s.tally()).await
    }

    /// Organizer-only: move to the next stage.
    ///
    /// `from_index` is the stage index the caller believes is current.
    /// A stale index makes the call an idempotent no-op that returns the
    /// actual current stage, so duplicate client retries can never skip a
    /// stage or publish a second `StageAdvanced`.
    pub async fn advance_stage(
        &self,
        session: &SessionId,
        conn: &ConnectionId,
        from_index: usize,
    ) -> Result<Stage, SessionError> {
        let actor = self.actor_for(session, conn)?;
        let outcome = self
            .store
            .apply(session, |s| {
                Self::require_organizer(s, &actor)?;
                if s.stages().index() != from_index {
                    debug!(session = %s.id(), from_index, current = s.stages().index(),
                           "stale advance request ignored");
                    return Ok(AdvanceOutcome::NoOp(s.stages().current()));
                }
                match self.advance_within(s)? {
                    Some(stage) => Ok(AdvanceOutcome::Entered(stage)),
                    None => Ok(AdvanceOutcome::Conclude),
                }
            })
            .await?;

        match outcome {
            AdvanceOutcome::NoOp(stage) => Ok(stage),
            AdvanceOutcome::Entered(stage) => {
                self.after_advance(session, stage);
                Ok(stage)
            }
            AdvanceOutcome::Conclude => {
                let stage = self.store.read(session, |s| s.stages().current()).await?;
                self.conclude_session(session).await?;
                Ok(stage)
            }
        }
    }

    /// Organizer-only: retry the current stage's pending artifact.
    pub async fn retry_artifact(
        &self,
        session: &SessionId,
        conn: &ConnectionId,
        stage: Stage,
    ) -> Result<(), SessionError> {
        self.require_organizer_conn(session, conn).await?;
        self.pipeline.retry_stage(session, stage).await
    }

    /// Organizer-only: request an ad-hoc facilitation tip.
    pub async fn request_tip(
        &self,
        session: &SessionId,
        conn: &ConnectionId,
    ) -> Result<(), SessionError> {
        self.require_organizer_conn(session, conn).await?;
        self.pipeline
            .spawn_adhoc_generation(session.clone(), ArtifactKind::Tip);
        Ok(())
    }

    /// Organizer-only: request a nudge to re-energize the room.
    pub async fn request_nudge(
        &self,
        session: &SessionId,
        conn: &ConnectionId,
    ) -> Result<(), SessionError> {
        self.require_organizer_conn(session, conn).await?;
        self.pipeline
            .spawn_adhoc_generation(session.clone(), ArtifactKind::Nudge);
        Ok(())
    }

    /// Organizer-only: conclude the session now.
    pub async fn conclude(
        &self,
        session: &SessionId,
        conn: &ConnectionId,
    ) -> Result<(), SessionError> {
        self.require_organizer_conn(session, conn).await?;
        self.conclude_session(session).await
    }

    /// Full state snapshot: the resync fallback for clients beyond the
    /// replay window, and the record handed to the archive.
    pub async fn snapshot(&self, session: &SessionId) -> Result<SessionSnapshot, SessionError> {
        self.store.read(session, |s| s.snapshot()).await
    }

    /// Periodic liveness sweep; run as a background task.
    ///
    /// Connections that missed their heartbeat budget are dropped and their
    /// participants announced as left, exactly as an explicit leave would.
    pub async fn run_presence_sweeper(self, cancel: CancellationToken) {
        let interval = self.presence.policy().heartbeat_interval;
        loop {
            select! {
                _ = cancel.cancelled() => return,
                _ = sleep(interval) => {}
            }
            for unbound in self.presence.sweep(Instant::now()) {
                if !unbound.went_offline {
                    continue;
                }
                let result = self
                    .store
                    .apply(&unbound.session, |s| {
                        self.hub.emit(
                            s,
                            EventKind::ParticipantLeft {
                                participant: unbound.participant.clone(),
                            },
                        )
                    })
                    .await;
                match result {
                    Ok(()) => {
                        info!(session = %unbound.session, participant = %unbound.participant,
                              "participant timed out");
                    }
                    Err(SessionError::Conflict(_)) | Err(SessionError::NotFound(_)) => {}
                    Err(err) => {
                        warn!(session = %unbound.session, error = %err,
                              "failed to announce timed-out participant");
                    }
                }
            }
        }
    }

    // === internals ===

    /// Resolve which participant a connection acts as, for this session.
    fn actor_for(
        &self,
        session: &SessionId,
        conn: &ConnectionId,
    ) -> Result<ParticipantId, SessionError> {
        let (bound_session, participant) = self
            .presence
            .participant_for(conn)
            .ok_or_else(|| SessionError::Forbidden("connection is not joined".to_string()))?;
        if &bound_session != session {
            return Err(SessionError::Forbidden(
                "connection belongs to a different session".to_string(),
            ));
        }
        Ok(participant)
    }

    fn require_contributor(session: &Session, actor: &ParticipantId) -> Result<(), SessionError> {
        let role = session
            .role_of(actor)
            .ok_or_else(|| SessionError::NotFound(format!("participant {actor}")))?;
        if !role.may_contribute() {
            return Err(SessionError::Forbidden(
                "observers cannot contribute ideas or votes".to_string(),
            ));
        }
        Ok(())
    }

    fn require_organizer(session: &Session, actor: &ParticipantId) -> Result<(), SessionError> {
        let role = session
            .role_of(actor)
            .ok_or_else(|| SessionError::NotFound(format!("participant {actor}")))?;
        if !role.is_organizer() {
            return Err(SessionError::Forbidden(
                "only the organizer may do this".to_string(),
            ));
        }
        Ok(())
    }

    async fn require_organizer_conn(
        &self,
        session: &SessionId,
        conn: &ConnectionId,
    ) -> Result<ParticipantId, SessionError> {
        let actor = self.actor_for(session, conn)?;
        self.store
            .read(session, |s| Self::require_organizer(s, &actor))
            .await??;
        Ok(actor)
    }

    /// Advance the stage machine and publish `StageAdvanced`, inside the
    /// caller's critical section.
    fn advance_within(&self, s: &mut Session) -> Result<Option<Stage>, SessionError> {
        match s.advance_stage() {
            Some(stage) => {
                self.hub.emit(
                    s,
                    EventKind::StageAdvanced {
                        stage,
                        status: s.stages().status(),
                    },
                )?;
                Ok(Some(stage))
            }
            None => Ok(None),
        }
    }

    /// Post-commit work for an entered stage: artifact generation and, for
    /// the voting stage, the quorum window timer.
    fn after_advance(&self, session: &SessionId, stage: Stage) {
        self.pipeline
            .spawn_stage_generation(session.clone(), stage);
        if stage == Stage::Voting {
            self.spawn_quorum_window(session.clone());
        }
    }

    fn quorum_covered(&self, s: &Session) -> bool {
        let active: std::collections::HashSet<ParticipantId> = self
            .presence
            .active_participants(s.id())
            .into_iter()
            .filter(|p| s.role_of(p).is_some_and(|r| r.may_contribute()))
            .collect();
        s.quorum().coverage_reached(&active, s.ballots())
    }

    fn spawn_quorum_window(&self, session: SessionId) {
        let Ok(cancel) = self.store.cancel_token(&session) else {
            return;
        };
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let Ok(window_ms) = orchestrator
                .store
                .read(&session, |s| s.quorum().window_ms)
                .await
            else {
                return;
            };
            select! {
                _ = cancel.cancelled() => return,
                _ = sleep(Duration::from_millis(window_ms)) => {}
            }
            orchestrator.close_voting(&session).await;
        });
    }

    /// Window elapsed: leave the voting stage if it is still current.
    async fn close_voting(&self, session: &SessionId) {
        let advanced = self
            .store
            .apply(session, |s| {
                if s.stages().current() != Stage::Voting {
                    return Ok(None);
                }
                info!(session = %s.id(), "voting window elapsed, advancing");
                self.advance_within(s)
            })
            .await;
        match advanced {
            Ok(Some(stage)) => self.after_advance(session, stage),
            Ok(None) => {}
            Err(SessionError::Conflict(_)) | Err(SessionError::NotFound(_)) => {}
            Err(err) => warn!(%session, error = %err, "failed to close voting window"),
        }
    }

    /// Conclude: final event, cancel in-flight work, archive once, release.
    async fn conclude_session(&self, session: &SessionId) -> Result<(), SessionError> {
        let snapshot = self
            .store
            .apply(session, |s| {
                s.conclude();
                self.hub.emit(s, EventKind::SessionConcluded)?;
                Ok(s.snapshot())
            })
            .await?;

        if let Ok(token) = self.store.cancel_token(session) {
            token.cancel();
        }

        // the archive call happens outside any session lock
        match self.archive.archive(&snapshot).await {
            Ok(()) => {
                info!(%session, "session archived");
                self.store.remove(session);
            }
            Err(err) => {
                // keep the state in memory for manual recovery; the session
                // is concluded either way
                error!(%session, error = %err, "session archive failed");
            }
        }
        self.hub.drop_channel(session);
        Ok(())
    }
}
