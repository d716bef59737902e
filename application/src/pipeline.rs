//! Facilitation pipeline
//!
//! Drives artifact generation around the stage machine. Stage entry and
//! organizer retries spawn a background generation task; the task snapshots
//! context under the session lock, releases it for the entire gateway
//! exchange, and re-acquires it only to commit the outcome. A session that
//! concludes while a generation is in flight cancels it and the result is
//! discarded, never committed.

use crate::broadcast::BroadcastHub;
use crate::gateway::ArtifactBroker;
use crate::store::SessionStateStore;
use std::sync::Arc;
use storm_domain::{
    ArtifactKind, EventKind, FacilitationArtifact, SessionError, SessionId, Stage, StageStatus,
};
use tokio::select;
use tracing::{debug, info, warn};

/// What caused a generation, which decides how failures are bookkept.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Trigger {
    /// Entering (or retrying) the given stage. Failures burn stage attempts
    /// and can degrade the stage.
    Stage(Stage),
    /// Organizer-requested tip or nudge. Failures are announced and
    /// forgotten.
    AdHoc,
}

/// Sequences stages and coordinates their artifact requests.
///
/// Cheap to clone; clones share the same store, hub, and broker.
#[derive(Clone)]
pub struct FacilitationPipeline {
    store: Arc<SessionStateStore>,
    hub: Arc<BroadcastHub>,
    broker: Arc<ArtifactBroker>,
}

impl FacilitationPipeline {
    pub fn new(
        store: Arc<SessionStateStore>,
        hub: Arc<BroadcastHub>,
        broker: Arc<ArtifactBroker>,
    ) -> Self {
        Self { store, hub, broker }
    }

    /// Kick off generation for a freshly entered stage, if it needs content.
    pub fn spawn_stage_generation(&self, session: SessionId, stage: Stage) {
        if let Some(kind) = stage.artifact_kind() {
            let pipeline = self.clone();
            tokio::spawn(async move {
                pipeline.run_generation(session, kind, Trigger::Stage(stage)).await;
            });
        }
    }

    /// Kick off an ad-hoc tip or nudge generation.
    pub fn spawn_adhoc_generation(&self, session: SessionId, kind: ArtifactKind) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.run_generation(session, kind, Trigger::AdHoc).await;
        });
    }

    /// Organizer retry for the current stage's pending artifact.
    ///
    /// Validated against current state: the stage must still be current and
    /// still waiting. Two racing retries may both pass this check; the
    /// broker deduplicates them into one provider call.
    pub async fn retry_stage(&self, session: &SessionId, stage: Stage) -> Result<(), SessionError> {
        let kind = stage.artifact_kind().ok_or_else(|| {
            SessionError::Conflict(format!("stage {stage} has no generated artifact"))
        })?;
        self.store
            .apply(session, |s| {
                if s.stages().current() != stage {
                    return Err(SessionError::Conflict(format!(
                        "stage {stage} is not current"
                    )));
                }
                if s.stages().status() != StageStatus::Pending {
                    return Err(SessionError::Conflict(format!(
                        "stage {stage} is not awaiting an artifact"
                    )));
                }
                Ok(())
            })
            .await?;

        info!(%session, %stage, "organizer retry for stage artifact");
        let pipeline = self.clone();
        let session = session.clone();
        tokio::spawn(async move {
            pipeline.run_generation(session, kind, Trigger::Stage(stage)).await;
        });
        Ok(())
    }

    async fn run_generation(self, session: SessionId, kind: ArtifactKind, trigger: Trigger) {
        let Ok(cancel) = self.store.cancel_token(&session) else {
            return;
        };
        let Ok(context) = self.store.read(&session, |s| s.snapshot_context()).await else {
            return;
        };

        // the session lock is NOT held while the gateway call runs
        let outcome = select! {
            _ = cancel.cancelled() => {
                debug!(%session, kind = %kind, "generation cancelled with its session");
                return;
            }
            outcome = self.broker.generate(&session, kind, context) => outcome,
        };

        let commit = self
            .store
            .apply(&session, |s| {
                match &outcome {
                    Ok(artifact) => {
                        s.attach_artifact(artifact.clone());
                        if let Trigger::Stage(stage) = trigger {
                            if s.stages().current() == stage {
                                s.stages_mut().mark_ready();
                            }
                        }
                        self.hub.emit(
                            s,
                            EventKind::ArtifactGenerated {
                                artifact: artifact.clone(),
                            },
                        )
                    }
                    Err(err) => {
                        let reason = err.to_string();
                        match trigger {
                            Trigger::Stage(stage) if s.stages().current() == stage => {
                                s.stages_mut().record_failed_attempt();
                                if s.stages().attempts_exhausted() {
                                    s.stages_mut().mark_degraded();
                                    self.hub.emit(
                                        s,
                                        EventKind::ArtifactFailed {
                                            artifact_kind: kind,
                                            reason,
                                            degraded: true,
                                        },
                                    )?;
                                    // the stage proceeds on static content
                                    let fallback = FacilitationArtifact::fallback(
                                        kind,
                                        storm_domain::RequestId::generate(),
                                    );
                                    s.attach_artifact(fallback.clone());
                                    self.hub
                                        .emit(s, EventKind::ArtifactGenerated { artifact: fallback })
                                } else {
                                    self.hub.emit(
                                        s,
                                        EventKind::ArtifactFailed {
                                            artifact_kind: kind,
                                            reason,
                                            degraded: false,
                                        },
                                    )
                                }
                            }
                            _ => self.hub.emit(
                                s,
                                EventKind::ArtifactFailed {
                                    artifact_kind: kind,
                                    reason,
                                    degraded: false,
                                },
                            ),
                        }
                    }
                }
            })
            .await;

        match commit {
            Ok(()) => {}
            Err(SessionError::Conflict(_)) | Err(SessionError::NotFound(_)) => {
                // session concluded or was removed while we were generating;
                // the result is discarded per the cancellation contract
                debug!(%session, kind = %kind, "generation result discarded");
            }
            Err(err) => {
                warn!(%session, kind = %kind, error = %err, "failed to commit generation outcome");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BacklogPolicy;
    use crate::gateway::RetryPolicy;
    use crate::ports::artifact_gateway::{
        ArtifactGateway, GatewayError, GeneratedContent, GenerationRequest,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use storm_domain::{ParticipantId, QuorumPolicy, Session, StageTrack};
    use tokio::time::sleep;

    struct ScriptedGateway {
        delay: Duration,
        script: Mutex<VecDeque<Result<GeneratedContent, GatewayError>>>,
    }

    impl ScriptedGateway {
        fn new(delay: Duration, script: Vec<Result<GeneratedContent, GatewayError>>) -> Self {
            Self {
                delay,
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl ArtifactGateway for ScriptedGateway {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GeneratedContent, GatewayError> {
            sleep(self.delay).await;
            self.script
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(GeneratedContent {
                        content: "generated".to_string(),
                        provider_metadata: None,
                    })
                })
        }
    }

    struct Fixture {
        store: Arc<SessionStateStore>,
        hub: Arc<BroadcastHub>,
        pipeline: FacilitationPipeline,
        session: SessionId,
    }

    fn fixture(script: Vec<Result<GeneratedContent, GatewayError>>, delay: Duration) -> Fixture {
        let store = Arc::new(SessionStateStore::new());
        let hub = Arc::new(BroadcastHub::new(BacklogPolicy::default()));
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_millis(500),
            base_delay: Duration::from_millis(1),
            factor: 2,
            // one provider attempt per pipeline attempt keeps the
            // stage-attempt bookkeeping observable
            max_attempts: 1,
        };
        let broker = Arc::new(ArtifactBroker::new(
            Arc::new(ScriptedGateway::new(delay, script)),
            policy,
        ));
        let pipeline = FacilitationPipeline::new(
            Arc::clone(&store),
            Arc::clone(&hub),
            Arc::clone(&broker),
        );

        let mut session = Session::new(
            SessionId::new("s-1"),
            ParticipantId::new("org"),
            "title",
            None,
            QuorumPolicy::default(),
        );
        session.register_participant(ParticipantId::new("org"), "Dana", storm_domain::Role::Organizer);
        let session = store.insert(session);
        hub.register(session.clone());
        Fixture {
            store,
            hub,
            pipeline,
            session,
        }
    }

    fn ok(content: &str) -> Result<GeneratedContent, GatewayError> {
        Ok(GeneratedContent {
            content: content.to_string(),
            provider_metadata: None,
        })
    }

    fn unavailable() -> Result<GeneratedContent, GatewayError> {
        Err(GatewayError::Unavailable("503".into()))
    }

    #[tokio::test]
    async fn test_successful_generation_readies_stage_and_broadcasts() {
        let f = fixture(vec![ok("the agenda")], Duration::ZERO);
        let mut stream = f.hub.subscribe(&f.session, None).unwrap();

        f.pipeline
            .clone()
            .run_generation(f.session.clone(), ArtifactKind::Agenda, Trigger::Stage(Stage::Agenda))
            .await;

        let (status, artifact) = f
            .store
            .read(&f.session, |s| {
                (
                    s.stages().status(),
                    s.latest_artifact(ArtifactKind::Agenda).cloned(),
                )
            })
            .await
            .unwrap();
        assert_eq!(status, StageStatus::Ready);
        assert_eq!(artifact.unwrap().content, "the agenda");

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.sequence, 1);
        assert!(matches!(event.kind, EventKind::ArtifactGenerated { .. }));
    }

    #[tokio::test]
    async fn test_failed_attempt_keeps_stage_pending() {
        let f = fixture(vec![unavailable()], Duration::ZERO);
        let mut stream = f.hub.subscribe(&f.session, None).unwrap();

        f.pipeline
            .clone()
            .run_generation(f.session.clone(), ArtifactKind::Agenda, Trigger::Stage(Stage::Agenda))
            .await;

        let (status, attempts) = f
            .store
            .read(&f.session, |s| (s.stages().status(), s.stages().attempts()))
            .await
            .unwrap();
        assert_eq!(status, StageStatus::Pending);
        assert_eq!(attempts, 1);

        let event = stream.next().await.unwrap().unwrap();
        assert!(matches!(
            event.kind,
            EventKind::ArtifactFailed { degraded: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_third_failure_degrades_with_fallback() {
        let f = fixture(
            vec![unavailable(), unavailable(), unavailable()],
            Duration::ZERO,
        );
        let mut stream = f.hub.subscribe(&f.session, None).unwrap();

        for _ in 0..StageTrack::MAX_ATTEMPTS {
            f.pipeline
                .clone()
                .run_generation(f.session.clone(), ArtifactKind::Agenda, Trigger::Stage(Stage::Agenda))
                .await;
        }

        let (status, artifact) = f
            .store
            .read(&f.session, |s| {
                (
                    s.stages().status(),
                    s.latest_artifact(ArtifactKind::Agenda).cloned(),
                )
            })
            .await
            .unwrap();
        assert_eq!(status, StageStatus::Degraded);
        assert!(artifact.unwrap().fallback);

        // two plain failures, then the degrading failure and its fallback
        let kinds: Vec<String> = {
            let mut kinds = Vec::new();
            for _ in 0..4 {
                kinds.push(stream.next().await.unwrap().unwrap().kind.name().to_string());
            }
            kinds
        };
        assert_eq!(
            kinds,
            vec![
                "artifact_failed",
                "artifact_failed",
                "artifact_failed",
                "artifact_generated"
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_rejected_when_stage_not_pending() {
        let f = fixture(vec![ok("x")], Duration::ZERO);
        f.pipeline
            .clone()
            .run_generation(f.session.clone(), ArtifactKind::Agenda, Trigger::Stage(Stage::Agenda))
            .await;

        // stage is now Ready; a retry has nothing to do
        let err = f
            .pipeline
            .retry_stage(&f.session, Stage::Agenda)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));

        // and a stage without artifacts cannot be retried at all
        let err = f
            .pipeline
            .retry_stage(&f.session, Stage::Voting)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_cancellation_discards_inflight_result() {
        let f = fixture(vec![ok("too late")], Duration::from_millis(200));
        let task = tokio::spawn({
            let pipeline = f.pipeline.clone();
            let session = f.session.clone();
            async move {
                pipeline
                    .run_generation(session, ArtifactKind::Agenda, Trigger::Stage(Stage::Agenda))
                    .await;
            }
        });

        sleep(Duration::from_millis(20)).await;
        f.store.cancel_token(&f.session).unwrap().cancel();
        task.await.unwrap();

        let (artifacts, seq) = f
            .store
            .read(&f.session, |s| (s.artifacts().len(), s.last_event_seq()))
            .await
            .unwrap();
        assert_eq!(artifacts, 0);
        assert_eq!(seq, 0);
    }

    #[tokio::test]
    async fn test_conclusion_discards_inflight_result() {
        let f = fixture(vec![ok("too late")], Duration::from_millis(100));
        let task = tokio::spawn({
            let pipeline = f.pipeline.clone();
            let session = f.session.clone();
            async move {
                pipeline
                    .run_generation(session, ArtifactKind::Agenda, Trigger::Stage(Stage::Agenda))
                    .await;
            }
        });

        sleep(Duration::from_millis(10)).await;
        f.store
            .apply(&f.session, |s| {
                s.conclude();
                Ok(())
            })
            .await
            .unwrap();
        task.await.unwrap();

        let artifacts = f.store.read(&f.session, |s| s.artifacts().len()).await.unwrap();
        assert_eq!(artifacts, 0);
    }
}
