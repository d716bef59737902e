//! Artifact request broker
//!
//! Wraps the raw gateway port with the full call discipline:
//! a per-attempt time budget, exponential backoff on transient failures,
//! fail-fast on provider rejections, and an at-most-one-inflight guarantee
//! per (session, artifact kind). Concurrent requests for the same key share
//! the in-flight future instead of issuing a duplicate provider call.

use crate::ports::artifact_gateway::{ArtifactGateway, GatewayError, GenerationRequest};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storm_domain::{ArtifactKind, ContextSnapshot, FacilitationArtifact, SessionId};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Retry discipline for one logical generation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Budget for a single provider attempt.
    pub attempt_timeout: Duration,
    /// Backoff before the second attempt; doubles per `factor` after that.
    pub base_delay: Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl RetryPolicy {
    fn delay_before_attempt(&self, next_attempt: u32) -> Duration {
        // next_attempt is 2-based: the first retry waits base_delay
        let exponent = next_attempt.saturating_sub(2);
        self.base_delay * self.factor.saturating_pow(exponent)
    }
}

impl Default for RetryPolicy {
    /// 20s per attempt, backoff 1s doubling, 3 attempts.
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(20),
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_attempts: 3,
        }
    }
}

type InflightKey = (SessionId, ArtifactKind);
type SharedGeneration = Shared<BoxFuture<'static, Result<FacilitationArtifact, GatewayError>>>;

/// Deduplicating, retrying front-end over an [`ArtifactGateway`].
pub struct ArtifactBroker {
    gateway: Arc<dyn ArtifactGateway>,
    policy: RetryPolicy,
    inflight: Arc<Mutex<HashMap<InflightKey, SharedGeneration>>>,
}

impl ArtifactBroker {
    pub fn new(gateway: Arc<dyn ArtifactGateway>, policy: RetryPolicy) -> Self {
        Self {
            gateway,
            policy,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Generate one artifact for the session.
    ///
    /// If a generation for the same (session, kind) is already running, this
    /// call joins it and returns the shared outcome when it completes.
    pub async fn generate(
        &self,
        session: &SessionId,
        kind: ArtifactKind,
        context: ContextSnapshot,
    ) -> Result<FacilitationArtifact, GatewayError> {
        let key = (session.clone(), kind);
        let generation = {
            let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
            if let Some(existing) = inflight.get(&key) {
                debug!(session = %key.0, kind = %kind, "joining in-flight generation");
                existing.clone()
            } else {
                let gateway = Arc::clone(&self.gateway);
                let policy = self.policy;
                let map = Arc::clone(&self.inflight);
                let cleanup_key = key.clone();
                let generation = async move {
                    let result = run_attempts(gateway, policy, kind, context).await;
                    map.lock()
                        .expect("inflight lock poisoned")
                        .remove(&cleanup_key);
                    result
                }
                .boxed()
                .shared();
                inflight.insert(key, generation.clone());
                generation
            }
        };
        generation.await
    }
}

async fn run_attempts(
    gateway: Arc<dyn ArtifactGateway>,
    policy: RetryPolicy,
    kind: ArtifactKind,
    context: ContextSnapshot,
) -> Result<FacilitationArtifact, GatewayError> {
    let request = GenerationRequest::new(kind, context);
    let mut attempt = 1u32;
    loop {
        let failure = match timeout(policy.attempt_timeout, gateway.generate(&request)).await {
            Ok(Ok(content)) => {
                debug!(request = %request.request, kind = %kind, attempt, "generation succeeded");
                return Ok(FacilitationArtifact::generated(
                    kind,
                    content.content,
                    request.request.clone(),
                ));
            }
            Ok(Err(err)) => err,
            Err(_) => GatewayError::Timeout,
        };

        if !failure.is_transient() || attempt >= policy.max_attempts {
            warn!(request = %request.request, kind = %kind, attempt, error = %failure,
                  "generation failed");
            return Err(failure);
        }

        attempt += 1;
        let delay = policy.delay_before_attempt(attempt);
        warn!(request = %request.request, kind = %kind, attempt, delay_ms = delay.as_millis() as u64,
              error = %failure, "transient failure, backing off");
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::artifact_gateway::GeneratedContent;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use storm_domain::Stage;

    struct ScriptedGateway {
        calls: AtomicU32,
        delay: Duration,
        script: Mutex<VecDeque<Result<GeneratedContent, GatewayError>>>,
    }

    impl ScriptedGateway {
        fn new(delay: Duration, script: Vec<Result<GeneratedContent, GatewayError>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                delay,
                script: Mutex::new(script.into()),
            }
        }

        fn ok(content: &str) -> Result<GeneratedContent, GatewayError> {
            Ok(GeneratedContent {
                content: content.to_string(),
                provider_metadata: None,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ArtifactGateway for ScriptedGateway {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GeneratedContent, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.delay).await;
            self.script
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or_else(|| Self::ok("default"))
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_millis(100),
            base_delay: Duration::from_millis(1),
            factor: 2,
            max_attempts: 3,
        }
    }

    fn context() -> ContextSnapshot {
        ContextSnapshot::new("t", None, Stage::Agenda, 2, vec![], vec![])
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_provider_call() {
        let gateway = Arc::new(ScriptedGateway::new(
            Duration::from_millis(30),
            vec![ScriptedGateway::ok("agenda")],
        ));
        let broker = Arc::new(ArtifactBroker::new(gateway.clone(), quick_policy()));
        let session = SessionId::new("s-1");

        let (a, b) = tokio::join!(
            broker.generate(&session, ArtifactKind::Agenda, context()),
            broker.generate(&session, ArtifactKind::Agenda, context()),
        );

        assert_eq!(gateway.calls(), 1);
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.content, "agenda");
        // both callers received the very same generation
        assert_eq!(a.request, b.request);
    }

    #[tokio::test]
    async fn test_distinct_kinds_do_not_share() {
        let gateway = Arc::new(ScriptedGateway::new(
            Duration::from_millis(10),
            vec![ScriptedGateway::ok("a"), ScriptedGateway::ok("b")],
        ));
        let broker = Arc::new(ArtifactBroker::new(gateway.clone(), quick_policy()));
        let session = SessionId::new("s-1");

        let (a, b) = tokio::join!(
            broker.generate(&session, ArtifactKind::Agenda, context()),
            broker.generate(&session, ArtifactKind::Rules, context()),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_completed_generation_clears_inflight() {
        let gateway = Arc::new(ScriptedGateway::new(
            Duration::ZERO,
            vec![ScriptedGateway::ok("first"), ScriptedGateway::ok("second")],
        ));
        let broker = ArtifactBroker::new(gateway.clone(), quick_policy());
        let session = SessionId::new("s-1");

        let first = broker
            .generate(&session, ArtifactKind::Tip, context())
            .await
            .unwrap();
        let second = broker
            .generate(&session, ArtifactKind::Tip, context())
            .await
            .unwrap();

        assert_eq!(gateway.calls(), 2);
        assert_ne!(first.request, second.request);
    }

    #[tokio::test]
    async fn test_transient_failures_retry_until_success() {
        let gateway = Arc::new(ScriptedGateway::new(
            Duration::ZERO,
            vec![
                Err(GatewayError::Unavailable("503".into())),
                Err(GatewayError::Timeout),
                ScriptedGateway::ok("third time lucky"),
            ],
        ));
        let broker = ArtifactBroker::new(gateway.clone(), quick_policy());

        let artifact = broker
            .generate(&SessionId::new("s-1"), ArtifactKind::Agenda, context())
            .await
            .unwrap();
        assert_eq!(artifact.content, "third time lucky");
        assert_eq!(gateway.calls(), 3);
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_attempts() {
        let gateway = Arc::new(ScriptedGateway::new(
            Duration::ZERO,
            vec![
                Err(GatewayError::Unavailable("503".into())),
                Err(GatewayError::Unavailable("503".into())),
                Err(GatewayError::Unavailable("503".into())),
            ],
        ));
        let broker = ArtifactBroker::new(gateway.clone(), quick_policy());

        let err = broker
            .generate(&SessionId::new("s-1"), ArtifactKind::Agenda, context())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(gateway.calls(), 3);
    }

    #[tokio::test]
    async fn test_rejection_fails_without_retry() {
        let gateway = Arc::new(ScriptedGateway::new(
            Duration::ZERO,
            vec![Err(GatewayError::Rejected("content policy".into()))],
        ));
        let broker = ArtifactBroker::new(gateway.clone(), quick_policy());

        let err = broker
            .generate(&SessionId::new("s-1"), ArtifactKind::Nudge, context())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_attempts_hit_the_timeout_budget() {
        let gateway = Arc::new(ScriptedGateway::new(
            Duration::from_millis(500),
            vec![],
        ));
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_millis(10),
            base_delay: Duration::from_millis(1),
            factor: 2,
            max_attempts: 2,
        };
        let broker = ArtifactBroker::new(gateway.clone(), policy);

        let err = broker
            .generate(&SessionId::new("s-1"), ArtifactKind::Agenda, context())
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Timeout);
        assert_eq!(gateway.calls(), 2);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before_attempt(2), Duration::from_secs(1));
        assert_eq!(policy.delay_before_attempt(3), Duration::from_secs(2));
        assert_eq!(policy.delay_before_attempt(4), Duration::from_secs(4));
    }
}
