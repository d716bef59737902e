//! Broadcast hub
//!
//! Fans session events out to every subscribed connection, preserving the
//! per-session total order, and keeps a bounded backlog so a reconnecting
//! client can replay what it missed instead of refetching everything.
//!
//! Publish and subscribe for one session go through the same short mutex,
//! which closes the classic handoff race: an event is either in the replay a
//! subscriber is handed, or will arrive on its live receiver — never both,
//! never neither. Publishing also verifies sequence contiguity; a gap means
//! a lock-discipline bug upstream and is reported as `Internal` so the
//! orchestrator can quarantine the session.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use storm_domain::{SessionError, SessionEvent, SessionId};
use tokio::sync::broadcast;
use tracing::{debug, error};

/// Bounds on the replay backlog.
#[derive(Debug, Clone, Copy)]
pub struct BacklogPolicy {
    /// Maximum number of retained events.
    pub retain_events: usize,
    /// Maximum age of retained events.
    pub retain_age: Duration,
}

impl Default for BacklogPolicy {
    /// Last 500 events or 1 hour, whichever is smaller.
    fn default() -> Self {
        Self {
            retain_events: 500,
            retain_age: Duration::from_secs(3600),
        }
    }
}

struct ChannelInner {
    backlog: VecDeque<(Instant, SessionEvent)>,
    last_seq: u64,
}

struct SessionChannel {
    inner: Mutex<ChannelInner>,
    tx: broadcast::Sender<SessionEvent>,
}

/// Per-session fan-out with bounded replay.
pub struct BroadcastHub {
    policy: BacklogPolicy,
    channels: RwLock<HashMap<SessionId, Arc<SessionChannel>>>,
}

impl BroadcastHub {
    pub fn new(policy: BacklogPolicy) -> Self {
        Self {
            policy,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Create the channel for a new session.
    pub fn register(&self, session: SessionId) {
        let (tx, _) = broadcast::channel(self.policy.retain_events.max(16));
        let channel = Arc::new(SessionChannel {
            inner: Mutex::new(ChannelInner {
                backlog: VecDeque::new(),
                last_seq: 0,
            }),
            tx,
        });
        self.channels
            .write()
            .expect("hub lock poisoned")
            .insert(session, channel);
    }

    /// Tear down a session's channel. Live subscribers drain whatever is
    /// already buffered and then see end-of-stream.
    pub fn drop_channel(&self, session: &SessionId) {
        self.channels
            .write()
            .expect("hub lock poisoned")
            .remove(session);
    }

    fn channel(&self, session: &SessionId) -> Result<Arc<SessionChannel>, SessionError> {
        self.channels
            .read()
            .expect("hub lock poisoned")
            .get(session)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("no channel for session {session}")))
    }

    /// Publish one event, enforcing sequence contiguity.
    pub fn publish(&self, event: SessionEvent) -> Result<(), SessionError> {
        let channel = self.channel(&event.session)?;
        let mut inner = channel.inner.lock().expect("channel lock poisoned");

        let expected = inner.last_seq + 1;
        if event.sequence != expected {
            error!(
                session = %event.session,
                expected,
                got = event.sequence,
                "event sequence gap detected"
            );
            return Err(SessionError::Internal(format!(
                "sequence gap in session {}: expected {expected}, got {}",
                event.session, event.sequence
            )));
        }

        inner.last_seq = event.sequence;
        inner.backlog.push_back((Instant::now(), event.clone()));
        self.prune(&mut inner);

        // no live subscribers is fine; the backlog still serves replays
        let _ = channel.tx.send(event);
        Ok(())
    }

    fn prune(&self, inner: &mut ChannelInner) {
        while inner.backlog.len() > self.policy.retain_events {
            inner.backlog.pop_front();
        }
        let cutoff = Instant::now();
        while let Some((stamped, _)) = inner.backlog.front() {
            if cutoff.duration_since(*stamped) > self.policy.retain_age {
                inner.backlog.pop_front();
            } else {
                break;
            }
        }
    }

    /// Draw the next sequence number from the session and publish the event,
    /// all while the caller holds the session's lock.
    ///
    /// This is the only sanctioned way to publish: the sequence draw and the
    /// publish happen under one lock, which is what keeps the per-session
    /// stream gapless under concurrency. A detected gap quarantines the
    /// session on the spot and surfaces as `Internal`.
    pub fn emit(
        &self,
        session: &mut storm_domain::Session,
        kind: storm_domain::EventKind,
    ) -> Result<(), SessionError> {
        let event = SessionEvent::new(session.id().clone(), session.next_event_seq(), kind);
        if let Err(err) = self.publish(event) {
            if matches!(err, SessionError::Internal(_)) {
                session.quarantine();
            }
            return Err(err);
        }
        Ok(())
    }

    /// Subscribe to a session's events.
    ///
    /// With `last_seen`, the stream first replays every retained event with
    /// a higher sequence; if the backlog no longer reaches back that far the
    /// call fails with `SnapshotRequired` and the client must fetch a full
    /// state snapshot instead. Without `last_seen` the stream starts with
    /// whatever history the backlog holds.
    pub fn subscribe(
        &self,
        session: &SessionId,
        last_seen: Option<u64>,
    ) -> Result<EventStream, SessionError> {
        let channel = self.channel(session)?;
        let inner = channel.inner.lock().expect("channel lock poisoned");

        let replay: VecDeque<SessionEvent> = match last_seen {
            Some(seen) => {
                let covered = seen >= inner.last_seq
                    || inner
                        .backlog
                        .front()
                        .is_some_and(|(_, oldest)| oldest.sequence <= seen + 1);
                if !covered {
                    return Err(SessionError::SnapshotRequired);
                }
                inner
                    .backlog
                    .iter()
                    .filter(|(_, e)| e.sequence > seen)
                    .map(|(_, e)| e.clone())
                    .collect()
            }
            None => inner.backlog.iter().map(|(_, e)| e.clone()).collect(),
        };

        let delivered_up_to = replay
            .back()
            .map(|e| e.sequence)
            .or(last_seen)
            .unwrap_or(inner.last_seq);
        debug!(%session, replay = replay.len(), delivered_up_to, "subscriber attached");

        Ok(EventStream {
            replay,
            live: channel.tx.subscribe(),
            delivered_up_to,
        })
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(BacklogPolicy::default())
    }
}

/// Ordered, restartable stream of one session's events: replay first, then
/// live delivery, with duplicate suppression across the seam.
#[derive(Debug)]
pub struct EventStream {
    replay: VecDeque<SessionEvent>,
    live: broadcast::Receiver<SessionEvent>,
    delivered_up_to: u64,
}

impl EventStream {
    /// Next event in order. `Ok(None)` means the session's channel closed.
    /// `Err(SnapshotRequired)` means this subscriber fell too far behind the
    /// live feed and must resync from a snapshot.
    pub async fn next(&mut self) -> Result<Option<SessionEvent>, SessionError> {
        if let Some(event) = self.replay.pop_front() {
            self.delivered_up_to = event.sequence;
            return Ok(Some(event));
        }
        loop {
            match self.live.recv().await {
                Ok(event) => {
                    // events already covered by the replay come around again
                    // on the live receiver; drop them here
                    if event.sequence <= self.delivered_up_to {
                        continue;
                    }
                    self.delivered_up_to = event.sequence;
                    return Ok(Some(event));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged, demanding snapshot resync");
                    return Err(SessionError::SnapshotRequired);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }

    /// Sequence of the last delivered event.
    pub fn delivered_up_to(&self) -> u64 {
        self.delivered_up_to
    }
}
