//! Presence tracking
//!
//! Maps live connections to participants. A participant may hold several
//! connections at once; join/leave events are only warranted on the edge
//! transitions (first connection up, last connection down), which is what
//! [`BindOutcome::came_online`] and [`Unbound::went_offline`] report.
//!
//! Liveness is heartbeat-based: a connection that misses its beats for the
//! configured budget is swept and treated like a disconnect. The historical
//! participant record is never touched here; presence is the weak side of
//! that relationship.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use storm_domain::{ConnectionId, ParticipantId, SessionId};
use tracing::debug;

/// Liveness parameters.
#[derive(Debug, Clone, Copy)]
pub struct PresencePolicy {
    pub heartbeat_interval: Duration,
    pub missed_beats: u32,
}

impl PresencePolicy {
    /// How long a connection may stay silent before it is considered gone.
    pub fn liveness_budget(&self) -> Duration {
        self.heartbeat_interval * self.missed_beats
    }
}

impl Default for PresencePolicy {
    /// 30s heartbeat, 3 missed beats.
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            missed_beats: 3,
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    session: SessionId,
    participant: ParticipantId,
    last_beat: Instant,
}

/// Result of binding a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct BindOutcome {
    /// True when the participant had no other live connection in the
    /// session, i.e. this is a join, not an extra tab or a rebind.
    pub came_online: bool,
}

/// Result of unbinding a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Unbound {
    pub session: SessionId,
    pub participant: ParticipantId,
    /// True when this was the participant's last live connection.
    pub went_offline: bool,
}

/// Tracks which connections are live and who they belong to.
pub struct PresenceTracker {
    policy: PresencePolicy,
    connections: Mutex<HashMap<ConnectionId, Binding>>,
}

impl PresenceTracker {
    pub fn new(policy: PresencePolicy) -> Self {
        Self {
            policy,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> PresencePolicy {
        self.policy
    }

    /// Register (or re-register) a connection for a participant.
    pub fn bind(
        &self,
        conn: ConnectionId,
        session: SessionId,
        participant: ParticipantId,
    ) -> BindOutcome {
        let mut connections = self.connections.lock().expect("presence lock poisoned");
        let came_online = !connections
            .values()
            .any(|b| b.session == session && b.participant == participant);
        debug!(%conn, %session, %participant, came_online, "connection bound");
        connections.insert(
            conn,
            Binding {
                session,
                participant,
                last_beat: Instant::now(),
            },
        );
        BindOutcome { came_online }
    }

    /// Record a heartbeat. Returns false for unknown connections.
    pub fn heartbeat(&self, conn: &ConnectionId) -> bool {
        let mut connections = self.connections.lock().expect("presence lock poisoned");
        match connections.get_mut(conn) {
            Some(binding) => {
                binding.last_beat = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Remove a connection (explicit leave or transport close).
    pub fn unbind(&self, conn: &ConnectionId) -> Option<Unbound> {
        let mut connections = self.connections.lock().expect("presence lock poisoned");
        let binding = connections.remove(conn)?;
        let went_offline = !connections
            .values()
            .any(|b| b.session == binding.session && b.participant == binding.participant);
        debug!(%conn, session = %binding.session, participant = %binding.participant,
               went_offline, "connection unbound");
        Some(Unbound {
            session: binding.session,
            participant: binding.participant,
            went_offline,
        })
    }

    /// The participant a connection acts as, if it is bound.
    pub fn participant_for(&self, conn: &ConnectionId) -> Option<(SessionId, ParticipantId)> {
        let connections = self.connections.lock().expect("presence lock poisoned");
        connections
            .get(conn)
            .map(|b| (b.session.clone(), b.participant.clone()))
    }

    /// Participants with at least one live connection in the session.
    pub fn active_participants(&self, session: &SessionId) -> HashSet<ParticipantId> {
        let connections = self.connections.lock().expect("presence lock poisoned");
        connections
            .values()
            .filter(|b| &b.session == session)
            .map(|b| b.participant.clone())
            .collect()
    }

    /// Drop every connection whose last beat is older than the liveness
    /// budget, reporting each removal. `now` is a parameter so sweeps are
    /// testable without waiting.
    pub fn sweep(&self, now: Instant) -> Vec<Unbound> {
        let budget = self.policy.liveness_budget();
        let expired: Vec<ConnectionId> = {
            let connections = self.connections.lock().expect("presence lock poisoned");
            connections
                .iter()
                .filter(|(_, b)| now.duration_since(b.last_beat) >= budget)
                .map(|(conn, _)| conn.clone())
                .collect()
        };
        expired.iter().filter_map(|conn| self.unbind(conn)).collect()
    }
}
