//! Identifier newtypes
//!
//! Every aggregate and externally visible record gets its own id type so the
//! orchestrator cannot confuse, say, a participant id with an idea id at a
//! call site. Ids are opaque strings; `generate()` produces a v4-shaped uuid
//! without pulling an external dependency into the domain layer.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(uuid_v4())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifies one live workshop session.
    SessionId
);
string_id!(
    /// Identifies a participant. Stable across reconnects; supplied by the
    /// identity collaborator, never minted by the orchestrator.
    ParticipantId
);
string_id!(
    /// Identifies a live connection. One participant may hold several
    /// (multiple tabs); presence tracks them individually.
    ConnectionId
);
string_id!(
    /// Identifies a submitted idea. Also the final tie-break key in ranking.
    IdeaId
);
string_id!(
    /// Identifies a chat message.
    MessageId
);
string_id!(
    /// Identifies one artifact generation request sent to the AI backend.
    RequestId
);

/// Generate a simple UUID v4 (without external dependency)
fn uuid_v4() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    // Simple pseudo-random based on time
    let nanos = now.as_nanos();
    format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        (nanos >> 96) as u32,
        (nanos >> 80) as u16,
        (nanos >> 64) as u16 & 0x0fff,
        ((nanos >> 48) as u16 & 0x3fff) | 0x8000,
        (nanos & 0xffffffffffff) as u64
    )
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
