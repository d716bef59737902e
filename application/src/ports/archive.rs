//! Session archive port
//!
//! The orchestrator guarantees nothing beyond the live session; at
//! conclusion it hands a snapshot to this collaborator exactly once and
//! forgets about it. The archive's internal format is its own business.

use async_trait::async_trait;
use storm_domain::SessionSnapshot;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive I/O error: {0}")]
    Io(String),

    #[error("archive serialization error: {0}")]
    Serialization(String),
}

/// Persistence collaborator invoked once per concluded session.
#[async_trait]
pub trait SessionArchive: Send + Sync {
    async fn archive(&self, snapshot: &SessionSnapshot) -> Result<(), ArchiveError>;
}

/// Archive that drops everything. Useful in tests and ephemeral setups.
pub struct NullArchive;

#[async_trait]
impl SessionArchive for NullArchive {
    async fn archive(&self, _snapshot: &SessionSnapshot) -> Result<(), ArchiveError> {
        Ok(())
    }
}
