//! Application layer for ideastorm
//!
//! This crate contains the runtime components of the workshop session
//! orchestrator (state store, presence tracker, broadcast hub, artifact
//! broker, facilitation pipeline, and the orchestrator that composes them)
//! plus the ports external adapters implement. It depends only on the domain
//! layer.

pub mod broadcast;
pub mod gateway;
pub mod orchestrator;
pub mod pipeline;
pub mod ports;
pub mod presence;
pub mod store;

// Re-export commonly used types
pub use broadcast::{BacklogPolicy, BroadcastHub, EventStream};
pub use gateway::{ArtifactBroker, RetryPolicy};
pub use orchestrator::{JoinAccept, SessionOrchestrator};
pub use pipeline::FacilitationPipeline;
pub use ports::{
    archive::{ArchiveError, NullArchive, SessionArchive},
    artifact_gateway::{ArtifactGateway, GatewayError, GeneratedContent, GenerationRequest},
    identity::{IdentityError, IdentityVerifier, VerifiedIdentity},
};
pub use presence::{BindOutcome, PresencePolicy, PresenceTracker, Unbound};
pub use store::SessionStateStore;
