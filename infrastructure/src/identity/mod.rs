//! Identity adapters

pub mod roster;

pub use roster::RosterIdentityVerifier;
