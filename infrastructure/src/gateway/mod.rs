//! AI gateway adapters

pub mod http;

pub use http::HttpArtifactGateway;
