//! Configuration: raw TOML structures and the multi-source loader

pub mod file_config;
pub mod loader;

pub use file_config::{
    FileArchiveConfig, FileBroadcastConfig, FileConfig, FileGatewayConfig, FilePresenceConfig,
    FileVotingConfig,
};
pub use loader::ConfigLoader;
