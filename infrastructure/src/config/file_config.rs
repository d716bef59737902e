//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! Every section has full defaults, so an empty file (or no file at all) is
//! a valid configuration.
//!
//! Example configuration:
//!
//! ```toml
//! [gateway]
//! endpoint = "http://localhost:8080/v1/generate"
//! timeout_secs = 20
//!
//! [presence]
//! heartbeat_secs = 30
//! missed_beats = 3
//!
//! [broadcast]
//! backlog_events = 500
//! backlog_max_age_secs = 3600
//!
//! [voting]
//! quorum_window_secs = 300
//! max_weight = 3
//!
//! [archive]
//! path = "ideastorm-archive.jsonl"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use storm_application::broadcast::BacklogPolicy;
use storm_application::gateway::RetryPolicy;
use storm_application::presence::PresencePolicy;
use storm_domain::QuorumPolicy;

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// AI gateway transport and retry settings
    pub gateway: FileGatewayConfig,
    /// Connection liveness settings
    pub presence: FilePresenceConfig,
    /// Event backlog settings
    pub broadcast: FileBroadcastConfig,
    /// Voting defaults
    pub voting: FileVotingConfig,
    /// Session archive settings
    pub archive: FileArchiveConfig,
}

/// `[gateway]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileGatewayConfig {
    /// Generation endpoint of the AI backend
    pub endpoint: String,
    /// Optional bearer token for the backend
    pub auth_token: Option<String>,
    /// Budget for a single generation attempt
    pub timeout_secs: u64,
    /// Backoff before the first retry
    pub retry_base_secs: u64,
    /// Backoff multiplier per further retry
    pub retry_factor: u32,
    /// Attempts per logical generation, first call included
    pub retry_max_attempts: u32,
}

impl Default for FileGatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/v1/generate".to_string(),
            auth_token: None,
            timeout_secs: 20,
            retry_base_secs: 1,
            retry_factor: 2,
            retry_max_attempts: 3,
        }
    }
}

impl FileGatewayConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_secs(self.timeout_secs),
            base_delay: Duration::from_secs(self.retry_base_secs),
            factor: self.retry_factor.max(1),
            max_attempts: self.retry_max_attempts.max(1),
        }
    }
}

/// `[presence]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePresenceConfig {
    pub heartbeat_secs: u64,
    pub missed_beats: u32,
}

impl Default for FilePresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 30,
            missed_beats: 3,
        }
    }
}

impl FilePresenceConfig {
    pub fn presence_policy(&self) -> PresencePolicy {
        PresencePolicy {
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs.max(1)),
            missed_beats: self.missed_beats.max(1),
        }
    }
}

/// `[broadcast]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileBroadcastConfig {
    pub backlog_events: usize,
    pub backlog_max_age_secs: u64,
}

impl Default for FileBroadcastConfig {
    fn default() -> Self {
        Self {
            backlog_events: 500,
            backlog_max_age_secs: 3600,
        }
    }
}

impl FileBroadcastConfig {
    pub fn backlog_policy(&self) -> BacklogPolicy {
        BacklogPolicy {
            retain_events: self.backlog_events.max(1),
            retain_age: Duration::from_secs(self.backlog_max_age_secs.max(1)),
        }
    }
}

/// `[voting]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileVotingConfig {
    /// Default voting window for new sessions
    pub quorum_window_secs: u64,
    /// Cap on client-supplied vote weights
    pub max_weight: u32,
}

impl Default for FileVotingConfig {
    fn default() -> Self {
        Self {
            quorum_window_secs: 300,
            max_weight: 3,
        }
    }
}

impl FileVotingConfig {
    pub fn quorum_policy(&self) -> QuorumPolicy {
        QuorumPolicy::new(self.quorum_window_secs.max(1) * 1000)
    }
}

/// `[archive]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileArchiveConfig {
    /// JSONL file concluded sessions are appended to
    pub path: String,
}

impl Default for FileArchiveConfig {
    fn default() -> Self {
        Self {
            path: "ideastorm-archive.jsonl".to_string(),
        }
    }
}
