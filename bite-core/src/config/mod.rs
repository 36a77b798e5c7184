//! Runtime configuration consumed by the engine.
//!
//! These are the already-validated values; parsing the TOML file is the
//! server's job.

mod config_store;

pub use config_store::{ConfigStore, ConfigWatcher};

use std::time::Duration;

/// Settings for the lifecycle sweeper. Reloadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Pause between two sweeps.
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Sizing for the tracking hub. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Per-request broadcast buffer. A subscriber further behind than this
    /// skips ahead instead of slowing the publisher.
    pub buffer: usize,
    /// Samples kept per request for the history endpoint.
    pub history: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            buffer: 16,
            history: 20,
        }
    }
}
