//! Validated configuration as the running server uses it.

use bite_core::config::{HubConfig, SweeperConfig};
use bite_core::directory::StaticDirectory;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// Gateway secret, reloadable via SIGHUP.
pub struct AuthConfig {
    gateway_secret: Box<[u8]>,
}

impl AuthConfig {
    pub fn new(gateway_secret: Box<[u8]>) -> Self {
        Self { gateway_secret }
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.gateway_secret
    }
}

pub enum DirectorySettings {
    Database,
    Static(StaticDirectory),
}

pub struct EngineSettings {
    pub sweeper: SweeperConfig,
    pub hub: HubConfig,
}
