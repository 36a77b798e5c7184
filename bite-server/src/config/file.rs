//! TOML file configuration structures.
//!
//! These structs map one-to-one onto `bite-config.toml`.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address and port to listen on, e.g. `"0.0.0.0:8080"`.
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret shared with the gateway that signs `Bite-Identity`.
    pub gateway_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_tracking_buffer")]
    pub tracking_buffer: usize,
    #[serde(default = "default_tracking_history")]
    pub tracking_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            tracking_buffer: default_tracking_buffer(),
            tracking_history: default_tracking_history(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_tracking_buffer() -> usize {
    16
}

fn default_tracking_history() -> usize {
    20
}

/// Where approval status is looked up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectorySource {
    /// The `users` table in the shared database.
    #[default]
    Database,
    /// The `[[directory.users]]` list below.
    Static,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub source: DirectorySource,
    #[serde(default)]
    pub users: Vec<DirectoryUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub user_id: Uuid,
    #[serde(default = "default_user_status")]
    pub status: UserStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Pending,
    Approved,
    Rejected,
}

fn default_user_status() -> UserStatus {
    UserStatus::Approved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[auth]
gateway_secret = "shared-with-the-gateway"

[engine]
sweep_interval_secs = 15
tracking_buffer = 32
tracking_history = 5

[directory]
source = "static"

[[directory.users]]
user_id = "0190f3a4-7c1e-7d2a-9b3c-2f1e4d5c6b7a"

[[directory.users]]
user_id = "0190f3a4-7c1e-7d2a-9b3c-2f1e4d5c6b7b"
status = "PENDING"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.auth.gateway_secret, "shared-with-the-gateway");
        assert_eq!(config.engine.sweep_interval_secs, 15);
        assert_eq!(config.engine.tracking_buffer, 32);
        assert_eq!(config.engine.tracking_history, 5);
        assert_eq!(config.directory.source, DirectorySource::Static);
        assert_eq!(config.directory.users.len(), 2);
        assert_eq!(config.directory.users[0].status, UserStatus::Approved);
        assert_eq!(config.directory.users[1].status, UserStatus::Pending);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: FileConfig = toml::from_str(
            r#"
[auth]
gateway_secret = "s"
"#,
        )
        .unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.engine.sweep_interval_secs, 60);
        assert_eq!(config.engine.tracking_buffer, 16);
        assert_eq!(config.engine.tracking_history, 20);
        assert_eq!(config.directory.source, DirectorySource::Database);
        assert!(config.directory.users.is_empty());
    }

    #[test]
    fn test_missing_auth_is_rejected() {
        let result: Result<FileConfig, _> = toml::from_str("[server]\nlisten = \"127.0.0.1:1\"\n");
        assert!(result.is_err());
    }
}
