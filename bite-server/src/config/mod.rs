//! Configuration module for bite-server.
//!
//! Loads the TOML file, applies CLI overrides, validates, and converts to
//! runtime types.

pub mod file;
pub mod runtime;

use crate::config::file::{DirectorySource, FileConfig, UserStatus as FileUserStatus};
use crate::config::runtime::{
    AuthConfig, DirectorySettings, EngineSettings, ServerConfig,
};
use bite_core::config::{HubConfig, SweeperConfig};
use bite_core::directory::{StaticDirectory, UserStatus};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

pub struct LoadedConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub engine: EngineSettings,
    pub directory: DirectorySettings,
}

pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }

    /// Reload on SIGHUP. Only the auth secret and sweeper settings are
    /// applied live; the rest takes effect on restart.
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.auth.gateway_secret.is_empty() {
        return Err(ConfigError::ValidationError(
            "auth.gateway_secret must not be empty".into(),
        ));
    }
    if config.engine.sweep_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine.sweep_interval_secs must be positive".into(),
        ));
    }
    if config.engine.tracking_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "engine.tracking_buffer must be positive".into(),
        ));
    }
    if config.directory.source == DirectorySource::Database && !config.directory.users.is_empty()
    {
        tracing::warn!("directory.users is ignored when directory.source = \"database\"");
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let directory = match file_config.directory.source {
        DirectorySource::Database => DirectorySettings::Database,
        DirectorySource::Static => DirectorySettings::Static(static_directory(&file_config)),
    };

    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        auth: AuthConfig::new(
            file_config
                .auth
                .gateway_secret
                .into_bytes()
                .into_boxed_slice(),
        ),
        engine: EngineSettings {
            sweeper: SweeperConfig {
                interval: Duration::from_secs(file_config.engine.sweep_interval_secs),
            },
            hub: HubConfig {
                buffer: file_config.engine.tracking_buffer,
                history: file_config.engine.tracking_history,
            },
        },
        directory,
    }
}

/// Directory built from `[[directory.users]]`, whatever the source.
pub fn static_directory(file_config: &FileConfig) -> StaticDirectory {
    file_config
        .directory
        .users
        .iter()
        .fold(StaticDirectory::new(), |directory, user| {
            directory.with_user(user.user_id, convert_status(user.status))
        })
}

fn convert_status(status: FileUserStatus) -> UserStatus {
    match status {
        FileUserStatus::Pending => UserStatus::Pending,
        FileUserStatus::Approved => UserStatus::Approved,
        FileUserStatus::Rejected => UserStatus::Rejected,
    }
}

pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
