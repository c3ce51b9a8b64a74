// Client configuration.
// Logging is on by default only in debug builds.

use crate::error::{Result, UserError};
use crate::peer::types::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true;

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_GATHERING_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "data";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub enabled: bool,
    /// Default filter directive, e.g. `info` or `signal_client=debug`
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: LOGGING_ENABLED,
            level: "info".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Signaling server, `host:port` or a base url
    pub address: String,
    pub ice_servers: Vec<ServerConfig>,
    pub request_timeout_ms: u64,
    pub gathering_timeout_ms: u64,
    pub data_channel_label: String,
    pub log: LogConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            ice_servers: default_ice_servers(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            gathering_timeout_ms: DEFAULT_GATHERING_TIMEOUT_MS,
            data_channel_label: DEFAULT_DATA_CHANNEL_LABEL.into(),
            log: LogConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)
            .map_err(|e| UserError::InvalidConfig(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            UserError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(UserError::InvalidConfig("signaling address is empty".into()).into());
        }
        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(
                    UserError::InvalidConfig(format!("ICE server {} has no url", server.id)).into(),
                );
            }
            if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none())
            {
                return Err(UserError::InvalidConfig(format!(
                    "TURN server {} requires username and credential",
                    server.id
                ))
                .into());
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn gathering_timeout(&self) -> Duration {
        Duration::from_millis(self.gathering_timeout_ms)
    }
}

pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
}
