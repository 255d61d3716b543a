use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Connection settings for a Blynk device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server host name or address
    pub server: String,
    /// Server TCP port
    pub port: u16,
    /// Auth token of the device
    #[serde(alias = "blynk_auth")]
    pub auth: String,
    /// Heartbeat interval, written in seconds
    #[serde(serialize_with = "super::serde::serialize_secs")]
    #[serde(deserialize_with = "super::serde::deserialize_secs")]
    pub heartbeat: Duration,
    /// Largest inbound frame accepted, in bytes
    #[serde(alias = "buffin")]
    pub buffer_size: usize,
    /// Timeout for establishing the TCP connection
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub connect_timeout: Duration,
    /// Upper bound of a single socket read in the connection loop
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub read_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: super::DEFAULT_SERVER.to_string(),
            port: super::DEFAULT_PORT,
            auth: String::new(),
            heartbeat: Duration::from_secs(super::DEFAULT_HEARTBEAT_SECS),
            buffer_size: super::DEFAULT_BUFFER_SIZE,
            connect_timeout: Duration::from_millis(50),
            read_timeout: Duration::from_millis(50),
        }
    }
}

/// Layout of a configuration file: settings live in a `[blynk]` table
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(alias = "Blynk")]
    blynk: Config,
}

impl Config {
    /// Creates a configuration for the default server with the given token
    pub fn new(auth: impl Into<String>) -> Self {
        Config {
            auth: auth.into(),
            ..Config::default()
        }
    }

    /// Parses and validates a TOML document with a `[blynk]` table
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)
            .map_err(|e| Error::config(format!("Failed to parse configuration: {}", e)))?;
        file.blynk.validate()?;
        Ok(file.blynk)
    }

    /// Loads a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks the values the protocol cannot work without
    pub fn validate(&self) -> Result<()> {
        if self.auth.is_empty() {
            return Err(Error::config("auth token is empty"));
        }
        if self.server.is_empty() {
            return Err(Error::config("server address is empty"));
        }
        if self.heartbeat_millis() == 0 {
            return Err(Error::config("heartbeat interval must be positive"));
        }
        if self.buffer_size <= crate::protocol::HEADER_LEN {
            return Err(Error::config(format!(
                "buffer size {} cannot hold a frame",
                self.buffer_size
            )));
        }
        Ok(())
    }

    /// Heartbeat interval in milliseconds
    pub fn heartbeat_millis(&self) -> u64 {
        self.heartbeat.as_millis() as u64
    }

    /// `host:port` of the server
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}
