//! Core types for the Blynk link
//!
//! Errors, configuration and the constants shared by the protocol and network layers.

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{Error, Result};
pub use self::types::Config;

/// Default Blynk cloud server
pub const DEFAULT_SERVER: &str = "blynk-cloud.com";

/// Default plain TCP port
pub const DEFAULT_PORT: u16 = 80;

/// Default heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_SECS: u64 = 10;

/// Default inbound buffer size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Widget colours understood by the cloud, for use with `set_property(pin, "color", ..)`
pub mod color {
    pub const GREEN: &str = "#23C48E";
    pub const BLUE: &str = "#04C0F8";
    pub const YELLOW: &str = "#ED9D00";
    pub const RED: &str = "#D3435C";
    pub const DARK_BLUE: &str = "#5F7CD8";
}
