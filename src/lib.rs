//! Blynk link: persistent TCP client for the Blynk automation cloud
//!
//! A device logs in with an auth token, exchanges virtual pin values with the
//! server, keeps the connection alive with heartbeats and dispatches inbound
//! events to registered handlers. The protocol state machine in [`protocol`] is
//! independent of any socket; [`Client`] drives it over TCP.
pub mod core;
pub mod dispatch;
pub mod network;
pub mod protocol;
pub mod util;

// Re-export commonly used items
pub use crate::core::{color, Config, Error, Result};
pub use crate::dispatch::{Event, HandlerRegistry};
pub use crate::network::{Client, ClientHandle};
pub use crate::protocol::{ConnectionState, Link, Message, Session};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
