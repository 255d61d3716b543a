use std::io;
use thiserror::Error;

use crate::protocol::Command;

/// Error types for the Blynk link
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown command id: {0}")]
    UnknownCommand(u8),

    #[error("Frame too large: {length} bytes (limit {limit})")]
    FrameTooLarge { length: usize, limit: usize },

    #[error("Unexpected command from server: {0:?}")]
    UnexpectedCommand(Command),

    #[error("Session terminated by server (sequence id 0)")]
    SessionKilled,

    #[error("Invalid auth token")]
    InvalidToken,

    #[error("Handshake rejected with status {0}")]
    HandshakeRejected(u16),

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("Connection to {0} timed out")]
    ConnectTimeout(String),

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Maps a rejected login status to the matching error
    pub fn handshake(status: u16) -> Self {
        if status == crate::protocol::Status::INVALID_TOKEN {
            Error::InvalidToken
        } else {
            Error::HandshakeRejected(status)
        }
    }

    /// Whether the server sent something the protocol does not allow
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_)
                | Error::UnknownCommand(_)
                | Error::FrameTooLarge { .. }
                | Error::UnexpectedCommand(_)
                | Error::SessionKilled
        )
    }

    /// Whether reconnecting with the same configuration is pointless
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvalidToken | Error::Config(_))
    }
}
