//! Protocol implementation module
//!
//! This module defines the Blynk wire format, the outbound application messages,
//! heartbeat timing and the connection state machine. Nothing here touches a socket:
//! the state machine consumes bytes and a millisecond clock and produces bytes.

pub mod buffer;
pub mod codec;
pub mod heartbeat;
pub mod link;
pub mod message;
pub mod state;

pub use self::buffer::ReceiveBuffer;
pub use self::codec::{Frame, FrameCodec};
pub use self::heartbeat::{Timing, Verdict};
pub use self::link::{Link, SequenceCounter};
pub use self::message::Message;
pub use self::state::{ConnectionState, Session};

use crate::core::Error;

/// Size of the fixed frame header: command, sequence id, length
pub const HEADER_LEN: usize = 5;

/// Protocol version announced after login
pub const PROTOCOL_VERSION: &str = "0.2.0";

/// Device type announced after login
pub const DEVICE_TYPE: &str = "rust";

/// Command byte of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Response = 0,
    Login = 2,
    Ping = 6,
    Tweet = 12,
    Email = 13,
    Notify = 14,
    Bridge = 15,
    HardwareSync = 16,
    Internal = 17,
    Property = 19,
    Hardware = 20,
    HardwareLogin = 29,
    EventLog = 64,
}

impl Command {
    /// Wire value of the command
    pub fn id(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let command = match value {
            0 => Command::Response,
            2 => Command::Login,
            6 => Command::Ping,
            12 => Command::Tweet,
            13 => Command::Email,
            14 => Command::Notify,
            15 => Command::Bridge,
            16 => Command::HardwareSync,
            17 => Command::Internal,
            19 => Command::Property,
            20 => Command::Hardware,
            29 => Command::HardwareLogin,
            64 => Command::EventLog,
            other => return Err(Error::UnknownCommand(other)),
        };
        Ok(command)
    }
}

/// Status carried by a Response frame in place of the payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub u16);

impl Status {
    pub const SUCCESS: u16 = 200;
    pub const INVALID_TOKEN: u16 = 9;

    pub fn success() -> Self {
        Status(Self::SUCCESS)
    }

    pub fn is_success(self) -> bool {
        self.0 == Self::SUCCESS
    }

    pub fn code(self) -> u16 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ids() {
        let all = [
            Command::Response,
            Command::Login,
            Command::Ping,
            Command::Tweet,
            Command::Email,
            Command::Notify,
            Command::Bridge,
            Command::HardwareSync,
            Command::Internal,
            Command::Property,
            Command::Hardware,
            Command::HardwareLogin,
            Command::EventLog,
        ];
        for command in all {
            assert_eq!(Command::try_from(command.id()).unwrap(), command);
        }
        assert_eq!(Command::HardwareLogin.id(), 29);
        assert_eq!(Command::EventLog.id(), 64);
    }

    #[test]
    fn test_unknown_command() {
        for value in [1u8, 3, 18, 21, 63, 255] {
            assert!(matches!(
                Command::try_from(value),
                Err(Error::UnknownCommand(v)) if v == value
            ));
        }
    }

    #[test]
    fn test_status() {
        assert!(Status::success().is_success());
        assert!(!Status(Status::INVALID_TOKEN).is_success());
        assert_eq!(Status(9).code(), 9);
    }
}
