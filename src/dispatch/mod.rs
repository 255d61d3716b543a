//! Event dispatch
//!
//! Inbound application frames are turned into events and handed to the handler
//! registered under the matching key. Handlers run synchronously on the connection
//! loop, one at a time, in frame order.

mod registry;

pub use self::registry::{Handler, HandlerError, HandlerRegistry, HandlerResult};

use std::time::Duration;

use tracing::{debug, warn};

use crate::core::{Error, Result};
use crate::protocol::{Command, Link};

/// Event keys understood by the registry
pub mod keys {
    use std::fmt::Display;

    /// Login accepted
    pub const CONNECTED: &str = "connected";
    /// Connection ended
    pub const DISCONNECTED: &str = "disconnected";
    /// Any virtual pin write
    pub const ANY_VIRTUAL_WRITE: &str = "V*";
    /// Any virtual pin read
    pub const ANY_VIRTUAL_READ: &str = "readV*";

    /// Key of writes to one virtual pin, e.g. `V3`
    pub fn virtual_write(pin: impl Display) -> String {
        format!("V{}", pin)
    }

    /// Key of reads of one virtual pin, e.g. `readV3`
    pub fn virtual_read(pin: impl Display) -> String {
        format!("readV{}", pin)
    }

    /// Key of internal messages, e.g. `int_rtc`
    pub fn internal(key: impl Display) -> String {
        format!("int_{}", key)
    }
}

/// Event delivered to a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// The server accepted the login
    Connected {
        /// Time between sending the login and receiving its response
        latency: Duration,
    },
    /// The connection ended
    Disconnected,
    /// The app wrote values to a virtual pin
    VirtualWrite { pin: &'a str, values: &'a [String] },
    /// The app wants the current value of a virtual pin
    VirtualRead { pin: &'a str },
    /// Server pushed internal message
    Internal { key: &'a str, values: &'a [String] },
}

/// Routes one inbound application frame to its handlers.
///
/// Only Hardware, Bridge and Internal frames are application frames; anything else
/// is an error the caller must treat as a protocol violation.
pub(crate) fn route(
    handlers: &mut HandlerRegistry,
    link: &mut Link,
    command: Command,
    fields: &[String],
) -> Result<()> {
    match command {
        Command::Hardware | Command::Bridge => route_hardware(handlers, link, fields),
        Command::Internal => route_internal(handlers, link, fields),
        other => return Err(Error::UnexpectedCommand(other)),
    }
    Ok(())
}

fn route_hardware(handlers: &mut HandlerRegistry, link: &mut Link, fields: &[String]) {
    match fields {
        [kind, pin, values @ ..] if kind == "vw" => {
            let event = Event::VirtualWrite { pin, values };
            handlers.emit(&keys::virtual_write(pin), link, &event);
            handlers.emit(keys::ANY_VIRTUAL_WRITE, link, &event);
        }
        [kind, pin, ..] if kind == "vr" => {
            let event = Event::VirtualRead { pin };
            handlers.emit(&keys::virtual_read(pin), link, &event);
            handlers.emit(keys::ANY_VIRTUAL_READ, link, &event);
        }
        [kind, ..] if kind == "vw" || kind == "vr" => {
            warn!(?fields, "virtual pin message without a pin");
        }
        _ => debug!(?fields, "ignoring hardware message"),
    }
}

fn route_internal(handlers: &mut HandlerRegistry, link: &mut Link, fields: &[String]) {
    match fields {
        [_, key, values @ ..] => {
            let event = Event::Internal { key, values };
            handlers.emit(&keys::internal(key), link, &event);
        }
        _ => warn!(?fields, "internal message without a key"),
    }
}
