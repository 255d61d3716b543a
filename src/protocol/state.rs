use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use super::buffer::ReceiveBuffer;
use super::codec::{Frame, FrameCodec};
use super::heartbeat::{self, Timing, Verdict};
use super::link::Link;
use super::message::Message;
use super::{Command, Status, DEVICE_TYPE, PROTOCOL_VERSION};
use crate::core::{Config, Error, Result};
use crate::dispatch::{self, keys, Event, HandlerRegistry};

/// Sequence id of the login frame and of its response
const LOGIN_ID: u16 = 1;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; inbound bytes are ignored
    Disconnected,
    /// Login sent, waiting for its response
    Connecting,
    /// Login accepted
    Connected,
}

impl ConnectionState {
    /// Whether frames are processed in this state
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

/// Connection state machine for one logical session.
///
/// The session never touches a socket. The caller feeds it received bytes together
/// with a monotonic millisecond clock, and writes out whatever `take_output` returns.
/// Counters, timing and pending input are reset by every `open`; the handler
/// registry is kept across reconnects.
#[derive(Debug)]
pub struct Session {
    /// Auth token sent at login
    auth: String,
    /// Heartbeat interval in ms
    heartbeat: u64,
    /// Inbound buffer size announced to the server
    buffer_size: usize,
    /// Current state
    state: ConnectionState,
    /// Outbound side, shared with handlers
    link: Link,
    /// Bytes received but not yet decoded
    inbound: ReceiveBuffer,
    /// Application handlers
    handlers: HandlerRegistry,
    /// Login round trip of the current connection
    latency: Option<Duration>,
}

impl Session {
    /// Creates a disconnected session
    pub fn new(config: &Config, handlers: HandlerRegistry) -> Self {
        let codec = FrameCodec::new(config.buffer_size);
        Session {
            auth: config.auth.clone(),
            heartbeat: config.heartbeat_millis(),
            buffer_size: config.buffer_size,
            state: ConnectionState::Disconnected,
            link: Link::new(codec),
            inbound: ReceiveBuffer::new(codec),
            handlers,
            latency: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Handshake latency of the current connection, once connected
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    pub fn timing(&self) -> Timing {
        self.link.timing()
    }

    /// Handlers of this session; changes apply to the next dispatched frame
    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    /// Starts a connection on a freshly opened transport and queues the login frame
    pub fn open(&mut self, now: u64) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            return Err(Error::invalid_state(format!(
                "cannot open a session that is {:?}",
                self.state
            )));
        }

        self.link.reset(now);
        self.inbound.clear();
        self.latency = None;
        self.state = ConnectionState::Connecting;
        info!("logging in");
        self.link.send_fields(Command::HardwareLogin, [self.auth.as_str()])?;
        Ok(())
    }

    /// Sends an application message on behalf of the caller
    pub fn send(&mut self, now: u64, message: Message) -> Result<u16> {
        if !self.state.is_active() {
            return Err(Error::invalid_state("cannot send while disconnected"));
        }
        self.link.set_now(now);
        self.link.send(message)
    }

    /// Closes the session. Safe to call in any state.
    pub fn close(&mut self) {
        self.disconnect("closed by application");
    }

    /// Records that the transport failed underneath the session
    pub fn transport_lost(&mut self) {
        self.disconnect("transport failure");
    }

    /// Bytes to write to the transport
    pub fn take_output(&mut self) -> Bytes {
        self.link.take_output()
    }

    /// Runs one tick: heartbeat evaluation, then every complete frame in `data`
    /// and the bytes left over from previous ticks.
    ///
    /// Returns an error for protocol violations and login rejection; the session
    /// is already disconnected when it does. A heartbeat timeout disconnects
    /// without an error.
    pub fn process(&mut self, now: u64, data: &[u8]) -> Result<()> {
        if !self.state.is_active() {
            return Ok(());
        }
        self.link.set_now(now);

        match heartbeat::check(&self.link.timing, self.heartbeat, now) {
            Verdict::Expired => {
                warn!(
                    since_receive = now.saturating_sub(self.link.timing.last_receive),
                    "heartbeat timeout"
                );
                self.disconnect("heartbeat timeout");
                return Ok(());
            }
            Verdict::PingDue => {
                self.link.send_fields(Command::Ping, std::iter::empty::<&str>())?;
                self.link.timing.last_ping = now;
            }
            Verdict::Idle => {}
        }

        self.inbound.extend(data);

        while self.state.is_active() {
            let frame = match self.inbound.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => return self.fail(e),
            };
            if frame.id() == 0 {
                return self.fail(Error::SessionKilled);
            }
            self.link.timing.last_receive = now;
            self.handle_frame(now, frame)?;
        }

        Ok(())
    }

    fn handle_frame(&mut self, now: u64, frame: Frame) -> Result<()> {
        match frame {
            Frame::Response { id, status } => self.handle_response(now, id, status),
            Frame::Message {
                command: Command::Ping,
                id,
                ..
            } => {
                debug!(id, "answering ping");
                self.link.respond(id, Status::success())
            }
            frame => {
                let command = frame.command();
                let fields = match frame.fields() {
                    Ok(fields) => fields,
                    Err(e) => return self.fail(e),
                };
                debug!(?command, id = frame.id(), ?fields, "received frame");
                match dispatch::route(&mut self.handlers, &mut self.link, command, &fields) {
                    Ok(()) => Ok(()),
                    Err(e) => self.fail(e),
                }
            }
        }
    }

    fn handle_response(&mut self, now: u64, id: u16, status: Status) -> Result<()> {
        if self.state != ConnectionState::Connecting || id != LOGIN_ID {
            debug!(id, status = status.code(), "ignoring response");
            return Ok(());
        }

        if !status.is_success() {
            if status.code() == Status::INVALID_TOKEN {
                error!("invalid auth token");
            } else {
                warn!(status = status.code(), "login rejected");
            }
            self.disconnect("login rejected");
            return Err(Error::handshake(status.code()));
        }

        let latency = Duration::from_millis(now.saturating_sub(self.link.timing.last_send));
        self.state = ConnectionState::Connected;
        self.latency = Some(latency);
        info!(latency_ms = latency.as_millis() as u64, "connected");

        let heartbeat = (self.heartbeat / 1000).to_string();
        let buffer_size = self.buffer_size.to_string();
        self.link.send_fields(
            Command::Internal,
            [
                "ver",
                PROTOCOL_VERSION,
                "h-beat",
                heartbeat.as_str(),
                "buff-in",
                buffer_size.as_str(),
                "dev",
                DEVICE_TYPE,
            ],
        )?;

        self.handlers
            .emit(keys::CONNECTED, &mut self.link, &Event::Connected { latency });
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Result<()> {
        error!(error = %err, "protocol violation");
        self.disconnect("protocol violation");
        Err(err)
    }

    fn disconnect(&mut self, reason: &str) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        info!(reason, "disconnected");
        self.state = ConnectionState::Disconnected;
        self.inbound.clear();
        self.latency = None;
        self.handlers
            .emit(keys::DISCONNECTED, &mut self.link, &Event::Disconnected);
        // the transport is gone; nothing queued can be delivered
        self.link.take_output();
    }
}
