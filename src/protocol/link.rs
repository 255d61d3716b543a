use bytes::{Bytes, BytesMut};
use tokio_util::codec::Encoder;
use tracing::debug;

use super::codec::{Frame, FrameCodec};
use super::heartbeat::Timing;
use super::message::Message;
use super::{Command, Status};
use crate::core::Result;

/// Outbound sequence ids: 1..=65535, wrapping back to 1. Zero is never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceCounter {
    next: u16,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        SequenceCounter { next: 1 }
    }
}

impl SequenceCounter {
    /// Returns the next id and advances the counter
    pub fn next_id(&mut self) -> u16 {
        let id = self.next;
        self.next = if id == u16::MAX { 1 } else { id + 1 };
        id
    }

    /// Id the next call to `next_id` will return
    #[cfg(test)]
    pub(crate) fn peek(&self) -> u16 {
        self.next
    }

    pub fn reset(&mut self) {
        self.next = 1;
    }
}

/// Outbound side of a connection.
///
/// Handlers receive a `&mut Link` so they can answer synchronously. Frames are
/// encoded into an output buffer that the connection loop writes to the socket.
#[derive(Debug)]
pub struct Link {
    codec: FrameCodec,
    sequence: SequenceCounter,
    output: BytesMut,
    now: u64,
    pub(crate) timing: Timing,
}

impl Link {
    pub(crate) fn new(codec: FrameCodec) -> Self {
        Link {
            codec,
            sequence: SequenceCounter::default(),
            output: BytesMut::new(),
            now: 0,
            timing: Timing::default(),
        }
    }

    /// Starts a new transport session at `now`
    pub(crate) fn reset(&mut self, now: u64) {
        self.sequence.reset();
        self.output.clear();
        self.now = now;
        self.timing = Timing::opened(now);
    }

    pub(crate) fn set_now(&mut self, now: u64) {
        self.now = now;
    }

    /// Timing state of the current session
    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Sends an application message with a fresh sequence id
    pub fn send(&mut self, message: Message) -> Result<u16> {
        self.send_fields(message.command(), message.fields())
    }

    /// Sends a frame of `command` with a fresh sequence id
    pub(crate) fn send_fields<I, S>(&mut self, command: Command, fields: I) -> Result<u16>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let id = self.sequence.next_id();
        self.write(Frame::message(command, id, fields))?;
        Ok(id)
    }

    /// Answers the frame `id` with a status
    pub(crate) fn respond(&mut self, id: u16, status: Status) -> Result<()> {
        self.write(Frame::response(id, status))
    }

    fn write(&mut self, frame: Frame) -> Result<()> {
        debug!(command = ?frame.command(), id = frame.id(), "sending frame");
        self.codec.encode(frame, &mut self.output)?;
        self.timing.last_send = self.now;
        Ok(())
    }

    /// Writes values to a virtual pin
    pub fn virtual_write<P, I, V>(&mut self, pin: P, values: I) -> Result<u16>
    where
        P: ToString,
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.send(Message::virtual_write(pin, values))
    }

    /// Asks the server to push the stored values of `pins`
    pub fn sync_virtual<I, P>(&mut self, pins: I) -> Result<u16>
    where
        I: IntoIterator<Item = P>,
        P: ToString,
    {
        self.send(Message::sync_virtual(pins))
    }

    /// Sets a widget property of a pin
    pub fn set_property<P, I, V>(&mut self, pin: P, property: &str, values: I) -> Result<u16>
    where
        P: ToString,
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.send(Message::set_property(pin, property, values))
    }

    pub fn notify(&mut self, text: impl Into<String>) -> Result<u16> {
        self.send(Message::Notify(text.into()))
    }

    pub fn tweet(&mut self, text: impl Into<String>) -> Result<u16> {
        self.send(Message::Tweet(text.into()))
    }

    pub fn email(
        &mut self,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<u16> {
        self.send(Message::Email {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        })
    }

    pub fn log_event(&mut self, name: impl Into<String>, description: Option<&str>) -> Result<u16> {
        self.send(Message::LogEvent {
            name: name.into(),
            description: description.map(str::to_owned),
        })
    }

    /// Bytes encoded but not yet written to the transport
    #[cfg(test)]
    pub(crate) fn pending(&self) -> &[u8] {
        &self.output
    }

    /// Hands the encoded bytes to the transport
    pub(crate) fn take_output(&mut self) -> Bytes {
        self.output.split().freeze()
    }
}
