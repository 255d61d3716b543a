use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Command, Status, HEADER_LEN};
use crate::core::{Error, Result, DEFAULT_BUFFER_SIZE};

/// Field separator inside a payload
const FIELD_SEPARATOR: u8 = 0;

/// One complete protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Header-only reply; the length slot carries a status code
    Response { id: u16, status: Status },
    /// Any other command with a NUL separated text payload
    Message { command: Command, id: u16, body: Bytes },
}

impl Frame {
    /// Builds a response frame
    pub fn response(id: u16, status: Status) -> Self {
        Frame::Response { id, status }
    }

    /// Builds a message frame by joining `fields` with NUL bytes
    pub fn message<I, S>(command: Command, id: u16, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut body = BytesMut::new();
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                body.put_u8(FIELD_SEPARATOR);
            }
            body.extend_from_slice(field.as_ref().as_bytes());
        }
        Frame::Message {
            command,
            id,
            body: body.freeze(),
        }
    }

    pub fn command(&self) -> Command {
        match self {
            Frame::Response { .. } => Command::Response,
            Frame::Message { command, .. } => *command,
        }
    }

    pub fn id(&self) -> u16 {
        match self {
            Frame::Response { id, .. } | Frame::Message { id, .. } => *id,
        }
    }

    /// Splits the payload into its text fields. An empty payload has no fields.
    pub fn fields(&self) -> Result<Vec<String>> {
        let body = match self {
            Frame::Response { .. } => return Ok(Vec::new()),
            Frame::Message { body, .. } => body,
        };
        if body.is_empty() {
            return Ok(Vec::new());
        }
        body.split(|b| *b == FIELD_SEPARATOR)
            .map(|field| {
                std::str::from_utf8(field)
                    .map(str::to_owned)
                    .map_err(|e| Error::protocol(format!("Payload field is not UTF-8: {}", e)))
            })
            .collect()
    }

    /// Bytes this frame occupies on the wire
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Response { .. } => HEADER_LEN,
            Frame::Message { body, .. } => HEADER_LEN + body.len(),
        }
    }
}

/// Attempts to read one frame from the front of `src`.
///
/// Returns the frame and the number of bytes it occupied, or `None` when more bytes
/// are needed. Payloads of `limit` bytes or more are rejected before they are buffered.
pub fn try_decode(src: &[u8], limit: usize) -> Result<Option<(Frame, usize)>> {
    if src.len() < HEADER_LEN {
        return Ok(None);
    }

    let mut header = &src[..HEADER_LEN];
    let command = Command::try_from(header.get_u8())?;
    let id = header.get_u16();
    let length = header.get_u16();

    if command == Command::Response {
        return Ok(Some((Frame::response(id, Status(length)), HEADER_LEN)));
    }

    let length = length as usize;
    if length >= limit {
        return Err(Error::FrameTooLarge { length, limit });
    }
    if src.len() < HEADER_LEN + length {
        return Ok(None);
    }

    let body = Bytes::copy_from_slice(&src[HEADER_LEN..HEADER_LEN + length]);
    Ok(Some((Frame::Message { command, id, body }, HEADER_LEN + length)))
}

/// Frame codec for the Blynk wire format
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new(DEFAULT_BUFFER_SIZE)
    }
}

impl FrameCodec {
    /// Creates a codec rejecting inbound payloads of `max_payload` bytes or more
    pub fn new(max_payload: usize) -> Self {
        FrameCodec { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match try_decode(src, self.max_payload)? {
            Some((frame, consumed)) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            None => {
                // Room for the rest of a partially received frame
                if src.len() >= HEADER_LEN {
                    let length = u16::from_be_bytes([src[3], src[4]]) as usize;
                    src.reserve(HEADER_LEN + length - src.len());
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        match item {
            Frame::Response { id, status } => {
                dst.reserve(HEADER_LEN);
                dst.put_u8(Command::Response.id());
                dst.put_u16(id);
                dst.put_u16(status.code());
            }
            Frame::Message { command, id, body } => {
                if command == Command::Response {
                    return Err(Error::protocol("Response frames carry a status, not a payload"));
                }
                let length = u16::try_from(body.len()).map_err(|_| Error::FrameTooLarge {
                    length: body.len(),
                    limit: u16::MAX as usize,
                })?;
                dst.reserve(HEADER_LEN + body.len());
                dst.put_u8(command.id());
                dst.put_u16(id);
                dst.put_u16(length);
                dst.extend_from_slice(&body);
            }
        }
        Ok(())
    }
}
