//! Pending input for one connection.
//!
//! Bytes are appended as they arrive from the socket and trimmed from the front as
//! frames are decoded. A partial frame stays buffered until the rest arrives.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use super::codec::{Frame, FrameCodec};
use crate::core::Result;

/// Accumulates transport bytes and yields complete frames
#[derive(Debug)]
pub struct ReceiveBuffer {
    codec: FrameCodec,
    pending: BytesMut,
}

impl ReceiveBuffer {
    pub fn new(codec: FrameCodec) -> Self {
        ReceiveBuffer {
            codec,
            pending: BytesMut::with_capacity(codec.max_payload()),
        }
    }

    /// Appends freshly received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Takes the next complete frame off the front, if there is one
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.codec.decode(&mut self.pending)
    }

    /// Drops everything buffered
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, Status};
    use tokio_util::codec::Encoder;

    fn wire(frames: &[Frame]) -> BytesMut {
        let mut codec = FrameCodec::default();
        let mut bytes = BytesMut::new();
        for frame in frames {
            codec.encode(frame.clone(), &mut bytes).unwrap();
        }
        bytes
    }

    #[test]
    fn test_byte_at_a_time() {
        let frame = Frame::message(Command::Hardware, 9, ["vw", "3", "42"]);
        let bytes = wire(&[frame.clone()]);
        let mut buffer = ReceiveBuffer::new(FrameCodec::default());

        for (i, byte) in bytes.iter().enumerate() {
            buffer.extend(&[*byte]);
            let decoded = buffer.next_frame().unwrap();
            if i + 1 < bytes.len() {
                assert!(decoded.is_none(), "frame yielded after {} bytes", i + 1);
            } else {
                assert_eq!(decoded, Some(frame.clone()));
            }
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_with_trailing_partial() {
        let first = Frame::response(1, Status::success());
        let second = Frame::message(Command::Ping, 2, Vec::<String>::new());
        let third = Frame::message(Command::Internal, 3, ["rcv", "ota", "url"]);
        let bytes = wire(&[first.clone(), second.clone(), third.clone()]);
        let split = bytes.len() - 4;

        let mut buffer = ReceiveBuffer::new(FrameCodec::default());
        buffer.extend(&bytes[..split]);
        assert_eq!(buffer.next_frame().unwrap(), Some(first));
        assert_eq!(buffer.next_frame().unwrap(), Some(second));
        assert_eq!(buffer.next_frame().unwrap(), None);
        assert_eq!(buffer.len(), third.encoded_len() - 4);

        buffer.extend(&bytes[split..]);
        assert_eq!(buffer.next_frame().unwrap(), Some(third));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut buffer = ReceiveBuffer::new(FrameCodec::default());
        buffer.extend(&[20, 0, 1]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.next_frame().unwrap(), None);
    }
}
