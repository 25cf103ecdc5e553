/// Binary protocol framing.
///
/// Every packet is a msgpack unsigned integer holding the payload length,
/// followed by the payload (header map then body map).
use bytes::{Buf, Bytes, BytesMut};
use log::trace;

use crate::iproto::{ProtocolError, Result};

pub const FRAME_MAX_SIZE: usize = 1 << 30;

/// Size of the length prefix and the length it holds, if the buffer has
/// enough bytes to tell.
fn peek_length(buf: &[u8]) -> Result<Option<(usize, u64)>> {
    let Some(&marker) = buf.first() else {
        return Ok(None);
    };
    let prefix_len = match marker {
        0x00..=0x7f => return Ok(Some((1, u64::from(marker)))),
        0xcc => 2,
        0xcd => 3,
        0xce => 5,
        0xcf => 9,
        other => return Err(ProtocolError::InvalidLengthPrefix(other)),
    };
    if buf.len() < prefix_len {
        return Ok(None);
    }
    let mut be = [0u8; 8];
    be[8 - (prefix_len - 1)..].copy_from_slice(&buf[1..prefix_len]);
    Ok(Some((prefix_len, u64::from_be_bytes(be))))
}

/// Buffers incoming bytes and extracts complete frames.
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
        }
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Exposes the buffer so a socket can read straight into it.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Returns the payload of the next complete frame, if any.
    pub fn decode_frame(&mut self) -> Result<Option<Bytes>> {
        let Some((prefix_len, frame_len)) = peek_length(&self.buffer)? else {
            return Ok(None);
        };
        if frame_len > FRAME_MAX_SIZE as u64 {
            return Err(ProtocolError::FrameTooLarge {
                max: FRAME_MAX_SIZE,
                got: frame_len,
            });
        }
        let frame_len = frame_len as usize;

        if self.buffer.len() >= prefix_len + frame_len {
            self.buffer.advance(prefix_len);
            let frame_data = self.buffer.split_to(frame_len).freeze();
            trace!("<-- Decoded frame: {} bytes", frame_data.len());
            Ok(Some(frame_data))
        } else {
            Ok(None)
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
