//! WebSocket frame parsing and serialization
//!
//! Frames follow RFC 6455. Parsing is lenient about protocol rules so that a
//! violating frame can still be consumed from the input and reported through
//! its error code; [`Frame::validate_client`] applies the rules separately.

use crate::{
    error::{FrameError, Result},
    protocol::{frame::*, utils, Opcode},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Represents a WebSocket frame according to RFC 6455
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Indicates if this is the final frame in a message
    pub fin: bool,
    /// Reserved bits (RSV1, RSV2, RSV3)
    pub rsv: [bool; 3],
    /// Frame opcode
    pub opcode: Opcode,
    /// Indicates if the payload was masked on the wire
    pub masked: bool,
    /// Masking key (if present)
    pub mask: Option<[u8; 4]>,
    /// Payload data, always unmasked
    pub payload: Bytes,
    /// Close code describing why the framer rejected this frame
    pub error_code: Option<u16>,
}

impl Frame {
    /// Create a new final frame with the given opcode and payload
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            rsv: [false; 3],
            opcode,
            masked: false,
            mask: None,
            payload: payload.into(),
            error_code: None,
        }
    }

    /// Create a continuation frame
    pub fn continuation(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Continuation, payload)
    }

    /// Create a text frame
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Text, payload)
    }

    /// Create a binary frame
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, payload)
    }

    /// Create a close frame with optional code and reason
    pub fn close(code: Option<u16>, reason: Option<&str>) -> Self {
        let mut payload = BytesMut::new();

        if let Some(code) = code {
            payload.put_slice(&utils::close_code_bytes(code));
        }

        if let Some(reason) = reason {
            payload.put_slice(reason.as_bytes());
        }

        Self::new(Opcode::Close, payload.freeze())
    }

    /// Create a ping frame
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Ping, payload)
    }

    /// Create a pong frame
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// Set the FIN bit
    pub fn fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Mark the frame as rejected with the given close code
    pub fn with_error(mut self, code: u16) -> Self {
        self.error_code = Some(code);
        self
    }

    /// Mask the payload with a fixed key, as a client would
    pub fn masked_with(mut self, mask: [u8; 4]) -> Self {
        self.masked = true;
        self.mask = Some(mask);
        self
    }

    /// Serialize the frame to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 14);
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Write the frame to a buffer
    pub fn write_to(&self, buf: &mut BytesMut) {
        let first_byte = ((self.fin as u8) << 7)
            | ((self.rsv[0] as u8) << 6)
            | ((self.rsv[1] as u8) << 5)
            | ((self.rsv[2] as u8) << 4)
            | self.opcode.value();
        buf.put_u8(first_byte);

        let payload_len = self.payload.len();
        let mask_bit = if self.mask.is_some() { MASK_BIT } else { 0 };

        if payload_len < 126 {
            buf.put_u8(mask_bit | payload_len as u8);
        } else if payload_len <= u16::MAX as usize {
            buf.put_u8(mask_bit | PAYLOAD_LEN_16);
            buf.put_u16(payload_len as u16);
        } else {
            buf.put_u8(mask_bit | PAYLOAD_LEN_64);
            buf.put_u64(payload_len as u64);
        }

        match self.mask {
            Some(mask) => {
                buf.put_slice(&mask);
                buf.extend(self.payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
            }
            None => buf.put_slice(&self.payload),
        }
    }

    /// Parse one frame from the front of `buf`, advancing past it on success
    ///
    /// Returns [`FrameError::InsufficientData`] without consuming anything when
    /// the frame is incomplete, and [`FrameError::TooLarge`] as soon as the
    /// declared payload length exceeds `max_payload`.
    pub fn parse(buf: &mut BytesMut, max_payload: usize) -> Result<Self> {
        let (header_len, payload_len) = Self::peek_lengths(buf)?;

        if payload_len > max_payload {
            return Err(FrameError::TooLarge {
                size: payload_len,
                max: max_payload,
            }
            .into());
        }

        let total = header_len + payload_len;
        if buf.len() < total {
            return Err(FrameError::InsufficientData {
                needed: total,
                have: buf.len(),
            }
            .into());
        }

        let first_byte = buf[0];
        let masked = (buf[1] & MASK_BIT) != 0;
        let mask = if masked {
            let at = header_len - MASKING_KEY_LEN;
            Some([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
        } else {
            None
        };

        buf.advance(header_len);
        let raw = buf.split_to(payload_len);
        let payload = match mask {
            Some(mask) => mask_bytes(&raw, &mask),
            None => raw.freeze(),
        };

        Ok(Frame {
            fin: (first_byte & FIN_BIT) != 0,
            rsv: [
                (first_byte & RSV1_BIT) != 0,
                (first_byte & RSV2_BIT) != 0,
                (first_byte & RSV3_BIT) != 0,
            ],
            opcode: Opcode::from_bits(first_byte),
            masked,
            mask,
            payload,
            error_code: None,
        })
    }

    /// Header length and declared payload length of the frame at the front of `buf`
    fn peek_lengths(buf: &[u8]) -> Result<(usize, usize)> {
        if buf.len() < 2 {
            return Err(FrameError::InsufficientData {
                needed: 2,
                have: buf.len(),
            }
            .into());
        }

        let masked = (buf[1] & MASK_BIT) != 0;
        let mut cursor = &buf[2..];
        let (ext_len, payload_len) = match buf[1] & PAYLOAD_LEN_MASK {
            PAYLOAD_LEN_16 => {
                if cursor.len() < 2 {
                    return Err(FrameError::InsufficientData {
                        needed: 4,
                        have: buf.len(),
                    }
                    .into());
                }
                (2, cursor.get_u16() as usize)
            }
            PAYLOAD_LEN_64 => {
                if cursor.len() < 8 {
                    return Err(FrameError::InsufficientData {
                        needed: 10,
                        have: buf.len(),
                    }
                    .into());
                }
                let len = cursor.get_u64();
                (8, usize::try_from(len).unwrap_or(usize::MAX))
            }
            len => (0, len as usize),
        };

        let mask_len = if masked { MASKING_KEY_LEN } else { 0 };
        Ok((2 + ext_len + mask_len, payload_len))
    }

    /// Check the rules RFC 6455 places on frames sent by a client
    pub fn validate_client(&self) -> std::result::Result<(), FrameError> {
        if self.rsv.iter().any(|bit| *bit) {
            return Err(FrameError::ReservedBitsSet);
        }

        if !self.masked {
            return Err(FrameError::Unmasked);
        }

        if self.opcode.is_control() && !self.fin {
            return Err(FrameError::FragmentedControlFrame);
        }

        if self.opcode == Opcode::Text && self.fin && std::str::from_utf8(&self.payload).is_err() {
            return Err(FrameError::InvalidUtf8);
        }

        Ok(())
    }

    /// Get the payload length
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Check if this is a control frame
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// Check if this is a data frame
    pub fn is_data(&self) -> bool {
        self.opcode.is_data()
    }

    /// Check if this is the final frame
    pub fn is_final(&self) -> bool {
        self.fin
    }
}

/// Apply masking to bytes
fn mask_bytes(data: &[u8], mask: &[u8; 4]) -> Bytes {
    let mut masked = BytesMut::with_capacity(data.len());
    for (i, &byte) in data.iter().enumerate() {
        masked.put_u8(byte ^ mask[i % 4]);
    }
    masked.freeze()
}
