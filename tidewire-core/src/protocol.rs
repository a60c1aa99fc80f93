//! Protocol constants and utilities
//!
//! This module contains the fundamental protocol definitions from RFC 6455 and
//! the HTTP/1.1 header vocabulary the engine speaks, including opcodes, frame
//! header bits, and protocol constants.

/// WebSocket opcodes as defined in RFC 6455 Section 5.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Continuation frame
    Continuation = 0x0,
    /// Text frame
    Text = 0x1,
    /// Binary frame
    Binary = 0x2,
    /// Reserved for future use
    Reserved3 = 0x3,
    /// Reserved for future use
    Reserved4 = 0x4,
    /// Reserved for future use
    Reserved5 = 0x5,
    /// Reserved for future use
    Reserved6 = 0x6,
    /// Reserved for future use
    Reserved7 = 0x7,
    /// Close frame
    Close = 0x8,
    /// Ping frame
    Ping = 0x9,
    /// Pong frame
    Pong = 0xA,
    /// Reserved for future use
    ReservedB = 0xB,
    /// Reserved for future use
    ReservedC = 0xC,
    /// Reserved for future use
    ReservedD = 0xD,
    /// Reserved for future use
    ReservedE = 0xE,
    /// Reserved for future use
    ReservedF = 0xF,
}

impl Opcode {
    /// Create an Opcode from a u8, `None` for opcodes RFC 6455 does not define
    pub fn from(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    /// Map any 4-bit value onto an opcode, reserved values included
    pub fn from_bits(value: u8) -> Self {
        match value & frame::OPCODE_MASK {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x3 => Opcode::Reserved3,
            0x4 => Opcode::Reserved4,
            0x5 => Opcode::Reserved5,
            0x6 => Opcode::Reserved6,
            0x7 => Opcode::Reserved7,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            0xB => Opcode::ReservedB,
            0xC => Opcode::ReservedC,
            0xD => Opcode::ReservedD,
            0xE => Opcode::ReservedE,
            _ => Opcode::ReservedF,
        }
    }

    /// Get the numeric value of the opcode
    pub fn value(&self) -> u8 {
        *self as u8
    }

    /// Check if this is a control opcode
    pub fn is_control(&self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    /// Check if this is a data opcode
    pub fn is_data(&self) -> bool {
        matches!(self, Opcode::Text | Opcode::Binary | Opcode::Continuation)
    }

    /// Check if this is a reserved opcode
    pub fn is_reserved(&self) -> bool {
        !self.is_control() && !self.is_data()
    }
}

/// Protocol constants
pub mod constants {
    /// WebSocket GUID appended to the client key before hashing
    pub const WEBSOCKET_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

    /// Default maximum frame payload size
    pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB

    /// Default maximum HTTP request head size
    pub const MAX_HEADER_SIZE: usize = 8192; // 8KB

    /// Maximum number of headers parsed from one request
    pub const MAX_HEADERS: usize = 64;

    /// Value stamped into the `Server` header unless configured otherwise
    pub const SERVER_IDENTITY: &str = concat!("Tidewire/", env!("CARGO_PKG_VERSION"));
}

/// Frame header bit layout
pub mod frame {
    /// FIN bit
    pub const FIN_BIT: u8 = 0x80;

    /// RSV1 bit
    pub const RSV1_BIT: u8 = 0x40;

    /// RSV2 bit
    pub const RSV2_BIT: u8 = 0x20;

    /// RSV3 bit
    pub const RSV3_BIT: u8 = 0x10;

    /// Opcode mask
    pub const OPCODE_MASK: u8 = 0x0F;

    /// Mask bit
    pub const MASK_BIT: u8 = 0x80;

    /// Payload length mask
    pub const PAYLOAD_LEN_MASK: u8 = 0x7F;

    /// 16-bit extended payload length marker
    pub const PAYLOAD_LEN_16: u8 = 126;

    /// 64-bit extended payload length marker
    pub const PAYLOAD_LEN_64: u8 = 127;

    /// Masking key length
    pub const MASKING_KEY_LEN: usize = 4;
}

/// HTTP header names, in the casing written to the wire
pub mod http_header {
    /// Connection header
    pub const CONNECTION: &str = "Connection";

    /// Upgrade header
    pub const UPGRADE: &str = "Upgrade";

    /// Server header
    pub const SERVER: &str = "Server";

    /// Accept-Encoding header
    pub const ACCEPT_ENCODING: &str = "Accept-Encoding";

    /// Content-Encoding header
    pub const CONTENT_ENCODING: &str = "Content-Encoding";

    /// Content-Length header
    pub const CONTENT_LENGTH: &str = "Content-Length";

    /// Content-Type header
    pub const CONTENT_TYPE: &str = "Content-Type";

    /// WebSocket key header
    pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";

    /// WebSocket accept header
    pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";
}

/// Common HTTP header values
pub mod http_value {
    /// WebSocket upgrade target
    pub const WEBSOCKET: &str = "websocket";

    /// Cleartext HTTP/2 upgrade target
    pub const H2C: &str = "h2c";

    /// Upgrade connection value
    pub const UPGRADE: &str = "Upgrade";

    /// Keep-alive connection value
    pub const KEEP_ALIVE: &str = "keep-alive";

    /// Gzip content coding
    pub const GZIP: &str = "gzip";

    /// Plain text content type
    pub const TEXT_PLAIN: &str = "text/plain";
}

/// Utility functions for protocol operations
pub mod utils {
    use base64::{engine::general_purpose, Engine as _};
    use sha1::{Digest, Sha1};

    /// Compute WebSocket accept key
    pub fn calculate_accept(key: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(key.as_bytes());
        hasher.update(super::constants::WEBSOCKET_MAGIC.as_bytes());
        general_purpose::STANDARD.encode(hasher.finalize())
    }

    /// Encode a close code the way CLOSE payloads carry it
    pub fn close_code_bytes(code: u16) -> [u8; 2] {
        code.to_be_bytes()
    }

    /// Decode the close code prefix of a CLOSE payload
    pub fn read_close_code(payload: &[u8]) -> Option<u16> {
        match payload {
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }
}
