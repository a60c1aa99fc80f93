//! Error types for Tidewire
//!
//! This module defines the error types shared by the wire-level pieces of the
//! engine: frame parsing, HTTP head parsing, handshakes and configuration.

#![allow(missing_docs)]

use thiserror::Error;

/// Result type alias for Tidewire core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for Tidewire core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Frame errors
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// HTTP message errors
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(#[from] TimeoutError),

    /// Generic errors
    #[error("Error: {0}")]
    Other(String),
}

/// Upgrade and handshake level protocol errors
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    /// Missing required headers
    #[error("Missing required header: {0}")]
    MissingHeader(String),
}

/// Frame parsing and processing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Insufficient data to parse frame
    #[error("Insufficient data: need {needed} bytes, have {have}")]
    InsufficientData { needed: usize, have: usize },

    /// Frame too large
    #[error("Frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// Reserved bits set
    #[error("Reserved bits set in frame")]
    ReservedBitsSet,

    /// Client frames must be masked
    #[error("Client frame is not masked")]
    Unmasked,

    /// Control frames cannot be fragmented
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Invalid UTF-8 in a text message
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,
}

impl FrameError {
    /// RFC 6455 close code a peer should receive for this violation
    pub fn close_code(&self) -> u16 {
        match self {
            FrameError::TooLarge { .. } => close_code::MESSAGE_TOO_BIG,
            FrameError::InvalidUtf8 => close_code::INVALID_PAYLOAD,
            _ => close_code::PROTOCOL_ERROR,
        }
    }
}

/// RFC 6455 close codes the engine sends
pub mod close_code {
    /// Protocol error
    pub const PROTOCOL_ERROR: u16 = 1002;

    /// Invalid frame payload data
    pub const INVALID_PAYLOAD: u16 = 1007;

    /// Message too big
    pub const MESSAGE_TOO_BIG: u16 = 1009;
}

/// HTTP message errors
#[derive(Error, Debug, Clone)]
pub enum HttpError {
    /// Request head could not be parsed
    #[error("Malformed request head: {0}")]
    MalformedHead(String),

    /// Request head exceeds the configured limit
    #[error("Request head too large: more than {max} bytes")]
    HeadTooLarge { max: usize },

    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Content-Length header is not a number
    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Missing required configuration
    #[error("Missing required configuration: {field}")]
    MissingField { field: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Timeout errors
#[derive(Error, Debug, Clone)]
pub enum TimeoutError {
    /// Nothing was read from the peer within the read timeout
    #[error("Read timeout: {timeout:?}")]
    Read { timeout: std::time::Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_close_codes() {
        assert_eq!(FrameError::ReservedBitsSet.close_code(), 1002);
        assert_eq!(FrameError::Unmasked.close_code(), 1002);
        assert_eq!(FrameError::InvalidUtf8.close_code(), 1007);
        assert_eq!(FrameError::TooLarge { size: 10, max: 5 }.close_code(), 1009);
    }

    #[test]
    fn test_error_display() {
        let err = Error::Http(HttpError::HeadTooLarge { max: 8192 });
        assert!(err.to_string().contains("8192"));

        let err = Error::from(TimeoutError::Read {
            timeout: std::time::Duration::from_secs(30),
        });
        assert_eq!(err.to_string(), "Timeout error: Read timeout: 30s");
    }
}
