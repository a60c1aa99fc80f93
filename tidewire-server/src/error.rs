//! Error handling for the protocol engine
//!
//! Every failure that reaches the engine is a [`ServerError`]. Its
//! [`ErrorClass`] decides what happens next. Malformed input is answered on
//! the wire, transport failures are logged before the session closes, and
//! read timeouts or peers going away close it silently.

use std::io;
use tidewire_core::error::Error;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server-specific errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Handler error
    #[error("Handler error: {0}")]
    Handler(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] Error),
}

/// Connection errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Connection limit exceeded
    #[error("Connection limit exceeded: {current}/{max}")]
    LimitExceeded {
        /// Live sessions at the time
        current: usize,
        /// Configured maximum
        max: usize,
    },
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Accept failed
    #[error("Failed to accept connection: {0}")]
    AcceptFailed(String),

    /// Bind failed
    #[error("Failed to bind to address: {0}")]
    BindFailed(String),

    /// Write failed
    #[error("Write failed: {0}")]
    WriteFailed(String),
}

/// How the engine reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeouts and peers going away: close without logging
    Benign,
    /// Malformed input: answered on the wire
    Protocol,
    /// Everything else: log and close
    Transport,
}

impl ServerError {
    /// Classify the error
    pub fn class(&self) -> ErrorClass {
        match self {
            ServerError::Core(Error::Timeout(_)) => ErrorClass::Benign,
            ServerError::Io(err) if is_benign_io(err.kind()) => ErrorClass::Benign,
            ServerError::Core(Error::Io(err)) if is_benign_io(err.kind()) => ErrorClass::Benign,
            ServerError::Core(Error::Protocol(_))
            | ServerError::Core(Error::Frame(_))
            | ServerError::Core(Error::Http(_)) => ErrorClass::Protocol,
            _ => ErrorClass::Transport,
        }
    }

    /// Whether the error should be swallowed without logging
    pub fn is_benign(&self) -> bool {
        self.class() == ErrorClass::Benign
    }
}

fn is_benign_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Core(err) => err,
            ServerError::Io(err) => Error::Io(err),
            other => Error::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tidewire_core::error::{FrameError, TimeoutError};

    #[test]
    fn test_error_classes() {
        let timeout = ServerError::Core(Error::Timeout(TimeoutError::Read {
            timeout: Duration::from_secs(5),
        }));
        assert!(timeout.is_benign());

        let reset = ServerError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(reset.is_benign());

        let frame = ServerError::Core(Error::Frame(FrameError::ReservedBitsSet));
        assert_eq!(frame.class(), ErrorClass::Protocol);

        let handler = ServerError::Handler("boom".to_string());
        assert_eq!(handler.class(), ErrorClass::Transport);

        let denied = ServerError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.class(), ErrorClass::Transport);
    }

    #[test]
    fn test_into_core_error() {
        let err: Error = ServerError::Handler("boom".to_string()).into();
        assert!(matches!(err, Error::Other(msg) if msg.contains("boom")));

        let err: Error = ServerError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).into();
        assert!(matches!(err, Error::Io(_)));
    }
}
