//! Prelude module for Tidewire Core
//!
//! This module re-exports commonly used types and traits to make them
//! easily accessible for users of the library.

pub use crate::context::{ProtocolState, SessionContext};
pub use crate::error::{Error, Result};
pub use crate::frame::Frame;
pub use crate::framer::{Inbound, MessageFramer};
pub use crate::handshake::UpgradeTarget;
pub use crate::http::{Headers, HttpRequest, HttpResponse};
pub use crate::protocol::Opcode;
pub use crate::session::{Session, SessionHandle};

// Re-export commonly used external dependencies
pub use bytes::{Bytes, BytesMut};
pub use http::{Method, StatusCode};
