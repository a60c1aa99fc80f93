//! # Tidewire Core
//!
//! Wire-level building blocks for the Tidewire protocol engine
//!
//! This crate holds everything that describes a connection independently of
//! how it is driven:
//!
//! - Error handling and types
//! - WebSocket frame parsing and generation
//! - HTTP/1.1 requests and responses
//! - Upgrade handshakes (WebSocket, h2c)
//! - The message framer turning raw input into requests and frames
//! - The session handle and its per-session protocol context

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/tidewire-core/")]

// Core modules
pub mod context;
pub mod error;
pub mod frame;
pub mod framer;
pub mod handshake;
pub mod http;
pub mod protocol;
pub mod session;

// Prelude module with common imports
pub mod prelude;

// Re-export key types for convenience
pub use context::{ProtocolState, ReassemblyBuffer, SessionContext};
pub use error::{Error, Result};
pub use frame::Frame;
pub use framer::{Inbound, MessageFramer};
pub use handshake::UpgradeTarget;
pub use http::{Headers, HttpRequest, HttpResponse};
pub use protocol::Opcode;
pub use session::{Outbound, Session, SessionHandle, SessionId};
