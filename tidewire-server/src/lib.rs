//! Tidewire Server
//!
//! Connection-level protocol engine serving HTTP/1.1 and WebSocket over one
//! TCP listener. Lifecycle events run through an [`EventTrigger`] on a
//! dedicated [`WorkerPool`]; the [`ProtocolHandler`] drives each session from
//! HTTP through the upgrade handshake to WebSocket framing, and a
//! [`KeepAliveReaper`] closes idle keep-alive connections.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tidewire_server::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> tidewire_server::Result<()> {
//!     let server = Server::builder()
//!         .bind("0.0.0.0:28080")?
//!         .get("/", |_req, resp| resp.set_body("hello"))
//!         .build()?;
//!
//!     server.serve().await
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod handler;
pub mod keepalive;
pub mod logging;
pub mod manager;
pub mod pool;
pub mod protocol_handler;
pub mod server;
pub mod tcp_transport;
pub mod trigger;

pub mod prelude;

pub use config::ServerConfig;
pub use dispatch::{HttpDispatch, HttpRouter, SocketDispatcher, SocketHandler};
pub use error::{ConnectionError, ErrorClass, Result, ServerError, TransportError};
pub use event::{Event, EventName, EventPayload, EventState};
pub use handler::{BoxedHandler, Handler, Reply};
pub use keepalive::{KeepAliveReaper, KeepAliveRegistry};
pub use logging::init_logging;
pub use manager::{ManagerStats, SessionManager};
pub use pool::WorkerPool;
pub use protocol_handler::ProtocolHandler;
pub use server::{RunningServer, Server, ServerBuilder};
pub use tcp_transport::TcpTransport;
pub use trigger::EventTrigger;
