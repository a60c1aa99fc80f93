//! # Tidewire
//!
//! HTTP/1.1 and WebSocket over one listener, driven by an event trigger that
//! never processes two receives of the same connection at once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tidewire::prelude::*;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl SocketHandler for Echo {
//!     async fn on_message(
//!         &self,
//!         _session: &SessionHandle,
//!         _request: &HttpRequest,
//!         payload: Bytes,
//!     ) -> Option<Frame> {
//!         Some(Frame::text(payload))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> tidewire::server::Result<()> {
//!     let server = tidewire::Server::builder()
//!         .bind("0.0.0.0:28080")?
//!         .get("/", |_req, resp| resp.set_body("hello"))
//!         .socket("/echo", Echo)
//!         .build()?;
//!
//!     server.serve().await
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

// Re-export core components
pub use tidewire_core::*;

#[cfg(feature = "server")]
pub use tidewire_server as server;

#[cfg(feature = "server")]
pub use tidewire_server::{Server, ServerBuilder, ServerConfig};

/// Prelude module with common imports
pub mod prelude {
    #[cfg(not(feature = "server"))]
    pub use tidewire_core::prelude::*;

    #[cfg(feature = "server")]
    pub use tidewire_server::prelude::*;
}
