//! Prelude module with common imports
//!
//! Everything needed to build a server, register routes and socket handlers.

pub use crate::config::ServerConfig;
pub use crate::dispatch::{HttpDispatch, SocketHandler};
pub use crate::error::{Result, ServerError};
pub use crate::server::{RunningServer, Server, ServerBuilder};

pub use async_trait::async_trait;
pub use tidewire_core::prelude::*;
