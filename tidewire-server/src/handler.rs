//! Session event handlers
//!
//! The [`EventTrigger`](crate::trigger::EventTrigger) turns lifecycle events
//! into calls on a [`Handler`]. The HTTP/WebSocket engine itself is one
//! ([`ProtocolHandler`](crate::protocol_handler::ProtocolHandler)); tests plug
//! in their own.

use crate::error::{Result, ServerError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tidewire_core::{Frame, HttpResponse, Inbound, SessionHandle};

/// Answer produced for one decoded message
#[derive(Debug, Clone)]
pub enum Reply {
    /// An HTTP response
    Http(HttpResponse),
    /// A WebSocket frame
    Frame(Frame),
    /// A CLOSE frame; the session shuts down once it is written
    Close(Frame),
}

impl Reply {
    /// Serialize the reply for the wire
    pub fn to_bytes(&self) -> tidewire_core::Result<Bytes> {
        match self {
            Reply::Http(response) => response.to_bytes(),
            Reply::Frame(frame) | Reply::Close(frame) => Ok(frame.to_bytes()),
        }
    }

    /// Whether the session closes after this reply
    pub fn closes_session(&self) -> bool {
        matches!(self, Reply::Close(_))
    }
}

/// Callbacks driven by session lifecycle events
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// A session was established
    async fn on_connect(&self, _session: &SessionHandle) -> Result<()> {
        Ok(())
    }

    /// A complete message was decoded from the session input
    async fn on_receive(&self, session: &SessionHandle, inbound: Inbound) -> Result<Option<Reply>>;

    /// Bytes queued with a tracked send were written
    async fn on_sent(&self, _session: &SessionHandle, _raw: &Bytes) -> Result<()> {
        Ok(())
    }

    /// The session went away
    async fn on_disconnect(&self, _session: &SessionHandle) {}

    /// Serving the session failed
    async fn on_exception(&self, session: &SessionHandle, _error: &ServerError) {
        session.close();
    }
}

/// Shared handler type
pub type BoxedHandler = Arc<dyn Handler>;

impl std::fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidewire_core::Session;

    struct Silent;

    #[async_trait]
    impl Handler for Silent {
        async fn on_receive(&self, _session: &SessionHandle, _inbound: Inbound) -> Result<Option<Reply>> {
            Ok(None)
        }
    }

    #[test]
    fn test_reply_bytes() {
        let close = Reply::Close(Frame::close(Some(1000), None));
        assert!(close.closes_session());
        assert_eq!(&close.to_bytes().unwrap()[..], &[0x88, 0x02, 0x03, 0xE8]);

        let http = Reply::Http(HttpResponse::text("ok"));
        assert!(!http.closes_session());
        assert!(http.to_bytes().unwrap().starts_with(b"HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn test_default_exception_closes() {
        let (session, _rx) = Session::new(1, None, None);
        let handler: BoxedHandler = Arc::new(Silent);

        handler
            .on_exception(&session, &ServerError::Handler("boom".to_string()))
            .await;
        assert!(!session.is_connected());
        assert!(handler.on_connect(&session).await.is_ok());
    }
}
