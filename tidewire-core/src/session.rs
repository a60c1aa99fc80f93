//! Session handle shared between a transport and the engine
//!
//! The transport owns the socket; everything else talks to the connection
//! through a [`SessionHandle`]. Writes are queued on an unbounded channel
//! drained by the transport's writer, so sending never blocks the caller.

use crate::context::SessionContext;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};

/// Session identifier, unique per transport
pub type SessionId = u64;

/// Shared reference to a session
pub type SessionHandle = Arc<Session>;

/// Work item for a session's writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write, then report the bytes through a SENT event
    Tracked(Bytes),
    /// Write without reporting
    Direct(Bytes),
    /// Flush everything queued before this marker, then shut the socket down
    Shutdown,
}

/// One client connection as seen by the engine
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    remote_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    connected: AtomicBool,
    handshake_done: AtomicBool,
    context: Mutex<SessionContext>,
    input: Mutex<BytesMut>,
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: Notify,
}

impl Session {
    /// Create a connected session and the receiver its writer drains
    ///
    /// The security handshake counts as complete; transports that run one
    /// reset it with [`Session::set_handshake_done`].
    pub fn new(
        id: SessionId,
        remote_addr: Option<SocketAddr>,
        local_addr: Option<SocketAddr>,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id,
            remote_addr,
            local_addr,
            connected: AtomicBool::new(true),
            handshake_done: AtomicBool::new(true),
            context: Mutex::new(SessionContext::new()),
            input: Mutex::new(BytesMut::new()),
            outbound: tx,
            closed: Notify::new(),
        });
        (session, rx)
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Peer address
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Local address the connection was accepted on
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Whether the session is still open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether the transport-level security handshake finished
    pub fn is_handshake_done(&self) -> bool {
        self.handshake_done.load(Ordering::Acquire)
    }

    /// Record the state of the security handshake
    pub fn set_handshake_done(&self, done: bool) {
        self.handshake_done.store(done, Ordering::Release);
    }

    /// Protocol context
    pub fn context(&self) -> &Mutex<SessionContext> {
        &self.context
    }

    /// Received bytes not yet decoded
    pub fn input(&self) -> &Mutex<BytesMut> {
        &self.input
    }

    /// Append received bytes to the input buffer
    pub async fn push_input(&self, data: &[u8]) {
        self.input.lock().await.extend_from_slice(data);
    }

    /// Queue bytes whose write fires a SENT event
    ///
    /// Returns `false` when the session is already closed.
    pub fn send(&self, data: impl Into<Bytes>) -> bool {
        self.enqueue(Outbound::Tracked(data.into()))
    }

    /// Queue bytes whose write is not reported
    pub fn send_direct(&self, data: impl Into<Bytes>) -> bool {
        self.enqueue(Outbound::Direct(data.into()))
    }

    fn enqueue(&self, item: Outbound) -> bool {
        self.is_connected() && self.outbound.send(item).is_ok()
    }

    /// Close the session
    ///
    /// Writes queued before the call still go out. Safe to call repeatedly;
    /// only the first call has an effect. Returns whether this call closed it.
    pub fn close(&self) -> bool {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return false;
        }
        let _ = self.outbound.send(Outbound::Shutdown);
        self.closed.notify_waiters();
        true
    }

    /// Wait until the session is closed
    pub async fn closed(&self) {
        let notified = self.closed.notified();
        if !self.is_connected() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_and_close_ordering() {
        let (session, mut rx) = Session::new(1, None, None);

        assert!(session.send(Bytes::from_static(b"a")));
        assert!(session.send_direct(Bytes::from_static(b"b")));
        assert!(session.close());
        assert!(!session.close());
        assert!(!session.send(Bytes::from_static(b"late")));

        assert_eq!(rx.recv().await, Some(Outbound::Tracked(Bytes::from_static(b"a"))));
        assert_eq!(rx.recv().await, Some(Outbound::Direct(Bytes::from_static(b"b"))));
        assert_eq!(rx.recv().await, Some(Outbound::Shutdown));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_wakes_waiters() {
        let (session, _rx) = Session::new(2, None, None);
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.closed().await })
        };

        tokio::task::yield_now().await;
        session.close();
        waiter.await.unwrap();

        // Already closed: returns immediately
        session.closed().await;
    }

    #[tokio::test]
    async fn test_input_buffer() {
        let (session, _rx) = Session::new(3, None, None);
        session.push_input(b"GET ").await;
        session.push_input(b"/").await;
        assert_eq!(&session.input().lock().await[..], b"GET /");
        assert!(session.is_handshake_done());
    }
}
