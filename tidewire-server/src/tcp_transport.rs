//! TCP transport
//!
//! Accepts connections and pumps bytes between each socket and its
//! [`Session`](tidewire_core::Session). A connection runs two tasks: the
//! reader feeds the session input and fires RECEIVE, the writer drains the
//! outbound queue and fires SENT for tracked writes, in write order.

use crate::error::{Result, ServerError, TransportError};
use crate::manager::SessionManager;
use crate::trigger::EventTrigger;
use crate::{log_debug, log_trace};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tidewire_core::error::{Error, TimeoutError};
use tidewire_core::{Outbound, SessionHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Bound TCP listener
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind a listener to `addr`
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{addr}: {e}")))?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept the next connection
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, remote) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::AcceptFailed(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        Ok((stream, remote))
    }
}

/// Run one accepted connection until both of its tasks end
///
/// Registers the session with `manager`, fires ACCEPTED and CONNECT, and
/// fires DISCONNECT once the socket is done.
pub async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    manager: Arc<SessionManager>,
    trigger: Arc<EventTrigger>,
    read_timeout: Duration,
) {
    let local_addr = stream.local_addr().ok();
    let (session, outbound) = match manager.open(Some(remote_addr), local_addr).await {
        Ok(opened) => opened,
        Err(err) => {
            log_debug!(remote = %remote_addr, error = %err, "connection refused");
            return;
        }
    };

    trigger.fire_accept(&session).await;
    trigger.fire_connect(&session).await;

    let (reader, writer) = stream.into_split();
    let read_task = tokio::spawn(read_loop(reader, session.clone(), trigger.clone(), read_timeout));
    let write_task = tokio::spawn(write_loop(writer, outbound, session.clone(), trigger.clone()));

    let _ = read_task.await;
    session.close();
    let _ = write_task.await;

    trigger.fire_disconnect(&session).await;
    manager.remove(session.id()).await;
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    session: SessionHandle,
    trigger: Arc<EventTrigger>,
    read_timeout: Duration,
) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        buf.clear();
        let read = tokio::select! {
            read = tokio::time::timeout(read_timeout, reader.read_buf(&mut buf)) => read,
            _ = session.closed() => break,
        };

        match read {
            Ok(Ok(0)) => {
                log_trace!(session = session.id(), "peer closed");
                break;
            }
            Ok(Ok(_)) => {
                session.push_input(&buf).await;
                trigger.fire_receive(&session).await;
            }
            Ok(Err(err)) => {
                trigger.fire_exception(&session, ServerError::Io(err)).await;
                break;
            }
            Err(_) => {
                let error = Error::from(TimeoutError::Read {
                    timeout: read_timeout,
                });
                trigger.fire_exception(&session, error.into()).await;
                break;
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: UnboundedReceiver<Outbound>,
    session: SessionHandle,
    trigger: Arc<EventTrigger>,
) {
    while let Some(item) = outbound.recv().await {
        let written = match item {
            Outbound::Tracked(bytes) => match writer.write_all(&bytes).await {
                Ok(()) => {
                    trigger.fire_sent(&session, bytes).await;
                    Ok(())
                }
                Err(err) => Err(err),
            },
            Outbound::Direct(bytes) => writer.write_all(&bytes).await,
            Outbound::Shutdown => {
                let _ = writer.shutdown().await;
                break;
            }
        };

        if let Err(err) = written {
            let error = TransportError::WriteFailed(err.to_string());
            trigger.fire_exception(&session, error.into()).await;
            session.close();
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Handler, Reply};
    use crate::pool::WorkerPool;
    use async_trait::async_trait;
    use tidewire_core::{HttpResponse, Inbound, MessageFramer};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Hello;

    #[async_trait]
    impl Handler for Hello {
        async fn on_receive(&self, _session: &SessionHandle, _inbound: Inbound) -> crate::Result<Option<Reply>> {
            Ok(Some(Reply::Http(HttpResponse::text("hello"))))
        }

        async fn on_sent(&self, session: &SessionHandle, _raw: &bytes::Bytes) -> crate::Result<()> {
            session.close();
            Ok(())
        }
    }

    async fn listen(max: usize) -> (TcpTransport, Arc<SessionManager>, Arc<EventTrigger>) {
        let transport = TcpTransport::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let manager = Arc::new(SessionManager::new(max));
        let trigger = EventTrigger::new(
            Arc::new(WorkerPool::current()),
            Arc::new(Hello),
            MessageFramer::default(),
        );
        (transport, manager, trigger)
    }

    #[tokio::test]
    async fn test_request_response_then_close() {
        let (transport, manager, trigger) = listen(4).await;
        let addr = transport.local_addr();

        let server = tokio::spawn({
            let manager = manager.clone();
            async move {
                let (stream, remote) = transport.accept().await.unwrap();
                serve_connection(stream, remote, manager, trigger, Duration::from_secs(5)).await;
            }
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8(response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("hello"));

        server.await.unwrap();
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_connection_over_limit_is_refused() {
        let (transport, manager, trigger) = listen(1).await;
        let addr = transport.local_addr();
        let (_held, _rx) = manager.open(None, None).await.unwrap();

        let server = tokio::spawn({
            let manager = manager.clone();
            async move {
                let (stream, remote) = transport.accept().await.unwrap();
                serve_connection(stream, remote, manager, trigger, Duration::from_secs(5)).await;
            }
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        server.await.unwrap();

        let mut buf = Vec::new();
        assert_eq!(client.read_to_end(&mut buf).await.unwrap(), 0);
        assert_eq!(manager.stats().await.refused_sessions, 1);
    }

    #[tokio::test]
    async fn test_idle_read_times_out() {
        let (transport, manager, trigger) = listen(4).await;
        let addr = transport.local_addr();

        let server = tokio::spawn({
            let manager = manager.clone();
            async move {
                let (stream, remote) = transport.accept().await.unwrap();
                serve_connection(stream, remote, manager, trigger, Duration::from_millis(50)).await;
            }
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut buf = Vec::new();
        assert_eq!(client.read_to_end(&mut buf).await.unwrap(), 0);
        server.await.unwrap();
        assert!(manager.is_empty().await);
    }
}
