//! HTTP/WebSocket protocol state machine
//!
//! [`ProtocolHandler`] is the [`Handler`] a server installs. It answers HTTP
//! requests through an [`HttpDispatch`], negotiates upgrades, speaks
//! WebSocket framing on behalf of the [`SocketDispatcher`] and keeps the
//! keep-alive registry in step with every response written.

use crate::config::ServerConfig;
use crate::dispatch::{HttpDispatch, SocketDispatcher};
use crate::error::{Result, ServerError};
use crate::handler::{Handler, Reply};
use crate::keepalive::KeepAliveRegistry;
use crate::{log_debug, log_error};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tidewire_core::handshake::{self, UpgradeTarget};
use tidewire_core::protocol::http_header;
use tidewire_core::{
    Frame, HttpRequest, HttpResponse, Inbound, MessageFramer, Opcode, ProtocolState, SessionHandle,
};
use tokio::time::Instant;

/// The engine's session handler
pub struct ProtocolHandler {
    config: Arc<ServerConfig>,
    http: Arc<dyn HttpDispatch>,
    sockets: Arc<SocketDispatcher>,
    keep_alive: Arc<KeepAliveRegistry>,
    framer: MessageFramer,
}

impl std::fmt::Debug for ProtocolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolHandler")
            .field("sockets", &self.sockets)
            .field("keep_alive_timeout", &self.config.keep_alive_timeout)
            .finish()
    }
}

impl ProtocolHandler {
    /// Create a handler
    pub fn new(
        config: Arc<ServerConfig>,
        http: Arc<dyn HttpDispatch>,
        sockets: Arc<SocketDispatcher>,
        keep_alive: Arc<KeepAliveRegistry>,
    ) -> Self {
        let framer = MessageFramer::new(config.max_header_size, config.max_frame_size);
        Self {
            config,
            http,
            sockets,
            keep_alive,
            framer,
        }
    }

    /// Registry this handler maintains
    pub fn keep_alive(&self) -> &Arc<KeepAliveRegistry> {
        &self.keep_alive
    }

    async fn on_http(&self, session: &SessionHandle, mut request: HttpRequest) -> Result<Option<Reply>> {
        request.remote_addr = session.remote_addr();
        let request = Arc::new(request);

        match UpgradeTarget::from_request(&request) {
            Some(target) => self.on_upgrade(session, request, target).await,
            None => self.on_plain(session, request).await,
        }
    }

    async fn on_plain(&self, session: &SessionHandle, request: Arc<HttpRequest>) -> Result<Option<Reply>> {
        let mut response = HttpResponse::default();
        if self.config.compression && request.accepts_gzip() {
            response.set_compress(true);
        }

        self.http.process(&request, &mut response).await;

        let keep_alive = request.is_keep_alive();
        if keep_alive {
            if let Some(connection) = request.header(http_header::CONNECTION) {
                response.set_header(http_header::CONNECTION, connection);
            }
        }
        response.set_header(http_header::SERVER, self.config.server_name.as_str());

        let mut ctx = session.context().lock().await;
        ctx.set_keep_alive(keep_alive);
        ctx.cache_exchange(request, Arc::new(response.clone()));

        Ok(Some(Reply::Http(response)))
    }

    async fn on_upgrade(
        &self,
        session: &SessionHandle,
        request: Arc<HttpRequest>,
        target: UpgradeTarget,
    ) -> Result<Option<Reply>> {
        // Only one switch per connection
        if session.context().lock().await.state() != ProtocolState::Http {
            return self.on_plain(session, request).await;
        }

        let response = match target {
            UpgradeTarget::WebSocket => match handshake::websocket_response(&request) {
                Ok(response) => response,
                Err(err) => {
                    log_debug!(session = session.id(), error = %err, "upgrade rejected");
                    let mut response = HttpResponse::bad_request("Missing Sec-WebSocket-Key");
                    response.set_header(http_header::SERVER, self.config.server_name.as_str());
                    session.context().lock().await.set_keep_alive(false);
                    return Ok(Some(Reply::Http(response)));
                }
            },
            UpgradeTarget::H2c => handshake::h2c_response(),
        };

        {
            let mut ctx = session.context().lock().await;
            ctx.begin_upgrade(target);
            ctx.set_keep_alive(false);
            ctx.set_keep_alive_expiry(None);
            ctx.cache_exchange(request, Arc::new(response.clone()));
        }
        self.keep_alive.remove(session).await;

        Ok(Some(Reply::Http(response)))
    }

    async fn on_frame(&self, session: &SessionHandle, frame: Frame) -> Result<Option<Reply>> {
        if let Some(code) = frame.error_code {
            if frame.opcode != Opcode::Close {
                log_debug!(session = session.id(), code, "rejecting frame");
                return Ok(Some(Reply::Close(Frame::close(Some(code), None))));
            }
        }

        match frame.opcode {
            Opcode::Close => Ok(Some(Reply::Close(Frame::new(Opcode::Close, frame.payload)))),
            Opcode::Ping => Ok(Some(Reply::Frame(Frame::pong(frame.payload)))),
            Opcode::Pong => {
                tokio::time::sleep(self.config.heartbeat_delay).await;
                if session.is_connected() {
                    Ok(Some(Reply::Frame(Frame::ping(Bytes::new()))))
                } else {
                    Ok(None)
                }
            }
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                let (message, request) = {
                    let mut ctx = session.context().lock().await;
                    ctx.reassembly.append(&frame.payload);
                    if !frame.fin {
                        return Ok(None);
                    }
                    (ctx.reassembly.take(), ctx.request())
                };

                match request {
                    Some(request) => Ok(self
                        .sockets
                        .message(session, &request, message)
                        .await
                        .map(Reply::Frame)),
                    None => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    /// SENT continuation for a data frame written on a socket
    async fn frame_sent(&self, session: &SessionHandle, request: Option<&HttpRequest>, frame: &Frame) {
        if matches!(frame.opcode, Opcode::Ping | Opcode::Pong | Opcode::Close) {
            return;
        }
        if let Some(request) = request {
            self.sockets.sent(session, request, &frame.payload).await;
        }
    }

    /// The `101` for a WebSocket upgrade went out
    async fn open_socket(&self, session: &SessionHandle, request: Option<Arc<HttpRequest>>) {
        self.keep_alive.remove(session).await;

        if let Some(request) = request.as_deref() {
            if let Some(greeting) = self.sockets.open(session, request).await {
                session.send_direct(greeting.to_bytes());
                self.frame_sent(session, Some(request), &greeting).await;
            }
        }

        session.send_direct(Frame::ping(Bytes::new()).to_bytes());
    }

    /// An HTTP response went out: slide the keep-alive deadline or close
    async fn after_response(&self, session: &SessionHandle) {
        let keep = {
            let mut ctx = session.context().lock().await;
            let keep = ctx.keep_alive() && self.config.keep_alive_enabled();
            let expiry = keep.then(|| Instant::now() + self.config.keep_alive_timeout);
            ctx.set_keep_alive_expiry(expiry);
            expiry
        };

        match keep {
            Some(expiry) => self.keep_alive.touch(session, expiry).await,
            None => {
                self.keep_alive.remove(session).await;
                session.close();
            }
        }
    }
}

#[async_trait]
impl Handler for ProtocolHandler {
    async fn on_connect(&self, session: &SessionHandle) -> Result<()> {
        log_debug!(session = session.id(), remote = ?session.remote_addr(), "session connected");
        #[cfg(feature = "metrics")]
        metrics::counter!("tidewire_sessions_opened_total").increment(1);
        Ok(())
    }

    async fn on_receive(&self, session: &SessionHandle, inbound: Inbound) -> Result<Option<Reply>> {
        match inbound {
            Inbound::Http(request) => self.on_http(session, request).await,
            Inbound::Frame(frame) => self.on_frame(session, frame).await,
        }
    }

    async fn on_sent(&self, session: &SessionHandle, raw: &Bytes) -> Result<()> {
        if let Some(frame) = self.framer.classify_outbound(raw) {
            let request = session.context().lock().await.request();
            self.frame_sent(session, request.as_deref(), &frame).await;
            return Ok(());
        }

        let request = {
            let mut ctx = session.context().lock().await;
            if !ctx.is_switch_pending() {
                let framed = ctx.state() == ProtocolState::WebSocket;
                drop(ctx);
                if !framed {
                    self.after_response(session).await;
                }
                return Ok(());
            }

            // Responses pipelined ahead of the `101` leave the session alone
            if !handshake::is_switching_response(raw) {
                return Ok(());
            }

            // HTTP/2 is not spoken; later requests are served as HTTP/1.1
            if ctx.upgrade() != Some(UpgradeTarget::WebSocket) {
                ctx.take_switch_pending();
                return Ok(());
            }
            ctx.advance_to(ProtocolState::WebSocket);
            ctx.request()
        };

        // Inbound frames stay parked until OPEN has run
        self.open_socket(session, request).await;
        session.context().lock().await.take_switch_pending();
        Ok(())
    }

    async fn on_disconnect(&self, session: &SessionHandle) {
        let (state, request) = {
            let ctx = session.context().lock().await;
            (ctx.state(), ctx.request())
        };

        if state == ProtocolState::WebSocket {
            if let Some(request) = request {
                self.sockets.close(session, &request).await;
            }
            session.context().lock().await.reassembly.release();
        }

        self.keep_alive.remove(session).await;
        log_debug!(session = session.id(), "session disconnected");
        #[cfg(feature = "metrics")]
        metrics::counter!("tidewire_sessions_closed_total").increment(1);
    }

    async fn on_exception(&self, session: &SessionHandle, error: &ServerError) {
        if !error.is_benign() {
            log_error!(session = session.id(), error = %error, "session failed");
        }
        session.close();
    }
}
