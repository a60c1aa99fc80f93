//! Request and socket dispatch
//!
//! [`HttpRouter`] fills HTTP responses from an exact `(method, path)` table.
//! [`SocketDispatcher`] hands WebSocket traffic to the [`SocketHandler`]
//! registered for the path of the upgrade request.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tidewire_core::http::{HttpRequest, HttpResponse};
use tidewire_core::protocol::{http_header, http_value};
use tidewire_core::{Frame, SessionHandle};
use tidewire_core::prelude::{Method, StatusCode};

/// Fills in the response for an HTTP request
#[async_trait]
pub trait HttpDispatch: Send + Sync + 'static {
    /// Populate `response` for `request`
    async fn process(&self, request: &HttpRequest, response: &mut HttpResponse);
}

/// Route callback
pub type RouteFn = Arc<dyn Fn(&HttpRequest, &mut HttpResponse) + Send + Sync>;

/// Exact-match HTTP route table
#[derive(Clone, Default)]
pub struct HttpRouter {
    routes: HashMap<(Method, String), RouteFn>,
}

impl fmt::Debug for HttpRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRouter")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HttpRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `route` for `method` requests to exactly `path`
    pub fn route<F>(&mut self, method: Method, path: impl Into<String>, route: F) -> &mut Self
    where
        F: Fn(&HttpRequest, &mut HttpResponse) + Send + Sync + 'static,
    {
        self.routes.insert((method, path.into()), Arc::new(route));
        self
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route is registered
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl HttpDispatch for HttpRouter {
    async fn process(&self, request: &HttpRequest, response: &mut HttpResponse) {
        match self.routes.get(&(request.method.clone(), request.path.clone())) {
            Some(route) => route(request, response),
            None => {
                response.set_status(StatusCode::NOT_FOUND);
                response.set_header(http_header::CONTENT_TYPE, http_value::TEXT_PLAIN);
                response.set_body(Bytes::from_static(b"Not Found"));
            }
        }
    }
}

/// Application callbacks for one WebSocket route
///
/// `request` is always the upgrade request that opened the socket.
#[async_trait]
pub trait SocketHandler: Send + Sync + 'static {
    /// The socket opened; a returned frame is sent as a greeting
    async fn on_open(&self, _session: &SessionHandle, _request: &HttpRequest) -> Option<Frame> {
        None
    }

    /// A complete message arrived; a returned frame is sent back
    async fn on_message(
        &self,
        session: &SessionHandle,
        request: &HttpRequest,
        payload: Bytes,
    ) -> Option<Frame>;

    /// A data frame was written to the peer
    async fn on_sent(&self, _session: &SessionHandle, _request: &HttpRequest, _payload: &Bytes) {}

    /// The socket went away
    async fn on_close(&self, _session: &SessionHandle, _request: &HttpRequest) {}
}

/// Path-keyed WebSocket handlers
#[derive(Clone, Default)]
pub struct SocketDispatcher {
    handlers: HashMap<String, Arc<dyn SocketHandler>>,
}

impl fmt::Debug for SocketDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketDispatcher")
            .field("paths", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SocketDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for upgrade requests to exactly `path`
    pub fn register(&mut self, path: impl Into<String>, handler: Arc<dyn SocketHandler>) -> &mut Self {
        self.handlers.insert(path.into(), handler);
        self
    }

    /// Handler registered for the path of `request`
    pub fn find(&self, request: &HttpRequest) -> Option<Arc<dyn SocketHandler>> {
        self.handlers.get(&request.path).cloned()
    }

    /// Deliver OPEN; `None` when no handler matches or it has no greeting
    pub async fn open(&self, session: &SessionHandle, request: &HttpRequest) -> Option<Frame> {
        self.find(request)?.on_open(session, request).await
    }

    /// Deliver a complete message
    pub async fn message(
        &self,
        session: &SessionHandle,
        request: &HttpRequest,
        payload: Bytes,
    ) -> Option<Frame> {
        self.find(request)?.on_message(session, request, payload).await
    }

    /// Deliver SENT
    pub async fn sent(&self, session: &SessionHandle, request: &HttpRequest, payload: &Bytes) {
        if let Some(handler) = self.find(request) {
            handler.on_sent(session, request, payload).await;
        }
    }

    /// Deliver CLOSE
    pub async fn close(&self, session: &SessionHandle, request: &HttpRequest) {
        if let Some(handler) = self.find(request) {
            handler.on_close(session, request).await;
        }
    }
}
