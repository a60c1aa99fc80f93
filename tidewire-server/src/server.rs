//! Server implementation
//!
//! [`Server`] wires the engine together: TCP transport, session manager,
//! worker pool, event trigger, protocol handler and keep-alive reaper.

use crate::config::ServerConfig;
use crate::dispatch::{HttpDispatch, HttpRouter, SocketDispatcher, SocketHandler};
use crate::error::{Result, ServerError};
use crate::keepalive::{KeepAliveReaper, KeepAliveRegistry};
use crate::manager::SessionManager;
use crate::pool::WorkerPool;
use crate::protocol_handler::ProtocolHandler;
use crate::tcp_transport::{self, TcpTransport};
use crate::trigger::EventTrigger;
use crate::{log_debug, log_error, log_info, log_warn};
use std::future::Future;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tidewire_core::prelude::Method;
use tidewire_core::{HttpRequest, HttpResponse, MessageFramer};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// HTTP/WebSocket server
pub struct Server {
    config: ServerConfig,
    http: Arc<dyn HttpDispatch>,
    sockets: SocketDispatcher,
    pool: Option<Arc<WorkerPool>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("sockets", &self.sockets)
            .finish()
    }
}

impl Server {
    /// Create a server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Effective configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind, start every background task and return immediately
    pub async fn start(self) -> Result<RunningServer> {
        let config = Arc::new(self.config);
        let transport = TcpTransport::bind(config.bind_address).await?;
        let local_addr = transport.local_addr();

        let pool = match self.pool {
            Some(pool) => pool,
            None => Arc::new(WorkerPool::new(config.worker_threads)?),
        };

        let registry = Arc::new(KeepAliveRegistry::new());
        let handler = ProtocolHandler::new(
            config.clone(),
            self.http,
            Arc::new(self.sockets),
            registry.clone(),
        );
        let framer = MessageFramer::new(config.max_header_size, config.max_frame_size);
        let trigger = EventTrigger::new(pool, Arc::new(handler), framer);
        let manager = Arc::new(SessionManager::new(config.max_connections));

        let reaper = config.keep_alive_enabled().then(|| {
            KeepAliveReaper::spawn(
                registry,
                config.keep_alive_initial_delay,
                config.keep_alive_tick,
            )
        });

        log_banner(&config, local_addr);

        let (stop, stopped) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            transport,
            manager.clone(),
            trigger.clone(),
            config.read_timeout,
            stopped,
        ));

        Ok(RunningServer {
            local_addr,
            grace: config.read_timeout,
            stop,
            accept_task,
            reaper,
            manager,
            trigger,
        })
    }

    /// Serve until ctrl-c
    pub async fn serve(self) -> Result<()> {
        self.serve_with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Serve until `shutdown_signal` completes, then shut down gracefully
    pub async fn serve_with_graceful_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let running = self.start().await?;
        shutdown_signal.await;
        running.shutdown().await
    }
}

fn log_banner(config: &ServerConfig, local_addr: SocketAddr) {
    log_info!(
        server = %config.server_name,
        address = %local_addr,
        workers = config.worker_threads,
        max_connections = config.max_connections,
        keep_alive = ?config.keep_alive_timeout,
        compression = config.compression,
        "server started"
    );
}

async fn accept_loop(
    transport: TcpTransport,
    manager: Arc<SessionManager>,
    trigger: Arc<EventTrigger>,
    read_timeout: Duration,
    mut stopped: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = transport.accept() => match accepted {
                Ok((stream, remote)) => {
                    log_debug!(remote = %remote, "accepted connection");
                    tokio::spawn(tcp_transport::serve_connection(
                        stream,
                        remote,
                        manager.clone(),
                        trigger.clone(),
                        read_timeout,
                    ));
                }
                Err(err) => log_warn!(error = %err, "accept failed"),
            },
            changed = stopped.changed() => {
                if changed.is_err() || *stopped.borrow() {
                    break;
                }
            }
        }
    }
}

/// Handle to a started server
#[derive(Debug)]
pub struct RunningServer {
    local_addr: SocketAddr,
    grace: Duration,
    stop: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    reaper: Option<KeepAliveReaper>,
    manager: Arc<SessionManager>,
    trigger: Arc<EventTrigger>,
}

impl RunningServer {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Live sessions
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Stop accepting, close every session and wait for in-flight work
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.stop.send(true);
        self.accept_task
            .await
            .map_err(|e| ServerError::Handler(format!("accept task failed: {e}")))?;

        if let Some(reaper) = self.reaper {
            reaper.stop().await;
        }

        let closing = self.manager.close_all().await;
        log_info!(sessions = closing, "shutting down");

        if tokio::time::timeout(self.grace, self.manager.wait_empty())
            .await
            .is_err()
        {
            let remaining = self.manager.len().await;
            log_error!(remaining, "sessions outlived shutdown");
        }

        self.trigger.shutdown();
        self.trigger.pool().wait_idle().await;
        Ok(())
    }
}

/// Server builder
pub struct ServerBuilder {
    config: ServerConfig,
    router: HttpRouter,
    http: Option<Arc<dyn HttpDispatch>>,
    sockets: SocketDispatcher,
    pool: Option<Arc<WorkerPool>>,
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("sockets", &self.sockets)
            .finish()
    }
}

impl ServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            router: HttpRouter::new(),
            http: None,
            sockets: SocketDispatcher::new(),
            pool: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind to the given address
    pub fn bind<A: ToSocketAddrs>(mut self, addr: A) -> Result<Self> {
        self.config.bind_address = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ServerError::Config("Invalid bind address".to_string()))?;
        Ok(self)
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Set the idle read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the keep-alive timeout; zero disables keep-alive
    pub fn keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.config.keep_alive_timeout = timeout;
        self
    }

    /// Set how often the keep-alive reaper sweeps
    pub fn keep_alive_tick(mut self, tick: Duration) -> Self {
        self.config.keep_alive_tick = tick;
        self
    }

    /// Set the delay between a PONG and the next heartbeat PING
    pub fn heartbeat_delay(mut self, delay: Duration) -> Self {
        self.config.heartbeat_delay = delay;
        self
    }

    /// Enable/disable gzip response compression
    pub fn compression(mut self, enabled: bool) -> Self {
        self.config.compression = enabled;
        self
    }

    /// Set the `Server` header value
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Set the worker thread count
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads;
        self
    }

    /// Set maximum HTTP head size
    pub fn max_header_size(mut self, size: usize) -> Self {
        self.config.max_header_size = size;
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Run handler work on `pool` instead of a dedicated runtime
    pub fn worker_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Answer HTTP requests with `dispatch` instead of the route table
    pub fn http_dispatch(mut self, dispatch: Arc<dyn HttpDispatch>) -> Self {
        self.http = Some(dispatch);
        self
    }

    /// Register a route for `method` requests to `path`
    pub fn route<F>(mut self, method: Method, path: impl Into<String>, route: F) -> Self
    where
        F: Fn(&HttpRequest, &mut HttpResponse) + Send + Sync + 'static,
    {
        self.router.route(method, path, route);
        self
    }

    /// Register a GET route
    pub fn get<F>(self, path: impl Into<String>, route: F) -> Self
    where
        F: Fn(&HttpRequest, &mut HttpResponse) + Send + Sync + 'static,
    {
        self.route(Method::GET, path, route)
    }

    /// Register a POST route
    pub fn post<F>(self, path: impl Into<String>, route: F) -> Self
    where
        F: Fn(&HttpRequest, &mut HttpResponse) + Send + Sync + 'static,
    {
        self.route(Method::POST, path, route)
    }

    /// Register a PUT route
    pub fn put<F>(self, path: impl Into<String>, route: F) -> Self
    where
        F: Fn(&HttpRequest, &mut HttpResponse) + Send + Sync + 'static,
    {
        self.route(Method::PUT, path, route)
    }

    /// Register a DELETE route
    pub fn delete<F>(self, path: impl Into<String>, route: F) -> Self
    where
        F: Fn(&HttpRequest, &mut HttpResponse) + Send + Sync + 'static,
    {
        self.route(Method::DELETE, path, route)
    }

    /// Register a HEAD route
    pub fn head<F>(self, path: impl Into<String>, route: F) -> Self
    where
        F: Fn(&HttpRequest, &mut HttpResponse) + Send + Sync + 'static,
    {
        self.route(Method::HEAD, path, route)
    }

    /// Register an OPTIONS route
    pub fn options<F>(self, path: impl Into<String>, route: F) -> Self
    where
        F: Fn(&HttpRequest, &mut HttpResponse) + Send + Sync + 'static,
    {
        self.route(Method::OPTIONS, path, route)
    }

    /// Register a WebSocket handler for upgrades to `path`
    pub fn socket<H>(mut self, path: impl Into<String>, handler: H) -> Self
    where
        H: SocketHandler,
    {
        self.sockets.register(path, Arc::new(handler));
        self
    }

    /// Build the server
    pub fn build(self) -> Result<Server> {
        self.config.validate()?;

        let http = match self.http {
            Some(http) => http,
            None => Arc::new(self.router),
        };

        Ok(Server {
            config: self.config,
            http,
            sockets: self.sockets,
            pool: self.pool,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_builder() {
        let server = ServerBuilder::new()
            .bind("127.0.0.1:8080")
            .unwrap()
            .max_connections(1000)
            .max_frame_size(1024 * 1024)
            .keep_alive_timeout(Duration::from_secs(5))
            .get("/", |_req, resp| resp.set_body("home"))
            .build()
            .unwrap();

        assert_eq!(server.config().bind_address, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(server.config().keep_alive_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = ServerBuilder::new().max_connections(0).build();
        assert!(matches!(result, Err(ServerError::Core(_))));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let running = Server::builder()
            .bind("127.0.0.1:0")
            .unwrap()
            .worker_pool(Arc::new(WorkerPool::current()))
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();

        assert_ne!(running.local_addr().port(), 0);
        assert!(running.manager().is_empty().await);

        running.shutdown().await.unwrap();
    }
}
