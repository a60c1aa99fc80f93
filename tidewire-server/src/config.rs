//! Server configuration
//!
//! This module provides configuration options for the protocol engine and
//! its TCP server. With the `serde` feature a configuration can also be read
//! from a `web.json` style document.

use crate::log_warn;
use std::net::SocketAddr;
use std::time::Duration;
use tidewire_core::error::{ConfigError, Error};
use tidewire_core::protocol::constants::{DEFAULT_MAX_FRAME_SIZE, MAX_HEADER_SIZE, SERVER_IDENTITY};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub bind_address: SocketAddr,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Reads idle for longer than this close the session
    pub read_timeout: Duration,
    /// Idle time an HTTP keep-alive session may spend between responses;
    /// zero disables keep-alive
    pub keep_alive_timeout: Duration,
    /// Interval between keep-alive sweeps
    pub keep_alive_tick: Duration,
    /// Delay before the first keep-alive sweep
    pub keep_alive_initial_delay: Duration,
    /// Wait between a PONG and the next heartbeat PING
    pub heartbeat_delay: Duration,
    /// Gzip response bodies for clients that accept it
    pub compression: bool,
    /// Value of the `Server` response header
    pub server_name: String,
    /// Worker threads running event processing
    pub worker_threads: usize,
    /// Maximum size of an HTTP request head
    pub max_header_size: usize,
    /// Maximum WebSocket frame payload (and HTTP body) size
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 28080)),
            max_connections: 10_000,
            read_timeout: Duration::from_secs(30),
            keep_alive_timeout: Duration::from_secs(15),
            keep_alive_tick: Duration::from_secs(1),
            keep_alive_initial_delay: Duration::from_millis(1),
            heartbeat_delay: Duration::from_secs(1),
            compression: true,
            server_name: SERVER_IDENTITY.to_string(),
            worker_threads: default_worker_threads(),
            max_header_size: MAX_HEADER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Available cores plus two
pub fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        + 2
}

impl ServerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> tidewire_core::Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config(ConfigError::Validation(
                "max_connections must be greater than 0".to_string(),
            )));
        }

        if self.read_timeout.is_zero() {
            return Err(Error::Config(ConfigError::Validation(
                "read_timeout must be greater than 0".to_string(),
            )));
        }

        if self.keep_alive_tick.is_zero() {
            return Err(Error::Config(ConfigError::Validation(
                "keep_alive_tick must be greater than 0".to_string(),
            )));
        }

        if self.worker_threads == 0 {
            return Err(Error::Config(ConfigError::Validation(
                "worker_threads must be greater than 0".to_string(),
            )));
        }

        if self.max_header_size == 0 {
            return Err(Error::Config(ConfigError::Validation(
                "max_header_size must be greater than 0".to_string(),
            )));
        }

        if self.max_frame_size == 0 {
            return Err(Error::Config(ConfigError::Validation(
                "max_frame_size must be greater than 0".to_string(),
            )));
        }

        if self.server_name.trim().is_empty() {
            return Err(Error::Config(ConfigError::MissingField {
                field: "server_name".to_string(),
            }));
        }

        if self.keep_alive_shadowed() {
            log_warn!(
                keep_alive = ?self.keep_alive_timeout,
                read_timeout = ?self.read_timeout,
                "read timeout closes idle keep-alive sessions before they expire"
            );
        }

        Ok(())
    }

    /// Whether HTTP keep-alive is enabled at all
    pub fn keep_alive_enabled(&self) -> bool {
        !self.keep_alive_timeout.is_zero()
    }

    /// Whether idle keep-alive sessions hit the read timeout before their
    /// keep-alive deadline
    pub fn keep_alive_shadowed(&self) -> bool {
        self.keep_alive_enabled() && self.keep_alive_timeout >= self.read_timeout
    }
}

#[cfg(feature = "serde")]
mod file {
    use super::*;
    use serde::Deserialize;
    use std::path::Path;

    /// On-disk shape; every key is optional and falls back to the default
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase", deny_unknown_fields)]
    struct ConfigFile {
        host: Option<String>,
        port: Option<u16>,
        /// Read timeout in seconds
        timeout: Option<u64>,
        /// Keep-alive timeout in seconds
        keep_alive_timeout: Option<u64>,
        /// Heartbeat delay in milliseconds
        heartbeat_delay: Option<u64>,
        gzip: Option<bool>,
        server_name: Option<String>,
        max_connections: Option<usize>,
        worker_threads: Option<usize>,
        max_header_size: Option<usize>,
        max_frame_size: Option<usize>,
    }

    impl ServerConfig {
        /// Parse a JSON configuration document
        pub fn from_json_str(json: &str) -> tidewire_core::Result<Self> {
            let file: ConfigFile = serde_json::from_str(json).map_err(|e| {
                Error::Config(ConfigError::Validation(format!("Invalid configuration: {}", e)))
            })?;
            let mut config = ServerConfig::default();

            if file.host.is_some() || file.port.is_some() {
                let host = file.host.unwrap_or_else(|| config.bind_address.ip().to_string());
                let port = file.port.unwrap_or_else(|| config.bind_address.port());
                config.bind_address = format!("{}:{}", host, port).parse().map_err(|_| {
                    Error::Config(ConfigError::InvalidValue {
                        field: "host".to_string(),
                        value: host.clone(),
                    })
                })?;
            }

            if let Some(secs) = file.timeout {
                config.read_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = file.keep_alive_timeout {
                config.keep_alive_timeout = Duration::from_secs(secs);
            }
            if let Some(millis) = file.heartbeat_delay {
                config.heartbeat_delay = Duration::from_millis(millis);
            }
            if let Some(gzip) = file.gzip {
                config.compression = gzip;
            }
            if let Some(name) = file.server_name {
                config.server_name = name;
            }
            if let Some(max) = file.max_connections {
                config.max_connections = max;
            }
            if let Some(threads) = file.worker_threads {
                config.worker_threads = threads;
            }
            if let Some(size) = file.max_header_size {
                config.max_header_size = size;
            }
            if let Some(size) = file.max_frame_size {
                config.max_frame_size = size;
            }

            config.validate()?;
            Ok(config)
        }

        /// Read and parse a JSON configuration file
        pub fn from_json_file(path: impl AsRef<Path>) -> tidewire_core::Result<Self> {
            let json = std::fs::read_to_string(path.as_ref())?;
            Self::from_json_str(&json)
        }
    }
}
