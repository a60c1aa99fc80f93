//! Per-session protocol context
//!
//! Typed replacement for an attribute bag: everything the protocol handler
//! remembers about one connection between events lives here.

use crate::handshake::UpgradeTarget;
use crate::http::{HttpRequest, HttpResponse};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::time::Instant;

/// Protocol spoken on a session; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ProtocolState {
    /// Plain HTTP/1.1 request/response
    #[default]
    Http,
    /// A `101` answer is queued but not yet written
    Upgrading,
    /// WebSocket framing
    WebSocket,
}

/// Accumulator for fragmented WebSocket messages
///
/// Storage is allocated on first append and released at most once; appends
/// after release are ignored.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    buf: Option<BytesMut>,
    released: bool,
}

impl ReassemblyBuffer {
    /// Append payload bytes; returns `false` once the buffer was released
    pub fn append(&mut self, data: &[u8]) -> bool {
        if self.released {
            return false;
        }
        self.buf.get_or_insert_with(BytesMut::new).extend_from_slice(data);
        true
    }

    /// Take the accumulated message, leaving the buffer empty but allocated
    pub fn take(&mut self) -> Bytes {
        match self.buf.as_mut() {
            Some(buf) => buf.split().freeze(),
            None => Bytes::new(),
        }
    }

    /// Drop the storage; returns `true` only for the first call
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.buf = None;
        true
    }

    /// Whether storage has been allocated
    pub fn is_allocated(&self) -> bool {
        self.buf.is_some()
    }

    /// Whether the buffer was released
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Bytes currently buffered
    pub fn len(&self) -> usize {
        self.buf.as_ref().map_or(0, BytesMut::len)
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the engine tracks for one session
#[derive(Debug, Default)]
pub struct SessionContext {
    state: ProtocolState,
    upgrade: Option<UpgradeTarget>,
    switch_pending: bool,
    /// Fragment accumulator for the WebSocket phase
    pub reassembly: ReassemblyBuffer,
    request: Option<Arc<HttpRequest>>,
    response: Option<Arc<HttpResponse>>,
    keep_alive: bool,
    keep_alive_expiry: Option<Instant>,
}

impl SessionContext {
    /// Create a context in the HTTP state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current protocol state
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Move to `next` if it is ahead of the current state
    ///
    /// Returns whether the state changed.
    pub fn advance_to(&mut self, next: ProtocolState) -> bool {
        if next > self.state {
            self.state = next;
            true
        } else {
            false
        }
    }

    /// Negotiated upgrade target, if any
    pub fn upgrade(&self) -> Option<UpgradeTarget> {
        self.upgrade
    }

    /// Record the upgrade target and enter [`ProtocolState::Upgrading`]
    ///
    /// The switch stays pending until its `101` is written.
    pub fn begin_upgrade(&mut self, target: UpgradeTarget) -> bool {
        if self.advance_to(ProtocolState::Upgrading) {
            self.upgrade = Some(target);
            self.switch_pending = true;
            true
        } else {
            false
        }
    }

    /// Whether a `101` is queued but not yet written
    ///
    /// Inbound bytes are left undecoded while this holds.
    pub fn is_switch_pending(&self) -> bool {
        self.switch_pending
    }

    /// Consume the pending switch; `true` only for the first call
    pub fn take_switch_pending(&mut self) -> bool {
        std::mem::take(&mut self.switch_pending)
    }

    /// Whether inbound bytes should be decoded as WebSocket frames
    pub fn expects_frames(&self) -> bool {
        self.state == ProtocolState::WebSocket
    }

    /// Cache the last request/response pair
    pub fn cache_exchange(&mut self, request: Arc<HttpRequest>, response: Arc<HttpResponse>) {
        self.request = Some(request);
        self.response = Some(response);
    }

    /// Last request seen on this session (the upgrade request once upgraded)
    pub fn request(&self) -> Option<Arc<HttpRequest>> {
        self.request.clone()
    }

    /// Last response produced on this session
    pub fn response(&self) -> Option<Arc<HttpResponse>> {
        self.response.clone()
    }

    /// Whether keep-alive was negotiated
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Mark keep-alive as negotiated or not
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    /// Absolute keep-alive deadline, while registered
    pub fn keep_alive_expiry(&self) -> Option<Instant> {
        self.keep_alive_expiry
    }

    /// Update the keep-alive deadline
    pub fn set_keep_alive_expiry(&mut self, expiry: Option<Instant>) {
        self.keep_alive_expiry = expiry;
    }
}
