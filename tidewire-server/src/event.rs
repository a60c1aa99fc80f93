//! Session lifecycle events
//!
//! An [`Event`] records one occurrence on one session and tracks its progress
//! through the trigger's ledger.

use crate::error::ServerError;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tidewire_core::SessionHandle;

/// Kind of lifecycle occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// Connection accepted by the transport
    Accepted,
    /// Session ready for traffic
    Connect,
    /// Input arrived
    Receive,
    /// Tracked bytes were written
    Sent,
    /// Session went away
    Disconnect,
    /// Something failed while serving the session
    Exception,
}

impl EventName {
    /// Upper-case name used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Accepted => "ACCEPTED",
            EventName::Connect => "CONNECT",
            EventName::Receive => "RECEIVE",
            EventName::Sent => "SENT",
            EventName::Disconnect => "DISCONNECT",
            EventName::Exception => "EXCEPTION",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing progress of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventState {
    /// Recorded, not yet picked up
    Pending = 0,
    /// A task is running it
    Processing = 1,
    /// Done; removed from the ledger on the next sweep
    Finished = 2,
}

impl EventState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EventState::Pending,
            1 => EventState::Processing,
            _ => EventState::Finished,
        }
    }
}

/// Data attached to an event
#[derive(Debug, Clone, Default)]
pub enum EventPayload {
    /// Nothing
    #[default]
    None,
    /// Bytes that were written
    Sent(Bytes),
    /// The failure behind an EXCEPTION
    Error(Arc<ServerError>),
}

/// One lifecycle occurrence on one session
#[derive(Debug)]
pub struct Event {
    name: EventName,
    session: SessionHandle,
    payload: EventPayload,
    state: AtomicU8,
}

impl Event {
    /// Create a pending event
    pub fn new(name: EventName, session: SessionHandle, payload: EventPayload) -> Self {
        Self {
            name,
            session,
            payload,
            state: AtomicU8::new(EventState::Pending as u8),
        }
    }

    /// Event kind
    pub fn name(&self) -> EventName {
        self.name
    }

    /// Session the event belongs to
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Attached data
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Current state
    pub fn state(&self) -> EventState {
        EventState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Update the state; states never move backwards
    pub fn set_state(&self, state: EventState) {
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }

    /// Whether the event is pending or processing
    pub fn is_in_flight(&self) -> bool {
        self.state() != EventState::Finished
    }

    /// Whether this event is `name` on `session`
    pub fn matches(&self, session: &SessionHandle, name: EventName) -> bool {
        self.name == name && Arc::ptr_eq(&self.session, session)
    }
}
