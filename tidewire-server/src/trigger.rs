//! Event trigger
//!
//! Decides whether a lifecycle event fires and where it runs: inline on the
//! caller's task or on the [`WorkerPool`]. Every firing is recorded in a
//! ledger; the ledger is what guarantees that a session never has two
//! RECEIVE events in flight at once.

use crate::error::{Result, ServerError};
use crate::event::{Event, EventName, EventPayload, EventState};
use crate::handler::BoxedHandler;
use crate::pool::WorkerPool;
use crate::{log_debug, log_trace};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tidewire_core::{MessageFramer, SessionHandle};
use tokio::sync::Mutex;

/// Fires session events into a [`Handler`](crate::handler::Handler)
#[derive(Debug)]
pub struct EventTrigger {
    pool: Arc<WorkerPool>,
    handler: BoxedHandler,
    framer: MessageFramer,
    ledger: Mutex<Vec<Arc<Event>>>,
    shutdown: AtomicBool,
}

impl EventTrigger {
    /// Create a trigger running work on `pool`
    pub fn new(pool: Arc<WorkerPool>, handler: BoxedHandler, framer: MessageFramer) -> Arc<Self> {
        Arc::new(Self {
            pool,
            handler,
            framer,
            ledger: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Pool running asynchronous firings
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Fire an event and process it on the calling task
    ///
    /// Returns `false` when the firing was dropped.
    pub async fn fire(&self, session: &SessionHandle, name: EventName, payload: EventPayload) -> bool {
        match self.register(session, name, payload).await {
            Some(event) => {
                self.run(event).await;
                true
            }
            None => false,
        }
    }

    /// Fire an event and process it on the worker pool
    ///
    /// The ledger entry exists before this returns, so a second RECEIVE fired
    /// right after is already subject to the in-flight guard.
    pub async fn fire_async(
        self: &Arc<Self>,
        session: &SessionHandle,
        name: EventName,
        payload: EventPayload,
    ) -> bool {
        let Some(event) = self.register(session, name, payload).await else {
            return false;
        };

        self.submit(event)
    }

    fn submit(self: &Arc<Self>, event: Arc<Event>) -> bool {
        let this = self.clone();
        let submitted = self.pool.execute({
            let event = event.clone();
            async move { this.run(event).await }
        });

        if !submitted {
            event.set_state(EventState::Finished);
        }
        submitted
    }

    /// ACCEPTED, inline
    pub async fn fire_accept(&self, session: &SessionHandle) -> bool {
        self.fire(session, EventName::Accepted, EventPayload::None).await
    }

    /// CONNECT, on the pool
    pub async fn fire_connect(self: &Arc<Self>, session: &SessionHandle) -> bool {
        self.fire_async(session, EventName::Connect, EventPayload::None).await
    }

    /// RECEIVE, on the pool, subject to the in-flight guard
    pub async fn fire_receive(self: &Arc<Self>, session: &SessionHandle) -> bool {
        self.fire_async(session, EventName::Receive, EventPayload::None).await
    }

    /// SENT, inline so SENT events run in write order
    ///
    /// When this SENT completes a protocol switch, input parked behind the
    /// `101` gets a fresh RECEIVE on the pool.
    pub async fn fire_sent(self: &Arc<Self>, session: &SessionHandle, raw: Bytes) -> bool {
        let switching = session.context().lock().await.is_switch_pending();
        if !self.fire(session, EventName::Sent, EventPayload::Sent(raw)).await {
            return false;
        }

        if switching {
            if let Some(event) = self.receive_again(session, None).await {
                self.submit(event);
            }
        }
        true
    }

    /// DISCONNECT, on the pool
    pub async fn fire_disconnect(self: &Arc<Self>, session: &SessionHandle) -> bool {
        self.fire_async(session, EventName::Disconnect, EventPayload::None).await
    }

    /// EXCEPTION, inline
    pub async fn fire_exception(&self, session: &SessionHandle, error: ServerError) -> bool {
        self.fire(session, EventName::Exception, EventPayload::Error(Arc::new(error)))
            .await
    }

    /// Whether `session` has an unfinished `name` event in the ledger
    pub async fn has_in_flight(&self, session: &SessionHandle, name: EventName) -> bool {
        self.ledger
            .lock()
            .await
            .iter()
            .any(|event| event.matches(session, name) && event.is_in_flight())
    }

    /// Entries currently held by the ledger, finished ones included
    pub async fn ledger_len(&self) -> usize {
        self.ledger.lock().await.len()
    }

    /// Stop accepting firings; work already dispatched runs to completion
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.pool.shutdown();
    }

    /// Whether the trigger was shut down
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Sweep finished entries, apply the RECEIVE guard, record the event
    async fn register(
        &self,
        session: &SessionHandle,
        name: EventName,
        payload: EventPayload,
    ) -> Option<Arc<Event>> {
        if self.is_shutdown() {
            return None;
        }

        let mut ledger = self.ledger.lock().await;
        ledger.retain(|event| event.is_in_flight());

        if name == EventName::Receive {
            let blocked = !session.is_handshake_done()
                || !session.is_connected()
                || ledger
                    .iter()
                    .any(|event| event.matches(session, EventName::Receive));
            if blocked {
                log_trace!(session = session.id(), "RECEIVE dropped");
                #[cfg(feature = "metrics")]
                metrics::counter!("tidewire_events_dropped_total", "event" => name.as_str())
                    .increment(1);
                return None;
            }
        }

        let event = Arc::new(Event::new(name, session.clone(), payload));
        ledger.push(event.clone());

        #[cfg(feature = "metrics")]
        metrics::counter!("tidewire_events_fired_total", "event" => name.as_str()).increment(1);

        Some(event)
    }

    /// Process an event, then any RECEIVE it leaves pending, on this task
    async fn run(&self, event: Arc<Event>) {
        let mut next = Some(event);
        while let Some(event) = next.take() {
            if let Some(seen) = self.process(&event).await {
                next = self.receive_again(event.session(), seen).await;
            }
        }
    }

    /// Returns what a RECEIVE left behind, `None` for other events
    async fn process(&self, event: &Event) -> Option<Option<usize>> {
        event.set_state(EventState::Processing);
        let session = event.session();

        let (result, seen) = match event.name() {
            EventName::Receive => match self.process_receive(session).await {
                Ok(seen) => (Ok(()), Some(seen)),
                Err(err) => (Err(err), None),
            },
            _ => (self.dispatch(event).await, None),
        };

        event.set_state(EventState::Finished);

        if let Err(err) = result {
            self.raise(session, err).await;
        }
        seen
    }

    /// Call the handler for a non-RECEIVE event
    async fn dispatch(&self, event: &Event) -> Result<()> {
        let session = event.session();
        match (event.name(), event.payload()) {
            (EventName::Accepted, _) => {
                log_debug!(session = session.id(), remote = ?session.remote_addr(), "accepted");
                Ok(())
            }
            (EventName::Connect, _) => self.handler.on_connect(session).await,
            (EventName::Sent, EventPayload::Sent(raw)) => self.handler.on_sent(session, raw).await,
            (EventName::Disconnect, _) => {
                self.handler.on_disconnect(session).await;
                Ok(())
            }
            (EventName::Exception, EventPayload::Error(err)) => {
                self.handler.on_exception(session, err).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Decode and answer every complete message in the session input
    ///
    /// Returns the input length left undecoded, or `None` when decoding
    /// stopped behind a queued `101`.
    async fn process_receive(&self, session: &SessionHandle) -> Result<Option<usize>> {
        loop {
            if !session.is_connected() {
                return Ok(Some(0));
            }

            let frames = {
                let ctx = session.context().lock().await;
                if ctx.is_switch_pending() {
                    return Ok(None);
                }
                ctx.expects_frames()
            };
            let decoded = {
                let mut input = session.input().lock().await;
                match self.framer.decode(&mut input, frames) {
                    Ok(Some(decoded)) => decoded,
                    Ok(None) => return Ok(Some(input.len())),
                    Err(err) => {
                        input.clear();
                        return Err(err.into());
                    }
                }
            };

            if let Some(reply) = self.handler.on_receive(session, decoded).await? {
                session.send(reply.to_bytes()?);
                if reply.closes_session() {
                    session.close();
                    return Ok(Some(0));
                }
            }
        }
    }

    /// Register a follow-up RECEIVE when there is input left to decode
    ///
    /// `seen` is the undecoded length the last RECEIVE stopped at; `None`
    /// means it stopped behind a queued `101`, so any input counts once the
    /// switch completed.
    async fn receive_again(&self, session: &SessionHandle, seen: Option<usize>) -> Option<Arc<Event>> {
        if !session.is_connected() || session.context().lock().await.is_switch_pending() {
            return None;
        }
        let pending = session.input().lock().await.len();
        if pending <= seen.unwrap_or(0) {
            return None;
        }
        self.register(session, EventName::Receive, EventPayload::None).await
    }

    /// Route a failure to the handler's exception callback
    ///
    /// Exception processing cannot fail, so this never recurses.
    async fn raise(&self, session: &SessionHandle, error: ServerError) {
        let payload = EventPayload::Error(Arc::new(error));
        match self.register(session, EventName::Exception, payload).await {
            Some(event) => {
                event.set_state(EventState::Processing);
                let _ = self.dispatch(&event).await;
                event.set_state(EventState::Finished);
            }
            // Shut down: still make sure the session does not linger
            None => {
                session.close();
            }
        }
    }
}
