//! HTTP keep-alive bookkeeping
//!
//! Sessions that negotiated keep-alive sit in a [`KeepAliveRegistry`] with an
//! absolute deadline that slides forward on every response. The
//! [`KeepAliveReaper`] sweeps the registry on a fixed tick and closes the
//! sessions whose deadline passed.

use crate::log_debug;
use std::sync::Arc;
use std::time::Duration;
use tidewire_core::SessionHandle;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// A session waiting for its next request
#[derive(Debug, Clone)]
pub struct KeepAliveEntry {
    /// The idle session
    pub session: SessionHandle,
    /// Instant after which the session is closed
    pub expiry: Instant,
}

/// Sessions eligible for keep-alive reaping, in registration order
#[derive(Debug, Default)]
pub struct KeepAliveRegistry {
    entries: Mutex<Vec<KeepAliveEntry>>,
}

impl KeepAliveRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` or move its deadline to `expiry`
    pub async fn touch(&self, session: &SessionHandle, expiry: Instant) {
        let mut entries = self.entries.lock().await;
        match entries
            .iter_mut()
            .find(|entry| Arc::ptr_eq(&entry.session, session))
        {
            Some(entry) => entry.expiry = expiry,
            None => entries.push(KeepAliveEntry {
                session: session.clone(),
                expiry,
            }),
        }
    }

    /// Deregister `session`; returns whether it was registered
    pub async fn remove(&self, session: &SessionHandle) -> bool {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|entry| !Arc::ptr_eq(&entry.session, session));
        entries.len() != before
    }

    /// Whether `session` is registered
    pub async fn contains(&self, session: &SessionHandle) -> bool {
        self.entries
            .lock()
            .await
            .iter()
            .any(|entry| Arc::ptr_eq(&entry.session, session))
    }

    /// Deadline of `session`, if registered
    pub async fn expiry_of(&self, session: &SessionHandle) -> Option<Instant> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.session, session))
            .map(|entry| entry.expiry)
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether no session is registered
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Close expired sessions and forget disconnected ones
    ///
    /// Returns how many sessions were closed.
    pub async fn sweep(&self, now: Instant) -> usize {
        let mut closed = 0;
        self.entries.lock().await.retain(|entry| {
            if !entry.session.is_connected() {
                return false;
            }
            if entry.expiry < now {
                log_debug!(session = entry.session.id(), "keep-alive expired");
                entry.session.close();
                closed += 1;
                return false;
            }
            true
        });

        #[cfg(feature = "metrics")]
        metrics::counter!("tidewire_keepalive_expired_total").increment(closed as u64);

        closed
    }
}

/// Background task sweeping a [`KeepAliveRegistry`]
#[derive(Debug)]
pub struct KeepAliveReaper {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl KeepAliveReaper {
    /// Start sweeping after `initial_delay`, then every `tick`
    pub fn spawn(registry: Arc<KeepAliveRegistry>, initial_delay: Duration, tick: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + initial_delay, tick);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        registry.sweep(Instant::now()).await;
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Self { stop, task }
    }

    /// Stop sweeping and wait for the task to end
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}
