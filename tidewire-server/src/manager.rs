//! Session manager
//!
//! Tracks the live sessions of a server: hands out identifiers, enforces the
//! connection limit, and closes everything on shutdown.

use crate::error::ConnectionError;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tidewire_core::{Outbound, Session, SessionHandle, SessionId};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Mutex, Notify};

/// Session manager statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Sessions currently live
    pub active_sessions: usize,
    /// Sessions opened since start
    pub total_sessions: u64,
    /// Highest number of concurrent sessions
    pub peak_sessions: usize,
    /// Connections refused because of the limit
    pub refused_sessions: u64,
}

/// Live sessions by id
#[derive(Debug)]
pub struct SessionManager {
    max_sessions: usize,
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    stats: Mutex<ManagerStats>,
    emptied: Notify,
}

impl SessionManager {
    /// Create a manager admitting at most `max_sessions` at once
    pub fn new(max_sessions: usize) -> Self {
        Self {
            max_sessions,
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            stats: Mutex::new(ManagerStats::default()),
            emptied: Notify::new(),
        }
    }

    /// Admit a new session
    pub async fn open(
        &self,
        remote_addr: Option<SocketAddr>,
        local_addr: Option<SocketAddr>,
    ) -> Result<(SessionHandle, UnboundedReceiver<Outbound>), ConnectionError> {
        let mut sessions = self.sessions.lock().await;
        let mut stats = self.stats.lock().await;

        if sessions.len() >= self.max_sessions {
            stats.refused_sessions += 1;
            return Err(ConnectionError::LimitExceeded {
                current: sessions.len(),
                max: self.max_sessions,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (session, rx) = Session::new(id, remote_addr, local_addr);
        sessions.insert(id, session.clone());

        stats.active_sessions = sessions.len();
        stats.total_sessions += 1;
        stats.peak_sessions = stats.peak_sessions.max(stats.active_sessions);

        Ok((session, rx))
    }

    /// Forget a session
    pub async fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        let removed = sessions.remove(&id);
        self.stats.lock().await.active_sessions = sessions.len();
        if sessions.is_empty() {
            self.emptied.notify_waiters();
        }
        removed
    }

    /// Session by id
    pub async fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.lock().await.get(&id).cloned()
    }

    /// Snapshot of the live sessions
    pub async fn sessions(&self) -> Vec<SessionHandle> {
        self.sessions.lock().await.values().cloned().collect()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no session is live
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Current statistics
    pub async fn stats(&self) -> ManagerStats {
        self.stats.lock().await.clone()
    }

    /// Close every live session; returns how many were still connected
    pub async fn close_all(&self) -> usize {
        self.sessions()
            .await
            .iter()
            .filter(|session| session.close())
            .count()
    }

    /// Wait until every session was removed
    pub async fn wait_empty(&self) {
        loop {
            let notified = self.emptied.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_empty().await {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_limit_and_stats() {
        let manager = SessionManager::new(2);

        let (first, _rx1) = manager.open(None, None).await.unwrap();
        let (second, _rx2) = manager.open(None, None).await.unwrap();
        assert_ne!(first.id(), second.id());

        let refused = manager.open(None, None).await;
        assert!(matches!(
            refused,
            Err(ConnectionError::LimitExceeded { current: 2, max: 2 })
        ));

        assert!(manager.remove(first.id()).await.is_some());
        assert!(manager.remove(first.id()).await.is_none());
        assert!(manager.open(None, None).await.is_ok());

        let stats = manager.stats().await;
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.peak_sessions, 2);
        assert_eq!(stats.refused_sessions, 1);
    }

    #[tokio::test]
    async fn test_close_all_and_wait_empty() {
        let manager = Arc::new(SessionManager::new(8));
        let mut handles = Vec::new();
        for _ in 0..3 {
            handles.push(manager.open(None, None).await.unwrap());
        }
        handles[0].0.close();

        assert_eq!(manager.close_all().await, 2);
        assert!(handles.iter().all(|(session, _)| !session.is_connected()));

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_empty().await })
        };
        for (session, _) in &handles {
            manager.remove(session.id()).await;
        }

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(manager.get(handles[0].0.id()).await.is_none());
    }
}
