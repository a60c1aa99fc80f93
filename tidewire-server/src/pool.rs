//! Worker pool for event processing
//!
//! Handler work runs here instead of on the I/O runtime. The pool is created
//! explicitly when a server starts and handed to the [`EventTrigger`]; tests
//! can wrap the runtime they already run on.
//!
//! [`EventTrigger`]: crate::trigger::EventTrigger

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Notify;

/// Idle blocking threads are reclaimed after this long
const THREAD_KEEP_ALIVE: Duration = Duration::from_secs(20);

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when the task ends, panics included
struct TaskGuard(Arc<InFlight>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Task pool running event processing
#[derive(Debug)]
pub struct WorkerPool {
    runtime: Option<Runtime>,
    handle: Handle,
    shutdown: AtomicBool,
    in_flight: Arc<InFlight>,
}

impl WorkerPool {
    /// Start a dedicated multi-threaded runtime with `threads` workers
    pub fn new(threads: usize) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_keep_alive(THREAD_KEEP_ALIVE)
            .thread_name("tidewire-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        Ok(Self {
            runtime: Some(runtime),
            handle,
            shutdown: AtomicBool::new(false),
            in_flight: Arc::default(),
        })
    }

    /// Run tasks on an existing runtime
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            runtime: None,
            handle,
            shutdown: AtomicBool::new(false),
            in_flight: Arc::default(),
        }
    }

    /// Run tasks on the runtime of the calling task
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::from_handle(Handle::current())
    }

    /// Submit a task; returns `false` once the pool was shut down
    pub fn execute<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return false;
        }

        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        let guard = TaskGuard(self.in_flight.clone());
        self.handle.spawn(async move {
            let _guard = guard;
            task.await;
        });
        true
    }

    /// Stop accepting tasks; submitted ones still run
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Whether the pool stopped accepting tasks
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Tasks submitted and not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Wait until every submitted task has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
