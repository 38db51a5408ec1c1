//! Retransmission timers for the negotiation engines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::AbortHandle;
use tracing::trace;
use zrtp_protocol::StreamName;

/// Identifies the one pending timeout a stream may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub session: u64,
    pub stream: StreamName,
}

/// Receives expired timeouts.
pub trait TimeoutHandler: Send + Sync {
    fn handle_timeout(&self, key: TimerKey);
}

/// Schedules at most one timeout per key.
pub trait TimeoutScheduler: Send + Sync {
    /// Arm (or re-arm) the timeout for `key`. The handler is held weakly and
    /// skipped if it is gone when the timeout expires.
    fn request_timeout(
        &self,
        key: TimerKey,
        delay: Duration,
        handler: Weak<dyn TimeoutHandler>,
    ) -> bool;

    /// Cancel the pending timeout for `key`, if any.
    fn cancel(&self, key: TimerKey);
}

struct Pending {
    id: u64,
    task: AbortHandle,
}

type PendingMap = Arc<Mutex<HashMap<TimerKey, Pending>>>;

/// Scheduler running one tokio task per pending timeout.
pub struct TokioTimeoutScheduler {
    handle: Handle,
    pending: PendingMap,
    next_id: AtomicU64,
    // Owned when no ambient runtime existed at construction.
    runtime: Option<Runtime>,
}

impl TokioTimeoutScheduler {
    /// Use the current tokio runtime, or start a private single-worker
    /// runtime when called outside of one.
    pub fn new() -> std::io::Result<Self> {
        match Handle::try_current() {
            Ok(handle) => Ok(Self::with_handle(handle)),
            Err(_) => {
                let runtime = Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("zrtp-timer")
                    .enable_time()
                    .build()?;
                let mut scheduler = Self::with_handle(runtime.handle().clone());
                scheduler.runtime = Some(runtime);
                Ok(scheduler)
            }
        }
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            runtime: None,
        }
    }

    /// Number of armed timeouts.
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl TimeoutScheduler for TokioTimeoutScheduler {
    fn request_timeout(
        &self,
        key: TimerKey,
        delay: Duration,
        handler: Weak<dyn TimeoutHandler>,
    ) -> bool {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);

        // Insert before the task can observe the map so a zero delay
        // still finds its own entry.
        let mut map = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut map = pending.lock().unwrap_or_else(|p| p.into_inner());
                let current = map.get(&key).is_some_and(|entry| entry.id == id);
                if current {
                    map.remove(&key);
                }
                current
            };
            if !current {
                return;
            }
            match handler.upgrade() {
                Some(handler) => handler.handle_timeout(key),
                None => trace!(stream = ?key.stream, "timeout handler gone"),
            }
        });
        if let Some(old) = map.insert(
            key,
            Pending {
                id,
                task: task.abort_handle(),
            },
        ) {
            old.task.abort();
        }
        trace!(stream = ?key.stream, delay_ms = delay.as_millis() as u64, "timer armed");
        true
    }

    fn cancel(&self, key: TimerKey) {
        let mut map = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(old) = map.remove(&key) {
            old.task.abort();
            trace!(stream = ?key.stream, "timer cancelled");
        }
    }
}

impl Drop for TokioTimeoutScheduler {
    fn drop(&mut self) {
        let mut map = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        for (_, pending) in map.drain() {
            pending.task.abort();
        }
        drop(map);
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
