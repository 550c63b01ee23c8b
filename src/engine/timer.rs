use super::guard;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

pub type TimerId = u64;

/// Delayed callbacks on the tokio runtime, cancellable as a group on teardown.
#[derive(Default)]
pub struct TimerQueue {
    next_id: AtomicU64,
    pending: Mutex<HashMap<TimerId, JoinHandle<()>>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` once `delay` has elapsed. Must be called inside a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        let mut pending = guard(&self.pending);
        pending.retain(|_, h| !h.is_finished());
        pending.insert(id, handle);
        id
    }

    pub fn cancel(&self, id: TimerId) -> bool {
        match guard(&self.pending).remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<_> = guard(&self.pending).drain().map(|(_, h)| h).collect();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "cancelling pending timers");
        }
        for handle in drained {
            handle.abort();
        }
    }

    /// Timers scheduled and not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        let mut pending = guard(&self.pending);
        pending.retain(|_, h| !h.is_finished());
        pending.len()
    }
}

impl Drop for TimerQueue {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
