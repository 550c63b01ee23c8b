pub mod breaker;
pub mod cache;
pub mod engagement;
pub mod pagination;
pub mod playback;
pub mod store;
pub mod timer;

pub use breaker::{BreakerConfig, BreakerPhase, CircuitBreaker};
pub use cache::{CacheKey, QueryCache};
pub use engagement::EngagementReconciler;
pub use pagination::{LoadOutcome, PaginationManager, DEFAULT_PAGE_SIZE};
pub use playback::{HeadlessElement, MediaElement, ObserverOptions, PlaybackConfig, PlaybackScheduler};
pub use store::{EngagementStore, ItemEngagementState, SharedStore};
pub use timer::TimerQueue;

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
