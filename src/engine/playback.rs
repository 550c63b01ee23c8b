use super::guard;
use super::pagination::PaginationManager;
use super::store::SharedStore;
use super::timer::TimerQueue;
use crate::error::PlaybackError;
use crate::feed::types::ContentItem;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// A mounted media element the scheduler can drive.
pub trait MediaElement: Send + Sync {
    fn play(&self) -> Result<(), PlaybackError>;
    fn pause(&self) -> Result<(), PlaybackError>;
    fn is_paused(&self) -> bool;
    fn set_hidden(&self, hidden: bool);
    /// Called when the item enters the pre-load margin.
    fn preload(&self) {}
}

/// Settings the UI should hand to its intersection observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverOptions {
    pub threshold: f64,
    pub root_margin_px: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PlaybackConfig {
    pub visibility_threshold: f64,
    pub preload_margin_px: u32,
    pub skip_delay: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.5,
            preload_margin_px: 200,
            skip_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    elements: HashMap<String, Arc<dyn MediaElement>>,
    visible: HashSet<String>,
    current: Option<String>,
}

struct SchedulerInner {
    config: PlaybackConfig,
    pager: Arc<PaginationManager>,
    store: SharedStore,
    timers: TimerQueue,
    state: Mutex<SchedulerState>,
}

/// Plays exactly one video at a time: the current item.
///
/// The current item is tracked by id, so `current_index` keeps pointing at
/// the same item while pages are merged in or other items turn broken.
/// Lock order is scheduler state, then pager, then store; the scheduler
/// never holds its own lock while calling into elements.
#[derive(Clone)]
pub struct PlaybackScheduler {
    inner: Arc<SchedulerInner>,
}

impl PlaybackScheduler {
    pub fn new(config: PlaybackConfig, pager: Arc<PaginationManager>, store: SharedStore) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                pager,
                store,
                timers: TimerQueue::new(),
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    pub fn observer_options(&self) -> ObserverOptions {
        ObserverOptions {
            threshold: self.inner.config.visibility_threshold,
            root_margin_px: self.inner.config.preload_margin_px,
        }
    }

    /// The feed as rendered: merged sequence minus broken items.
    pub fn playable_items(&self) -> Vec<ContentItem> {
        let broken = guard(&self.inner.store).broken_ids();
        self.inner.pager.with_items(|items| {
            items
                .iter()
                .filter(|i| !broken.contains(&i.id))
                .cloned()
                .collect()
        })
    }

    pub fn playable_count(&self) -> usize {
        let broken = guard(&self.inner.store).broken_ids();
        self.inner
            .pager
            .with_items(|items| items.iter().filter(|i| !broken.contains(&i.id)).count())
    }

    pub fn current_item_id(&self) -> Option<String> {
        guard(&self.inner.state).current.clone()
    }

    /// Index of the current item among playable items. While a broken current
    /// item waits to be skipped this is the slot its successor will take.
    pub fn current_index(&self) -> usize {
        let Some(current) = self.current_item_id() else {
            return 0;
        };
        let broken = guard(&self.inner.store).broken_ids();
        self.inner.pager.with_items(|items| {
            let Some(pos) = items.iter().position(|i| i.id == current) else {
                return 0;
            };
            let before = items[..pos].iter().filter(|i| !broken.contains(&i.id)).count();
            let playable = items.iter().filter(|i| !broken.contains(&i.id)).count();
            before.min(playable.saturating_sub(1))
        })
    }

    pub fn current_item(&self) -> Option<ContentItem> {
        let current = self.current_item_id()?;
        self.inner.pager.item(&current)
    }

    /// Make the playable item at `index` current. Out-of-range indexes clamp to the last item.
    pub fn set_current_index(&self, index: usize) {
        let playable = self.playable_items();
        match playable.get(index.min(playable.len().saturating_sub(1))) {
            Some(item) => self.activate(&item.id),
            None => self.deactivate(),
        }
    }

    /// Make the first playable item current if nothing is.
    pub fn ensure_current(&self) {
        let has_current = self
            .current_item_id()
            .is_some_and(|id| self.inner.pager.item(&id).is_some());
        if !has_current {
            self.set_current_index(0);
        }
    }

    pub fn register_item_element(&self, item_id: &str, element: Arc<dyn MediaElement>) {
        let (replaced, is_current) = {
            let mut st = guard(&self.inner.state);
            let replaced = st.elements.insert(item_id.to_string(), element.clone());
            (replaced, st.current.as_deref() == Some(item_id))
        };
        if let Some(old) = replaced {
            if !Arc::ptr_eq(&old, &element) {
                let _ = old.pause();
            }
        }

        if guard(&self.inner.store).is_broken(item_id) {
            element.set_hidden(true);
            let _ = element.pause();
            return;
        }
        if is_current && self.is_video(item_id) {
            if let Err(e) = element.play() {
                self.on_media_error(item_id, &e.reason);
            }
        } else if let Err(e) = element.pause() {
            tracing::warn!(item = item_id, error = %e, "pause on register failed");
        }
    }

    /// Returns false if nothing was registered for `item_id`.
    pub fn unregister_item_element(&self, item_id: &str) -> bool {
        let removed = {
            let mut st = guard(&self.inner.state);
            st.visible.remove(item_id);
            st.elements.remove(item_id)
        };
        match removed {
            Some(element) => {
                if let Err(e) = element.pause() {
                    tracing::warn!(item = item_id, error = %e, "pause on unregister failed");
                }
                true
            }
            None => false,
        }
    }

    /// Intersection observer callback. `ratio` is the visible fraction of the
    /// item's area within the margin-expanded viewport.
    pub fn on_intersection(&self, item_id: &str, ratio: f64) {
        let (element, became_current) = {
            let mut st = guard(&self.inner.state);
            let element = st.elements.get(item_id).cloned();
            if ratio >= self.inner.config.visibility_threshold {
                st.visible.insert(item_id.to_string());
                (element, st.current.as_deref() != Some(item_id))
            } else {
                st.visible.remove(item_id);
                (element, false)
            }
        };
        if ratio > 0.0 {
            if let Some(element) = element {
                element.preload();
            }
        }
        if became_current && !guard(&self.inner.store).is_broken(item_id) {
            self.activate(item_id);
        }
    }

    pub fn visible_items(&self) -> Vec<String> {
        guard(&self.inner.state).visible.iter().cloned().collect()
    }

    /// Items whose element currently reports playing.
    pub fn playing_items(&self) -> Vec<String> {
        guard(&self.inner.state)
            .elements
            .iter()
            .filter(|(_, el)| !el.is_paused())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Media error reported by an element: mark broken, hide it, and if it was
    /// current, skip past it after the configured delay.
    pub fn on_media_error(&self, item_id: &str, reason: &str) {
        let newly_broken = guard(&self.inner.store).mark_broken(item_id);
        let (element, is_current) = {
            let st = guard(&self.inner.state);
            (
                st.elements.get(item_id).cloned(),
                st.current.as_deref() == Some(item_id),
            )
        };
        if let Some(element) = element {
            let _ = element.pause();
            element.set_hidden(true);
        }
        if !newly_broken {
            return;
        }
        tracing::warn!(item = item_id, reason, "media failed, item marked broken");

        if is_current {
            let weak: Weak<SchedulerInner> = Arc::downgrade(&self.inner);
            let id = item_id.to_string();
            self.inner.timers.schedule(self.inner.config.skip_delay, move || {
                if let Some(inner) = weak.upgrade() {
                    PlaybackScheduler { inner }.skip_broken(&id);
                }
            });
        }
    }

    fn skip_broken(&self, item_id: &str) {
        if self.current_item_id().as_deref() != Some(item_id) {
            return;
        }
        self.advance_from(item_id);
    }

    /// Move off `item_id`: to the next playable item, else the previous one,
    /// else stay (or clear if `item_id` itself is unplayable).
    pub fn advance_from(&self, item_id: &str) {
        let broken = guard(&self.inner.store).broken_ids();
        let target = self.inner.pager.with_items(|items| {
            let pos = items.iter().position(|i| i.id == item_id)?;
            items[pos + 1..]
                .iter()
                .find(|i| !broken.contains(&i.id))
                .or_else(|| items[..pos].iter().rev().find(|i| !broken.contains(&i.id)))
                .map(|i| i.id.clone())
        });

        match target {
            Some(next) => {
                tracing::debug!(from = item_id, to = %next, "advancing current item");
                self.activate(&next);
            }
            None if broken.contains(item_id) => self.deactivate(),
            None => {}
        }
    }

    /// Pause every element, cancel pending skips and forget the current item.
    pub fn reset(&self) {
        self.inner.timers.cancel_all();
        self.deactivate();
        guard(&self.inner.state).visible.clear();
    }

    /// Teardown: reset and drop every registered element.
    pub fn shutdown(&self) {
        self.reset();
        guard(&self.inner.state).elements.clear();
    }

    pub fn pending_skips(&self) -> usize {
        self.inner.timers.pending()
    }

    fn is_video(&self, item_id: &str) -> bool {
        self.inner
            .pager
            .item(item_id)
            .is_some_and(|i| i.is_video())
    }

    fn activate(&self, item_id: &str) {
        let (others, target) = {
            let mut st = guard(&self.inner.state);
            st.current = Some(item_id.to_string());
            let others: Vec<(String, Arc<dyn MediaElement>)> = st
                .elements
                .iter()
                .filter(|(id, _)| id.as_str() != item_id)
                .map(|(id, el)| (id.clone(), el.clone()))
                .collect();
            (others, st.elements.get(item_id).cloned())
        };

        for (id, element) in others {
            if let Err(e) = element.pause() {
                tracing::warn!(item = %id, error = %e, "pause failed");
            }
        }

        let Some(element) = target else { return };
        if !self.is_video(item_id) {
            return;
        }
        if let Err(e) = element.play() {
            self.on_media_error(item_id, &e.reason);
        }
    }

    fn deactivate(&self) {
        let elements: Vec<Arc<dyn MediaElement>> = {
            let mut st = guard(&self.inner.state);
            st.current = None;
            st.elements.values().cloned().collect()
        };
        for element in elements {
            let _ = element.pause();
        }
    }
}

/// Element stand-in for headless runs: tracks state and logs transitions.
#[derive(Debug)]
pub struct HeadlessElement {
    item_id: String,
    paused: AtomicBool,
    hidden: AtomicBool,
    fail_play: AtomicBool,
    fail_pause: AtomicBool,
    plays: AtomicU32,
    preloads: AtomicU32,
}

impl HeadlessElement {
    pub fn new(item_id: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            paused: AtomicBool::new(true),
            hidden: AtomicBool::new(false),
            fail_play: AtomicBool::new(false),
            fail_pause: AtomicBool::new(false),
            plays: AtomicU32::new(0),
            preloads: AtomicU32::new(0),
        }
    }

    /// An element whose media never decodes.
    pub fn broken(item_id: &str) -> Self {
        let el = Self::new(item_id);
        el.fail_play.store(true, Ordering::SeqCst);
        el
    }

    /// Starts unpaused, as an autoplaying element would.
    pub fn autoplaying(item_id: &str) -> Self {
        let el = Self::new(item_id);
        el.paused.store(false, Ordering::SeqCst);
        el
    }

    pub fn set_fail_pause(&self, fail: bool) {
        self.fail_pause.store(fail, Ordering::SeqCst);
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::SeqCst)
    }

    pub fn play_count(&self) -> u32 {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn preload_count(&self) -> u32 {
        self.preloads.load(Ordering::SeqCst)
    }
}

impl MediaElement for HeadlessElement {
    fn play(&self) -> Result<(), PlaybackError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(PlaybackError::new(&self.item_id, "MEDIA_ERR_DECODE"));
        }
        self.paused.store(false, Ordering::SeqCst);
        tracing::debug!(item = %self.item_id, "play");
        Ok(())
    }

    fn pause(&self) -> Result<(), PlaybackError> {
        if self.fail_pause.load(Ordering::SeqCst) {
            return Err(PlaybackError::new(&self.item_id, "pause rejected"));
        }
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::SeqCst);
    }

    fn preload(&self) {
        self.preloads.fetch_add(1, Ordering::SeqCst);
    }
}
