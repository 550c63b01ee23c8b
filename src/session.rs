//! One viewer's feed: wires the engine components together and exposes the
//! surface a rendering layer drives.

use crate::config::Config;
use crate::engine::{
    guard, BreakerConfig, BreakerPhase, CircuitBreaker, EngagementReconciler, EngagementStore,
    ItemEngagementState, LoadOutcome, MediaElement, ObserverOptions, PaginationManager,
    PlaybackConfig, PlaybackScheduler, QueryCache, SharedStore, DEFAULT_PAGE_SIZE,
};
use crate::error::MutationError;
use crate::feed::types::{BookmarkFolder, ContentItem, ContentSource};
use crate::feed::{ContentAdapter, EngagementApi};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub page_size: usize,
    pub cache_ttl: Duration,
    pub breaker: BreakerConfig,
    pub playback: PlaybackConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_ttl: Duration::from_secs(300),
            breaker: BreakerConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.feed.page_size,
            cache_ttl: config.feed.cache_ttl(),
            breaker: config.breaker.to_breaker_config(),
            playback: config.playback.to_playback_config(),
        }
    }
}

pub struct FeedSession {
    breaker: Arc<CircuitBreaker>,
    cache: Arc<QueryCache>,
    store: SharedStore,
    pager: Arc<PaginationManager>,
    scheduler: PlaybackScheduler,
    reconciler: EngagementReconciler,
}

impl FeedSession {
    pub fn new(
        sources: Vec<ContentSource>,
        options: SessionOptions,
        adapter: Arc<dyn ContentAdapter>,
        api: Arc<dyn EngagementApi>,
    ) -> Self {
        let cache = Arc::new(QueryCache::new(options.cache_ttl));
        Self::with_cache(sources, options, adapter, api, cache)
    }

    /// Build a session over an existing cache, e.g. when the feed view is
    /// remounted and fresh pages should be served without a network round.
    pub fn with_cache(
        sources: Vec<ContentSource>,
        options: SessionOptions,
        adapter: Arc<dyn ContentAdapter>,
        api: Arc<dyn EngagementApi>,
        cache: Arc<QueryCache>,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(options.breaker));
        let store = EngagementStore::shared();
        let pager = Arc::new(PaginationManager::new(
            sources,
            adapter,
            breaker.clone(),
            cache.clone(),
            options.page_size,
        ));
        let scheduler = PlaybackScheduler::new(options.playback, pager.clone(), store.clone());
        let reconciler = EngagementReconciler::new(
            api,
            store.clone(),
            pager.clone(),
            cache.clone(),
            scheduler.clone(),
        );
        Self {
            breaker,
            cache,
            store,
            pager,
            scheduler,
            reconciler,
        }
    }

    /// Session over a backend that serves both pages and mutations.
    pub fn from_config<B>(config: &Config, backend: Arc<B>) -> Self
    where
        B: ContentAdapter + EngagementApi + 'static,
    {
        Self::new(
            config.sources.clone(),
            SessionOptions::from_config(config),
            backend.clone(),
            backend,
        )
    }

    pub fn sources(&self) -> &[ContentSource] {
        self.pager.sources()
    }

    // --- pagination ---

    pub async fn load_more(&self) -> LoadOutcome {
        let outcome = self.pager.load_more().await;
        self.scheduler.ensure_current();
        outcome
    }

    /// Start over from the first page of every source.
    pub async fn refresh(&self) -> LoadOutcome {
        self.scheduler.reset();
        let outcome = self.pager.refresh().await;
        self.scheduler.ensure_current();
        outcome
    }

    pub fn has_more(&self) -> bool {
        self.pager.has_more()
    }

    pub fn is_loading(&self) -> bool {
        self.pager.is_loading()
    }

    pub fn loaded_count(&self) -> usize {
        self.pager.loaded_count()
    }

    pub fn total_count(&self) -> usize {
        self.pager.total_count()
    }

    /// The merged sequence, broken items included.
    pub fn items(&self) -> Vec<ContentItem> {
        self.pager.items()
    }

    pub fn playable_items(&self) -> Vec<ContentItem> {
        self.scheduler.playable_items()
    }

    pub fn playable_count(&self) -> usize {
        self.scheduler.playable_count()
    }

    pub fn breaker_phase(&self) -> BreakerPhase {
        self.breaker.phase()
    }

    // --- playback ---

    pub fn current_index(&self) -> usize {
        self.scheduler.current_index()
    }

    pub fn set_current_index(&self, index: usize) {
        self.scheduler.set_current_index(index);
    }

    pub fn current_item(&self) -> Option<ContentItem> {
        self.scheduler.current_item()
    }

    pub fn register_item_element(&self, item_id: &str, element: Arc<dyn MediaElement>) {
        self.scheduler.register_item_element(item_id, element);
    }

    pub fn unregister_item_element(&self, item_id: &str) -> bool {
        self.scheduler.unregister_item_element(item_id)
    }

    pub fn on_intersection(&self, item_id: &str, ratio: f64) {
        self.scheduler.on_intersection(item_id, ratio);
    }

    pub fn on_media_error(&self, item_id: &str, reason: &str) {
        self.scheduler.on_media_error(item_id, reason);
    }

    pub fn observer_options(&self) -> ObserverOptions {
        self.scheduler.observer_options()
    }

    pub fn playing_items(&self) -> Vec<String> {
        self.scheduler.playing_items()
    }

    // --- engagement ---

    pub fn item_state(&self, item_id: &str) -> ItemEngagementState {
        guard(&self.store).get(item_id)
    }

    pub async fn like(&self, item_id: &str) -> Result<(), MutationError> {
        self.reconciler.like(item_id).await
    }

    pub async fn dislike(&self, item_id: &str) -> Result<(), MutationError> {
        self.reconciler.dislike(item_id).await
    }

    pub async fn toggle_bookmark(&self, item_id: &str) -> Result<bool, MutationError> {
        self.reconciler.toggle_bookmark(item_id).await
    }

    pub async fn mark_complete(&self, item_id: &str) -> Result<(), MutationError> {
        self.reconciler.mark_complete(item_id).await
    }

    pub fn bookmark_folders(&self) -> Vec<BookmarkFolder> {
        self.reconciler.bookmark_folders()
    }

    /// Logout or viewer change. Pending skips are cancelled, engagement state
    /// and cached queries are dropped, and fetches still in flight are
    /// discarded when they land.
    pub fn end_session(&self) {
        self.pager.close();
        self.scheduler.shutdown();
        guard(&self.store).clear();
        self.cache.clear();
        tracing::info!("feed session ended");
    }
}
