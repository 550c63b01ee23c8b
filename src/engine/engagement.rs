use super::cache::{CacheKey, CacheValue, QueryCache};
use super::guard;
use super::pagination::PaginationManager;
use super::playback::PlaybackScheduler;
use super::store::SharedStore;
use crate::error::MutationError;
use crate::feed::types::{BookmarkFolder, BookmarkRequest, EngagementAction, EngagementRequest};
use crate::feed::EngagementApi;
use std::sync::Arc;

/// Applies engagement actions to local state first, then tells the server.
///
/// Failed writes are logged and the optimistic flag is left as is. The one
/// exception is bookmarks: a successful write returns the folder listing,
/// which replaces the local bookmark set outright.
pub struct EngagementReconciler {
    api: Arc<dyn EngagementApi>,
    store: SharedStore,
    pager: Arc<PaginationManager>,
    cache: Arc<QueryCache>,
    scheduler: PlaybackScheduler,
}

impl EngagementReconciler {
    pub fn new(
        api: Arc<dyn EngagementApi>,
        store: SharedStore,
        pager: Arc<PaginationManager>,
        cache: Arc<QueryCache>,
        scheduler: PlaybackScheduler,
    ) -> Self {
        Self {
            api,
            store,
            pager,
            cache,
            scheduler,
        }
    }

    pub async fn like(&self, item_id: &str) -> Result<(), MutationError> {
        let Some(source_id) = self.source_of(item_id, "like") else {
            return Ok(());
        };
        guard(&self.store).set_liked(item_id);
        self.send(item_id, source_id, EngagementAction::Like).await
    }

    /// Dislike and move playback off the item.
    pub async fn dislike(&self, item_id: &str) -> Result<(), MutationError> {
        let Some(source_id) = self.source_of(item_id, "dislike") else {
            return Ok(());
        };
        guard(&self.store).set_disliked(item_id);
        self.advance_if_current(item_id);
        self.send(item_id, source_id, EngagementAction::Dislike).await
    }

    /// Viewer finished the item; record it and advance.
    pub async fn mark_complete(&self, item_id: &str) -> Result<(), MutationError> {
        let Some(source_id) = self.source_of(item_id, "complete") else {
            return Ok(());
        };
        guard(&self.store).set_completed(item_id);
        self.advance_if_current(item_id);
        self.send(item_id, source_id, EngagementAction::Complete).await
    }

    /// Flip the bookmark flag. Returns the flag as it stands after reconciliation.
    pub async fn toggle_bookmark(&self, item_id: &str) -> Result<bool, MutationError> {
        if self.source_of(item_id, "bookmark").is_none() {
            return Ok(false);
        }
        let bookmarked = guard(&self.store).toggle_bookmark(item_id);
        let req = BookmarkRequest {
            item_id: item_id.to_string(),
            bookmarked,
        };
        match self.api.set_bookmark(&req).await {
            Ok(folders) => {
                self.apply_folders(folders);
                Ok(guard(&self.store).get(item_id).bookmarked)
            }
            Err(e) => {
                tracing::warn!(item = item_id, error = %e, "bookmark write failed, keeping local flag");
                Err(e)
            }
        }
    }

    /// Folder listing, from cache when fresh.
    pub fn bookmark_folders(&self) -> Vec<BookmarkFolder> {
        self.cache
            .bookmarks()
            .unwrap_or_else(|| guard(&self.store).folders().to_vec())
    }

    pub fn is_liked(&self, item_id: &str) -> bool {
        guard(&self.store).get(item_id).liked
    }

    pub fn is_disliked(&self, item_id: &str) -> bool {
        guard(&self.store).get(item_id).disliked
    }

    pub fn is_bookmarked(&self, item_id: &str) -> bool {
        guard(&self.store).get(item_id).bookmarked
    }

    pub fn is_completed(&self, item_id: &str) -> bool {
        guard(&self.store).get(item_id).completed
    }

    fn apply_folders(&self, folders: Vec<BookmarkFolder>) {
        self.cache.put(CacheKey::Bookmarks, CacheValue::Bookmarks(folders.clone()));
        guard(&self.store).replace_bookmarks(folders);
    }

    fn source_of(&self, item_id: &str, action: &str) -> Option<String> {
        let source = self.pager.item(item_id).map(|i| i.source_id);
        if source.is_none() {
            tracing::warn!(item = item_id, action, "engagement on unknown item ignored");
        }
        source
    }

    fn advance_if_current(&self, item_id: &str) {
        if self.scheduler.current_item_id().as_deref() == Some(item_id) {
            self.scheduler.advance_from(item_id);
        }
    }

    async fn send(&self, item_id: &str, source_id: String, action: EngagementAction) -> Result<(), MutationError> {
        let req = EngagementRequest {
            item_id: item_id.to_string(),
            source_id,
            action,
        };
        match self.api.record_engagement(&req).await {
            Ok(()) => {
                tracing::debug!(item = item_id, action = action.as_str(), "engagement recorded");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(item = item_id, action = action.as_str(), error = %e, "engagement write failed, keeping local flag");
                Err(e)
            }
        }
    }
}
