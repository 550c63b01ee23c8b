pub mod fixture;
pub mod rest;
pub mod types;

use crate::error::{AdapterError, MutationError};
use async_trait::async_trait;
use types::{BookmarkFolder, BookmarkRequest, ContentItem, EngagementRequest, PageCursor};

/// Remote paged-content endpoint. The only place a page fetch happens.
#[async_trait]
pub trait ContentAdapter: Send + Sync {
    /// Fetch up to `limit` items of `source_id` starting at `cursor.offset`.
    /// An empty page means the source is exhausted server-side.
    async fn fetch_page(
        &self,
        source_id: &str,
        cursor: PageCursor,
        limit: usize,
    ) -> Result<Vec<ContentItem>, AdapterError>;

    /// Total item count last reported for `source_id`, if the backend reports one.
    fn reported_total(&self, _source_id: &str) -> Option<usize> {
        None
    }
}

/// Remote engagement and bookmark writes.
#[async_trait]
pub trait EngagementApi: Send + Sync {
    async fn record_engagement(&self, req: &EngagementRequest) -> Result<(), MutationError>;

    /// Returns the full, authoritative bookmark folder listing.
    async fn set_bookmark(&self, req: &BookmarkRequest) -> Result<Vec<BookmarkFolder>, MutationError>;
}
