//! In-memory backend with failure injection.
//!
//! Serves fixed per-source item lists through the same traits as the REST
//! backend. Used by the integration tests and by the binary's `--demo` mode.

use super::types::*;
use super::{ContentAdapter, EngagementApi};
use crate::engine::guard;
use crate::error::{AdapterError, MutationError};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tokio::sync::watch;

const DEFAULT_FOLDER: &str = "Saved";

#[derive(Debug, Clone, Copy)]
enum Failure {
    Next(u32),
    Always,
}

pub struct FixtureBackend {
    sources: Mutex<HashMap<String, Vec<ContentItem>>>,
    failures: Mutex<HashMap<String, Failure>>,
    fetch_counts: Mutex<HashMap<String, usize>>,
    gate: watch::Sender<bool>,
    engagements: Mutex<Vec<EngagementRequest>>,
    fail_mutations: Mutex<bool>,
    folders: Mutex<BTreeMap<String, Vec<String>>>,
}

impl Default for FixtureBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// `count` video items for `source_id`, newest first, one minute apart.
pub fn sample_items(source_id: &str, count: usize, newest: DateTime<Utc>) -> Vec<ContentItem> {
    (0..count)
        .map(|i| ContentItem {
            id: format!("{}-{}", source_id, i),
            source_id: source_id.to_string(),
            media_kind: MediaKind::Video,
            media_url: Some(format!("https://cdn.example.com/{}/{}.mp4", source_id, i)),
            title: format!("{} reel {}", source_id, i),
            description: None,
            created_at: newest - ChronoDuration::minutes(i as i64),
        })
        .collect()
}

impl FixtureBackend {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            sources: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            fetch_counts: Mutex::new(HashMap::new()),
            gate,
            engagements: Mutex::new(Vec::new()),
            fail_mutations: Mutex::new(false),
            folders: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_source(self, source_id: &str, items: Vec<ContentItem>) -> Self {
        guard(&self.sources).insert(source_id.to_string(), items);
        self
    }

    /// Fail the next `n` fetches of `source_id`.
    pub fn fail_next(&self, source_id: &str, n: u32) {
        guard(&self.failures).insert(source_id.to_string(), Failure::Next(n));
    }

    pub fn fail_always(&self, source_id: &str) {
        guard(&self.failures).insert(source_id.to_string(), Failure::Always);
    }

    pub fn recover(&self, source_id: &str) {
        guard(&self.failures).remove(source_id);
    }

    /// Number of fetches that reached this backend for `source_id`.
    pub fn fetch_count(&self, source_id: &str) -> usize {
        guard(&self.fetch_counts).get(source_id).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        guard(&self.fetch_counts).values().sum()
    }

    /// Hold every fetch in flight until `release` is called.
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn set_fail_mutations(&self, fail: bool) {
        *guard(&self.fail_mutations) = fail;
    }

    pub fn engagements(&self) -> Vec<EngagementRequest> {
        guard(&self.engagements).clone()
    }

    /// Replace a server-side bookmark folder.
    pub fn seed_folder(&self, folder_name: &str, item_ids: &[&str]) {
        guard(&self.folders).insert(
            folder_name.to_string(),
            item_ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    fn folder_listing(folders: &BTreeMap<String, Vec<String>>) -> Vec<BookmarkFolder> {
        folders
            .iter()
            .map(|(name, ids)| BookmarkFolder {
                folder_name: name.clone(),
                items: ids.iter().map(|id| BookmarkedItem { id: id.clone() }).collect(),
            })
            .collect()
    }

    fn take_failure(&self, source_id: &str) -> bool {
        let mut failures = guard(&self.failures);
        match failures.get(source_id).copied() {
            Some(Failure::Always) => true,
            Some(Failure::Next(n)) if n > 1 => {
                failures.insert(source_id.to_string(), Failure::Next(n - 1));
                true
            }
            Some(Failure::Next(_)) => {
                failures.remove(source_id);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ContentAdapter for FixtureBackend {
    async fn fetch_page(
        &self,
        source_id: &str,
        cursor: PageCursor,
        limit: usize,
    ) -> Result<Vec<ContentItem>, AdapterError> {
        *guard(&self.fetch_counts).entry(source_id.to_string()).or_insert(0) += 1;

        let mut gate = self.gate.subscribe();
        let open = gate.wait_for(|open| *open).await.is_ok();
        if !open {
            return Err(AdapterError::new(source_id, "backend shut down"));
        }
        tokio::task::yield_now().await;

        if self.take_failure(source_id) {
            return Err(AdapterError::new(source_id, "HTTP 503: injected failure"));
        }

        let sources = guard(&self.sources);
        let Some(items) = sources.get(source_id) else {
            return Err(AdapterError::new(source_id, "HTTP 404: unknown source"));
        };
        let start = cursor.offset.min(items.len());
        let end = (start + limit).min(items.len());
        Ok(items[start..end].to_vec())
    }

    fn reported_total(&self, source_id: &str) -> Option<usize> {
        guard(&self.sources).get(source_id).map(Vec::len)
    }
}

#[async_trait]
impl EngagementApi for FixtureBackend {
    async fn record_engagement(&self, req: &EngagementRequest) -> Result<(), MutationError> {
        tokio::task::yield_now().await;
        if *guard(&self.fail_mutations) {
            return Err(MutationError::new(&req.item_id, req.action.as_str(), "HTTP 500: injected failure"));
        }
        guard(&self.engagements).push(req.clone());
        Ok(())
    }

    async fn set_bookmark(&self, req: &BookmarkRequest) -> Result<Vec<BookmarkFolder>, MutationError> {
        tokio::task::yield_now().await;
        if *guard(&self.fail_mutations) {
            return Err(MutationError::new(&req.item_id, "bookmark", "HTTP 500: injected failure"));
        }
        let mut folders = guard(&self.folders);
        if req.bookmarked {
            let saved = folders.entry(DEFAULT_FOLDER.to_string()).or_default();
            if !saved.contains(&req.item_id) {
                saved.push(req.item_id.clone());
            }
        } else {
            for ids in folders.values_mut() {
                ids.retain(|id| id != &req.item_id);
            }
        }
        Ok(Self::folder_listing(&folders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> FixtureBackend {
        FixtureBackend::new().with_source("a", sample_items("a", 3, Utc::now()))
    }

    #[tokio::test]
    async fn test_pages_slice_by_offset() {
        let b = backend();
        let first = b.fetch_page("a", PageCursor::default(), 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = b
            .fetch_page("a", PageCursor { offset: 2, exhausted: false }, 2)
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "a-2");
        let past_end = b
            .fetch_page("a", PageCursor { offset: 9, exhausted: false }, 2)
            .await
            .unwrap();
        assert!(past_end.is_empty());
        assert_eq!(b.fetch_count("a"), 3);
    }

    #[tokio::test]
    async fn test_fail_next_counts_down() {
        let b = backend();
        b.fail_next("a", 2);
        assert!(b.fetch_page("a", PageCursor::default(), 2).await.is_err());
        assert!(b.fetch_page("a", PageCursor::default(), 2).await.is_err());
        assert!(b.fetch_page("a", PageCursor::default(), 2).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_source_is_error() {
        let b = backend();
        let err = b.fetch_page("zz", PageCursor::default(), 2).await.unwrap_err();
        assert_eq!(err.source_id, "zz");
    }

    #[tokio::test]
    async fn test_bookmark_listing_includes_seeded_folders() {
        let b = backend();
        b.seed_folder("Ideas", &["x-1"]);
        let listing = b
            .set_bookmark(&BookmarkRequest { item_id: "a-0".to_string(), bookmarked: true })
            .await
            .unwrap();
        let names: Vec<_> = listing.iter().map(|f| f.folder_name.as_str()).collect();
        assert_eq!(names, vec!["Ideas", "Saved"]);

        let listing = b
            .set_bookmark(&BookmarkRequest { item_id: "a-0".to_string(), bookmarked: false })
            .await
            .unwrap();
        assert!(listing.iter().all(|f| f.items.iter().all(|i| i.id != "a-0")));
    }

    #[test]
    fn test_sample_items_newest_first() {
        let items = sample_items("s", 3, Utc::now());
        assert!(items[0].created_at > items[1].created_at);
        assert!(items[1].created_at > items[2].created_at);
    }
}
