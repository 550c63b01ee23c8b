use super::guard;
use crate::feed::types::{BookmarkFolder, ContentItem};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Page { source_id: String, offset: usize },
    Bookmarks,
}

#[derive(Debug, Clone)]
pub enum CacheValue {
    Page(Vec<ContentItem>),
    Bookmarks(Vec<BookmarkFolder>),
}

#[derive(Debug)]
struct CacheEntry {
    value: CacheValue,
    stored_at: Instant,
}

/// Owned query cache shared by the pagination manager and the reconciler.
pub struct QueryCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh entry for `key`. Stale entries are evicted on read.
    pub fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        let mut entries = guard(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value` and prune every expired entry.
    pub fn put(&self, key: CacheKey, value: CacheValue) {
        let mut entries = guard(&self.entries);
        entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn page(&self, source_id: &str, offset: usize) -> Option<Vec<ContentItem>> {
        let key = CacheKey::Page {
            source_id: source_id.to_string(),
            offset,
        };
        match self.get(&key) {
            Some(CacheValue::Page(items)) => Some(items),
            _ => None,
        }
    }

    pub fn bookmarks(&self) -> Option<Vec<BookmarkFolder>> {
        match self.get(&CacheKey::Bookmarks) {
            Some(CacheValue::Bookmarks(folders)) => Some(folders),
            _ => None,
        }
    }

    /// Drop every entry whose key matches. Returns how many were removed.
    pub fn invalidate<P>(&self, predicate: P) -> usize
    where
        P: Fn(&CacheKey) -> bool,
    {
        let mut entries = guard(&self.entries);
        let before = entries.len();
        entries.retain(|k, _| !predicate(k));
        before - entries.len()
    }

    pub fn clear(&self) {
        guard(&self.entries).clear();
    }

    pub fn len(&self) -> usize {
        guard(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
