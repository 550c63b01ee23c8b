use super::breaker::CircuitBreaker;
use super::cache::{CacheKey, CacheValue, QueryCache};
use super::guard;
use crate::error::{AdapterError, BreakerError};
use crate::feed::types::{ContentItem, ContentSource, PageCursor};
use crate::feed::ContentAdapter;
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const DEFAULT_PAGE_SIZE: usize = 2;

/// What a `load_more` / `refresh` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A round was already in flight, every source is exhausted, or the pager is closed.
    Skipped,
    /// The round completed. `failed` lists sources that contributed nothing because of an error.
    Loaded { appended: usize, failed: Vec<String> },
    /// The round completed after a refresh or close superseded it; results were dropped.
    Discarded,
}

#[derive(Debug, Default)]
struct PagerState {
    cursors: HashMap<String, PageCursor>,
    items: Vec<ContentItem>,
    seen: HashSet<String>,
    generation: u64,
    in_flight: Option<u64>,
    closed: bool,
}

impl PagerState {
    fn cursor(&self, source_id: &str) -> PageCursor {
        self.cursors.get(source_id).copied().unwrap_or_default()
    }
}

/// One source's answer in a round. Only pages from an applied round are cached.
struct FetchedPage {
    source_id: String,
    offset: usize,
    from_cache: bool,
    result: Result<Vec<ContentItem>, BreakerError<AdapterError>>,
}

/// Merges per-source pages into one sequence ordered by `created_at`, newest first.
///
/// The only component that knows how much has been loaded. All methods take
/// `&self`; a round's bookkeeping is applied atomically once every source in
/// it has answered.
pub struct PaginationManager {
    sources: Vec<ContentSource>,
    adapter: Arc<dyn ContentAdapter>,
    breaker: Arc<CircuitBreaker>,
    cache: Arc<QueryCache>,
    page_size: usize,
    state: Mutex<PagerState>,
}

impl PaginationManager {
    pub fn new(
        sources: Vec<ContentSource>,
        adapter: Arc<dyn ContentAdapter>,
        breaker: Arc<CircuitBreaker>,
        cache: Arc<QueryCache>,
        page_size: usize,
    ) -> Self {
        Self {
            sources,
            adapter,
            breaker,
            cache,
            page_size: page_size.max(1),
            state: Mutex::new(PagerState::default()),
        }
    }

    pub fn sources(&self) -> &[ContentSource] {
        &self.sources
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// True iff at least one source cursor is not exhausted.
    pub fn has_more(&self) -> bool {
        let st = guard(&self.state);
        self.sources.iter().any(|s| !st.cursor(&s.id).exhausted)
    }

    pub fn loaded_count(&self) -> usize {
        guard(&self.state).items.len()
    }

    /// Per source: the final offset once exhausted, else the backend's
    /// reported total, else what has been loaded so far.
    pub fn total_count(&self) -> usize {
        let st = guard(&self.state);
        self.sources
            .iter()
            .map(|s| {
                let cursor = st.cursor(&s.id);
                if cursor.exhausted {
                    cursor.offset
                } else {
                    self.adapter
                        .reported_total(&s.id)
                        .map_or(cursor.offset, |t| t.max(cursor.offset))
                }
            })
            .sum()
    }

    pub fn cursor(&self, source_id: &str) -> PageCursor {
        guard(&self.state).cursor(source_id)
    }

    pub fn is_loading(&self) -> bool {
        let st = guard(&self.state);
        st.in_flight == Some(st.generation)
    }

    /// Snapshot of the merged sequence, broken items included.
    pub fn items(&self) -> Vec<ContentItem> {
        guard(&self.state).items.clone()
    }

    /// Borrow the merged sequence without cloning it.
    pub fn with_items<R>(&self, f: impl FnOnce(&[ContentItem]) -> R) -> R {
        f(&guard(&self.state).items)
    }

    pub fn item(&self, item_id: &str) -> Option<ContentItem> {
        guard(&self.state)
            .items
            .iter()
            .find(|i| i.id == item_id)
            .cloned()
    }

    /// Fetch the next page of every non-exhausted source concurrently and merge.
    pub async fn load_more(&self) -> LoadOutcome {
        let (generation, targets) = {
            let mut st = guard(&self.state);
            if st.closed || st.in_flight == Some(st.generation) {
                return LoadOutcome::Skipped;
            }
            let targets: Vec<(String, PageCursor)> = self
                .sources
                .iter()
                .map(|s| (s.id.clone(), st.cursor(&s.id)))
                .filter(|(_, c)| !c.exhausted)
                .collect();
            if targets.is_empty() {
                return LoadOutcome::Skipped;
            }
            st.in_flight = Some(st.generation);
            (st.generation, targets)
        };

        let results: Vec<FetchedPage> = join_all(
            targets
                .into_iter()
                .map(|(source_id, cursor)| self.fetch_source(source_id, cursor)),
        )
        .await;

        self.apply_round(generation, results)
    }

    /// Reset every cursor, clear the sequence and run one round.
    pub async fn refresh(&self) -> LoadOutcome {
        {
            let mut st = guard(&self.state);
            if st.closed {
                return LoadOutcome::Skipped;
            }
            st.generation += 1;
            st.in_flight = None;
            st.cursors.clear();
            st.items.clear();
            st.seen.clear();
        }
        let dropped = self.cache.invalidate(|k| matches!(k, CacheKey::Page { .. }));
        tracing::debug!(dropped, "refresh: page cache invalidated");
        self.load_more().await
    }

    /// Stop applying results. Rounds still in flight are discarded when they land.
    pub fn close(&self) {
        let mut st = guard(&self.state);
        st.closed = true;
        st.generation += 1;
        st.in_flight = None;
    }

    async fn fetch_source(&self, source_id: String, cursor: PageCursor) -> FetchedPage {
        if let Some(items) = self.cache.page(&source_id, cursor.offset) {
            tracing::debug!(source = %source_id, offset = cursor.offset, "page served from cache");
            return FetchedPage {
                source_id,
                offset: cursor.offset,
                from_cache: true,
                result: Ok(items),
            };
        }

        let limit = self.page_size;
        let adapter = &self.adapter;
        let result = self
            .breaker
            .call(|| adapter.fetch_page(&source_id, cursor, limit))
            .await;
        FetchedPage {
            source_id,
            offset: cursor.offset,
            from_cache: false,
            result,
        }
    }

    fn apply_round(&self, generation: u64, results: Vec<FetchedPage>) -> LoadOutcome {
        let mut st = guard(&self.state);
        if st.in_flight == Some(generation) {
            st.in_flight = None;
        }
        if st.closed || st.generation != generation {
            tracing::debug!(generation, "late page results discarded");
            return LoadOutcome::Discarded;
        }

        let mut appended = 0;
        let mut failed = Vec::new();
        for FetchedPage {
            source_id,
            offset,
            from_cache,
            result,
        } in results
        {
            match result {
                Ok(items) => {
                    if !from_cache {
                        self.cache.put(
                            CacheKey::Page {
                                source_id: source_id.clone(),
                                offset,
                            },
                            CacheValue::Page(items.clone()),
                        );
                    }
                    let cursor = st.cursors.entry(source_id.clone()).or_default();
                    cursor.offset += items.len();
                    if items.len() < self.page_size {
                        cursor.exhausted = true;
                        tracing::debug!(source = %source_id, offset = cursor.offset, "source exhausted");
                    }
                    for item in items {
                        if st.seen.insert(item.id.clone()) {
                            st.items.push(item);
                            appended += 1;
                        }
                    }
                }
                Err(BreakerError::Open(open)) => {
                    tracing::info!(source = %source_id, retry_in = ?open.retry_in, "page skipped, breaker open");
                    failed.push(source_id);
                }
                Err(BreakerError::Inner(e)) => {
                    tracing::warn!(source = %source_id, error = %e, "page fetch failed");
                    failed.push(source_id);
                }
            }
        }

        st.items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tracing::debug!(appended, loaded = st.items.len(), failed = failed.len(), "page round merged");
        LoadOutcome::Loaded { appended, failed }
    }
}
