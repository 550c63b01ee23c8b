//! Multi-source paging through the public session API.

use chrono::Utc;
use reel_feed::engine::{LoadOutcome, QueryCache};
use reel_feed::feed::fixture::{sample_items, FixtureBackend};
use reel_feed::feed::types::{ContentSource, SourceKind};
use reel_feed::session::{FeedSession, SessionOptions};
use std::sync::Arc;
use std::time::Duration;

fn source(id: &str) -> ContentSource {
    ContentSource {
        id: id.to_string(),
        title: format!("Source {}", id),
        kind: SourceKind::Normal,
        platform_label: "TikTok".to_string(),
    }
}

fn two_sources(b_count: usize) -> (Arc<FixtureBackend>, FeedSession) {
    let now = Utc::now();
    let backend = Arc::new(
        FixtureBackend::new()
            .with_source("a", sample_items("a", 2, now))
            .with_source("b", sample_items("b", b_count, now - chrono::Duration::seconds(30))),
    );
    let session = FeedSession::new(
        vec![source("a"), source("b")],
        SessionOptions::default(),
        backend.clone(),
        backend.clone(),
    );
    (backend, session)
}

#[tokio::test]
async fn test_two_and_five_item_sources() {
    let (backend, session) = two_sources(5);

    let mut seen = Vec::new();
    for _ in 0..3 {
        session.load_more().await;
        seen.push((session.loaded_count(), session.has_more()));
    }
    assert_eq!(seen, vec![(4, true), (6, true), (7, false)]);
    assert_eq!(session.total_count(), 7);

    // Exhausted everywhere: no further fetches until refresh.
    let fetches = backend.total_fetches();
    assert_eq!(session.load_more().await, LoadOutcome::Skipped);
    assert_eq!(backend.total_fetches(), fetches);
    assert_eq!(backend.fetch_count("a"), 2);
    assert_eq!(backend.fetch_count("b"), 3);
}

#[tokio::test]
async fn test_two_and_seven_item_sources() {
    let (_, session) = two_sources(7);
    let mut counts = Vec::new();
    while session.has_more() {
        session.load_more().await;
        counts.push(session.loaded_count());
    }
    assert_eq!(counts, vec![4, 6, 8, 9]);
    assert_eq!(session.total_count(), 9);
}

#[tokio::test]
async fn test_sequence_is_newest_first() {
    let (_, session) = two_sources(5);
    while session.has_more() {
        session.load_more().await;
    }
    let items = session.items();
    assert!(items.windows(2).all(|w| w[0].created_at >= w[1].created_at));
}

#[tokio::test]
async fn test_concurrent_load_more_fetches_once() {
    let (backend, session) = two_sources(5);
    let (first, second, third) = tokio::join!(session.load_more(), session.load_more(), session.load_more());
    let loaded = [&first, &second, &third]
        .iter()
        .filter(|o| matches!(o, LoadOutcome::Loaded { .. }))
        .count();
    assert_eq!(loaded, 1);
    assert_eq!(backend.total_fetches(), 2);
    assert_eq!(session.loaded_count(), 4);
}

#[tokio::test]
async fn test_failing_source_does_not_block_others() {
    let (backend, session) = two_sources(5);
    backend.fail_next("b", 1);

    let outcome = session.load_more().await;
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            appended: 2,
            failed: vec!["b".to_string()]
        }
    );
    assert!(session.has_more(), "a failure is not exhaustion");

    session.load_more().await;
    assert_eq!(session.loaded_count(), 4);
}

#[tokio::test]
async fn test_refresh_starts_over() {
    let (backend, session) = two_sources(5);
    while session.has_more() {
        session.load_more().await;
    }
    let before = backend.total_fetches();

    session.refresh().await;
    assert_eq!(session.loaded_count(), 4);
    assert!(session.has_more());
    assert_eq!(backend.total_fetches(), before + 2);
    assert_eq!(session.current_index(), 0);
}

#[tokio::test]
async fn test_end_session_mid_round_leaves_nothing_for_next_viewer() {
    let backend = Arc::new(FixtureBackend::new().with_source("a", sample_items("a", 4, Utc::now())));
    let cache = Arc::new(QueryCache::new(Duration::from_secs(300)));
    let session_on = |cache: &Arc<QueryCache>| {
        FeedSession::with_cache(
            vec![source("a")],
            SessionOptions::default(),
            backend.clone(),
            backend.clone(),
            cache.clone(),
        )
    };

    // 1. Viewer logs out while the first page is still in flight
    let first = session_on(&cache);
    backend.hold();
    let logout = async {
        tokio::task::yield_now().await;
        first.end_session();
        backend.release();
    };
    let (outcome, _) = tokio::join!(first.load_more(), logout);
    assert_eq!(outcome, LoadOutcome::Discarded);
    assert_eq!(first.loaded_count(), 0);
    assert!(cache.is_empty());

    // 2. Next viewer on the same cache fetches for itself
    let second = session_on(&cache);
    second.load_more().await;
    assert_eq!(second.loaded_count(), 2);
    assert_eq!(backend.fetch_count("a"), 2);
}

#[tokio::test]
async fn test_refresh_while_loading_keeps_only_new_round() {
    let (backend, session) = two_sources(5);
    session.load_more().await;

    backend.hold();
    let refresher = async {
        tokio::task::yield_now().await;
        backend.release();
        session.refresh().await
    };
    let (old, refreshed) = tokio::join!(session.load_more(), refresher);
    assert_eq!(old, LoadOutcome::Discarded);
    assert!(matches!(refreshed, LoadOutcome::Loaded { appended: 4, .. }));

    let items = session.items();
    assert_eq!(items.len(), 4);
    let mut ids: Vec<_> = items.iter().map(|i| i.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4, "no duplicates");

    // Second pages are fetched again rather than served from the dropped round.
    let before = backend.total_fetches();
    session.load_more().await;
    assert_eq!(backend.total_fetches(), before + 2);
    assert_eq!(session.loaded_count(), 6);
}
