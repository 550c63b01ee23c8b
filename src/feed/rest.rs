use super::types::*;
use super::{ContentAdapter, EngagementApi};
use crate::error::{AdapterError, MutationError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Parse a page listing body (bare array or `{items, total}` envelope).
/// Public for unit testing with fixtures.
pub fn parse_page_response(
    json: &str,
    source_id: &str,
) -> Result<(Vec<ContentItem>, Option<usize>), AdapterError> {
    let parsed: PageResponse = serde_json::from_str(json)
        .map_err(|e| AdapterError::new(source_id, format!("failed to parse page: {}", e)))?;
    let (records, total) = match parsed {
        PageResponse::Bare(records) => (records, None),
        PageResponse::Envelope { items, total } => (items, total),
    };
    let items = records
        .into_iter()
        .map(|r| r.into_item(source_id))
        .collect();
    Ok((items, total))
}

/// reqwest-backed client for the content backend's REST boundary.
pub struct RestBackend {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
    totals: Mutex<HashMap<String, usize>>,
}

impl RestBackend {
    pub fn new(base_url: &str, timeout_ms: u64, api_token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid backend base_url: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("backend base_url cannot carry a path: {}", base_url);
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(4)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_token,
            totals: Mutex::new(HashMap::new()),
        })
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// `base_url` with `segments` appended, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn page_request(&self, source_id: &str, cursor: PageCursor, limit: usize) -> RequestBuilder {
        let url = self.endpoint(&["sources", source_id, "items"]);
        self.authed(
            self.client
                .get(url)
                .query(&[("offset", cursor.offset), ("limit", limit)]),
        )
    }
}

#[async_trait]
impl ContentAdapter for RestBackend {
    async fn fetch_page(
        &self,
        source_id: &str,
        cursor: PageCursor,
        limit: usize,
    ) -> Result<Vec<ContentItem>, AdapterError> {
        let resp = self
            .page_request(source_id, cursor, limit)
            .send()
            .await
            .map_err(|e| AdapterError::new(source_id, format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AdapterError::new(
                source_id,
                format!("HTTP {}: {}", status, body),
            ));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| AdapterError::new(source_id, format!("response read failed: {}", e)))?;
        let (items, total) = parse_page_response(&text, source_id)?;

        if let Some(total) = total {
            if let Ok(mut totals) = self.totals.lock() {
                totals.insert(source_id.to_string(), total);
            }
        }

        tracing::debug!(source = source_id, offset = cursor.offset, count = items.len(), "page fetched");
        Ok(items)
    }

    fn reported_total(&self, source_id: &str) -> Option<usize> {
        self.totals
            .lock()
            .ok()
            .and_then(|totals| totals.get(source_id).copied())
    }
}

#[async_trait]
impl EngagementApi for RestBackend {
    async fn record_engagement(&self, req: &EngagementRequest) -> Result<(), MutationError> {
        let url = self.endpoint(&["engagements"]);
        let fail = |msg: String| MutationError::new(&req.item_id, req.action.as_str(), msg);

        let resp = self
            .authed(self.client.post(url).json(req))
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(fail(format!("HTTP {}: {}", status, body)));
        }
        Ok(())
    }

    async fn set_bookmark(&self, req: &BookmarkRequest) -> Result<Vec<BookmarkFolder>, MutationError> {
        let url = self.endpoint(&["bookmarks"]);
        let fail = |msg: String| MutationError::new(&req.item_id, "bookmark", msg);

        let resp = self
            .authed(self.client.post(url).json(req))
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(fail(format!("HTTP {}: {}", status, body)));
        }

        resp.json::<Vec<BookmarkFolder>>()
            .await
            .map_err(|e| fail(format!("failed to parse folder listing: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_json() -> &'static str {
        r#"[
            {
                "id": "r-101",
                "sourceId": "ig-main",
                "mediaKind": "video",
                "mediaUrl": "https://cdn.example.com/r-101.mp4",
                "title": "Studio tour",
                "description": "Behind the scenes",
                "createdAt": "2025-02-10T18:30:00Z"
            },
            {
                "id": "r-100",
                "mediaKind": "image",
                "mediaUrl": "https://cdn.example.com/r-100.jpg",
                "title": "Cover shoot",
                "createdAt": "2025-02-09T12:00:00Z"
            }
        ]"#
    }

    #[test]
    fn test_parse_bare_array() {
        let (items, total) = parse_page_response(fixture_json(), "ig-main").unwrap();
        assert_eq!(items.len(), 2);
        assert!(total.is_none());
        assert_eq!(items[0].id, "r-101");
        assert_eq!(items[0].description.as_deref(), Some("Behind the scenes"));
        assert_eq!(items[1].source_id, "ig-main");
        assert_eq!(items[1].media_kind, MediaKind::Image);
    }

    #[test]
    fn test_parse_envelope_with_total() {
        let json = format!(r#"{{"items": {}, "total": 37}}"#, fixture_json());
        let (items, total) = parse_page_response(&json, "ig-main").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(total, Some(37));
    }

    #[test]
    fn test_parse_empty_page() {
        let (items, _) = parse_page_response("[]", "ig-main").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_parse_error_carries_source() {
        let err = parse_page_response("<html>502</html>", "tt-alt").unwrap_err();
        assert_eq!(err.source_id, "tt-alt");
        assert!(err.message.contains("failed to parse page"));
    }

    fn page_url(backend: &RestBackend, source_id: &str, offset: usize) -> String {
        backend
            .page_request(source_id, PageCursor { offset, exhausted: false }, 2)
            .build()
            .unwrap()
            .url()
            .to_string()
    }

    #[test]
    fn test_page_url_trims_base() {
        let backend = RestBackend::new("https://api.example.com/v1/", 1000, None).unwrap();
        assert_eq!(
            page_url(&backend, "ig-main", 4),
            "https://api.example.com/v1/sources/ig-main/items?offset=4&limit=2"
        );
    }

    #[test]
    fn test_page_url_encodes_source_id() {
        let backend = RestBackend::new("https://api.example.com/v1", 1000, None).unwrap();
        assert_eq!(
            page_url(&backend, "chef/ana #1?", 0),
            "https://api.example.com/v1/sources/chef%2Fana%20%231%3F/items?offset=0&limit=2"
        );
    }

    #[test]
    fn test_endpoint_for_mutations() {
        let backend = RestBackend::new("https://api.example.com/v1/", 1000, None).unwrap();
        assert_eq!(backend.endpoint(&["bookmarks"]).as_str(), "https://api.example.com/v1/bookmarks");
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        assert!(RestBackend::new("not a url", 1000, None).is_err());
        assert!(RestBackend::new("mailto:ops@example.com", 1000, None).is_err());
    }

    /// Hits a real backend.
    /// Run with: REEL_FEED_BASE_URL=... cargo test rest_live --ignored -- --nocapture
    #[tokio::test]
    #[ignore]
    async fn rest_live_fetch() {
        let base = std::env::var("REEL_FEED_BASE_URL").unwrap_or_default();
        let backend = RestBackend::new(&base, 10_000, std::env::var("REEL_FEED_API_TOKEN").ok()).unwrap();
        match backend.fetch_page("ig-main", PageCursor::default(), 2).await {
            Ok(items) => {
                for item in &items {
                    println!("  {} | {:?} | {}", item.id, item.media_kind, item.created_at);
                }
            }
            Err(e) => println!("fetch error: {}", e),
        }
    }
}
