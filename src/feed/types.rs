use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Normalized internal types used by the engine (backend-agnostic).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Feed,
    Normal,
}

/// An assignable channel of content, e.g. one creator's Instagram feed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentSource {
    pub id: String,
    pub title: String,
    pub kind: SourceKind,
    pub platform_label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
    Text,
}

impl MediaKind {
    /// Case-insensitive. Unrecognized kinds are logged and treated as text.
    pub fn from_wire(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("video") {
            MediaKind::Video
        } else if raw.eq_ignore_ascii_case("image") {
            MediaKind::Image
        } else {
            if !raw.eq_ignore_ascii_case("text") {
                tracing::warn!(media_kind = raw, "unrecognized media kind, treating as text");
            }
            MediaKind::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub id: String,
    pub source_id: String,
    pub media_kind: MediaKind,
    pub media_url: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn is_video(&self) -> bool {
        self.media_kind == MediaKind::Video
    }
}

/// Per-source paging position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCursor {
    pub offset: usize,
    pub exhausted: bool,
}

// ── Wire records ──────────────────────────────────────────────────────

/// One item as returned by the page listing endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReelRecord {
    pub id: String,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(alias = "mediaType")]
    pub media_kind: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReelRecord {
    /// The listing is scoped to one source, so a missing `sourceId` is the requested one.
    pub fn into_item(self, requested_source: &str) -> ContentItem {
        ContentItem {
            id: self.id,
            source_id: self
                .source_id
                .unwrap_or_else(|| requested_source.to_string()),
            media_kind: MediaKind::from_wire(&self.media_kind),
            media_url: self.media_url.filter(|u| !u.is_empty()),
            title: self.title,
            description: self.description.filter(|d| !d.is_empty()),
            created_at: self.created_at,
        }
    }
}

/// Page listing body: either a bare array or an envelope with a total.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PageResponse {
    Bare(Vec<ReelRecord>),
    Envelope {
        items: Vec<ReelRecord>,
        #[serde(default)]
        total: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementAction {
    Like,
    Dislike,
    Complete,
}

impl EngagementAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementAction::Like => "like",
            EngagementAction::Dislike => "dislike",
            EngagementAction::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementRequest {
    pub item_id: String,
    pub source_id: String,
    pub action: EngagementAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRequest {
    pub item_id: String,
    pub bookmarked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BookmarkedItem {
    pub id: String,
}

/// One folder of the authoritative bookmark listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkFolder {
    pub folder_name: String,
    #[serde(default)]
    pub items: Vec<BookmarkedItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reel_record_fills_missing_source() {
        let json = r#"{
            "id": "r1",
            "mediaKind": "video",
            "mediaUrl": "https://cdn.example.com/r1.mp4",
            "title": "Morning routine",
            "createdAt": "2025-03-01T10:00:00Z"
        }"#;
        let rec: ReelRecord = serde_json::from_str(json).unwrap();
        let item = rec.into_item("ig-main");
        assert_eq!(item.source_id, "ig-main");
        assert!(item.is_video());
        assert!(item.description.is_none());
    }

    #[test]
    fn test_unknown_media_kind_is_text() {
        let json = r#"{"id": "r2", "mediaType": "carousel", "createdAt": "2025-03-01T10:00:00Z"}"#;
        let rec: ReelRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.into_item("s").media_kind, MediaKind::Text);
    }

    #[test]
    fn test_media_kind_ignores_case() {
        assert_eq!(MediaKind::from_wire("VIDEO"), MediaKind::Video);
        assert_eq!(MediaKind::from_wire(" Video "), MediaKind::Video);
        assert_eq!(MediaKind::from_wire("Image"), MediaKind::Image);
        assert_eq!(MediaKind::from_wire("text"), MediaKind::Text);
        assert_eq!(MediaKind::from_wire("reel"), MediaKind::Text);
    }

    #[test]
    fn test_empty_media_url_dropped() {
        let json = r#"{"id": "r3", "mediaKind": "image", "mediaUrl": "", "createdAt": "2025-03-01T10:00:00Z"}"#;
        let rec: ReelRecord = serde_json::from_str(json).unwrap();
        assert!(rec.into_item("s").media_url.is_none());
    }

    #[test]
    fn test_engagement_request_wire_shape() {
        let req = EngagementRequest {
            item_id: "r1".to_string(),
            source_id: "ig-main".to_string(),
            action: EngagementAction::Dislike,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["itemId"], "r1");
        assert_eq!(v["sourceId"], "ig-main");
        assert_eq!(v["action"], "dislike");
    }

    #[test]
    fn test_bookmark_folder_parses() {
        let json = r#"[{"folderName": "Saved", "items": [{"id": "r1"}, {"id": "r9"}]}, {"folderName": "Empty"}]"#;
        let folders: Vec<BookmarkFolder> = serde_json::from_str(json).unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].items[1].id, "r9");
        assert!(folders[1].items.is_empty());
    }
}
