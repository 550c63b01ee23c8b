use crate::feed::types::BookmarkFolder;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Locally tracked flags for one item. Default all false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemEngagementState {
    pub liked: bool,
    pub disliked: bool,
    pub bookmarked: bool,
    pub completed: bool,
    pub broken: bool,
}

/// Per-viewer engagement flags keyed by item id.
///
/// Entries are created lazily and live until `clear` (logout / viewer change).
#[derive(Debug, Default)]
pub struct EngagementStore {
    states: HashMap<String, ItemEngagementState>,
    folders: Vec<BookmarkFolder>,
}

pub type SharedStore = Arc<Mutex<EngagementStore>>;

impl EngagementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn get(&self, item_id: &str) -> ItemEngagementState {
        self.states.get(item_id).copied().unwrap_or_default()
    }

    fn entry(&mut self, item_id: &str) -> &mut ItemEngagementState {
        self.states.entry(item_id.to_string()).or_default()
    }

    pub fn is_broken(&self, item_id: &str) -> bool {
        self.states.get(item_id).is_some_and(|s| s.broken)
    }

    /// Returns true if the item was not already broken.
    pub fn mark_broken(&mut self, item_id: &str) -> bool {
        let state = self.entry(item_id);
        let newly = !state.broken;
        state.broken = true;
        newly
    }

    pub fn broken_ids(&self) -> HashSet<String> {
        self.states
            .iter()
            .filter(|(_, s)| s.broken)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Like and dislike are mutually exclusive.
    pub fn set_liked(&mut self, item_id: &str) {
        let state = self.entry(item_id);
        state.liked = true;
        state.disliked = false;
    }

    pub fn set_disliked(&mut self, item_id: &str) {
        let state = self.entry(item_id);
        state.disliked = true;
        state.liked = false;
    }

    pub fn set_completed(&mut self, item_id: &str) {
        self.entry(item_id).completed = true;
    }

    /// Flip the bookmark flag and return the new value.
    pub fn toggle_bookmark(&mut self, item_id: &str) -> bool {
        let state = self.entry(item_id);
        state.bookmarked = !state.bookmarked;
        state.bookmarked
    }

    /// Make the server's folder listing the bookmark set: listed items are
    /// bookmarked, every other item is not.
    pub fn replace_bookmarks(&mut self, folders: Vec<BookmarkFolder>) {
        let listed: HashSet<&str> = folders
            .iter()
            .flat_map(|f| f.items.iter().map(|i| i.id.as_str()))
            .collect();
        for (id, state) in self.states.iter_mut() {
            state.bookmarked = listed.contains(id.as_str());
        }
        for id in listed {
            self.states.entry(id.to_string()).or_default().bookmarked = true;
        }
        self.folders = folders;
    }

    pub fn bookmarked_ids(&self) -> BTreeSet<String> {
        self.states
            .iter()
            .filter(|(_, s)| s.bookmarked)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn folders(&self) -> &[BookmarkFolder] {
        &self.folders
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.folders.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::BookmarkedItem;

    fn folder(name: &str, ids: &[&str]) -> BookmarkFolder {
        BookmarkFolder {
            folder_name: name.to_string(),
            items: ids.iter().map(|id| BookmarkedItem { id: id.to_string() }).collect(),
        }
    }

    #[test]
    fn test_unknown_item_defaults_all_false() {
        let store = EngagementStore::new();
        assert_eq!(store.get("nope"), ItemEngagementState::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_like_clears_dislike() {
        let mut store = EngagementStore::new();
        store.set_disliked("r1");
        store.set_liked("r1");
        let s = store.get("r1");
        assert!(s.liked);
        assert!(!s.disliked);
    }

    #[test]
    fn test_mark_broken_reports_first_time_only() {
        let mut store = EngagementStore::new();
        assert!(store.mark_broken("r1"));
        assert!(!store.mark_broken("r1"));
        assert!(store.is_broken("r1"));
        assert_eq!(store.broken_ids().len(), 1);
    }

    #[test]
    fn test_toggle_bookmark_flips() {
        let mut store = EngagementStore::new();
        assert!(store.toggle_bookmark("r1"));
        assert!(!store.toggle_bookmark("r1"));
    }

    #[test]
    fn test_replace_bookmarks_is_exact() {
        let mut store = EngagementStore::new();
        store.toggle_bookmark("r1");
        store.toggle_bookmark("r2");
        store.set_liked("r3");

        store.replace_bookmarks(vec![folder("Saved", &["r2"]), folder("Ideas", &["r9"])]);

        let ids: Vec<_> = store.bookmarked_ids().into_iter().collect();
        assert_eq!(ids, vec!["r2".to_string(), "r9".to_string()]);
        assert!(store.get("r3").liked, "other flags untouched");
        assert_eq!(store.folders().len(), 2);
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut store = EngagementStore::new();
        store.mark_broken("r1");
        store.replace_bookmarks(vec![folder("Saved", &["r2"])]);
        store.clear();
        assert!(store.is_empty());
        assert!(store.folders().is_empty());
    }
}
