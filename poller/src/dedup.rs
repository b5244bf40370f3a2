//! Seen-id dedup and timestamp freshness filtering.

use std::collections::{HashSet, VecDeque};
use subwatch_core::Hit;

/// Maximum number of ids retained before oldest-first eviction.
pub const SEEN_SET_CAP: usize = 1000;

/// Insertion-ordered set of already-processed item ids.
///
/// Loaded at the start of each poll cycle and persisted at the end. Bounded
/// so a long-lived session cannot grow it without limit.
#[derive(Debug, Default)]
pub struct SeenSet {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds from a persisted id list (oldest first), keeping at most the
    /// newest [`SEEN_SET_CAP`] entries.
    pub fn from_ids(ids: Vec<String>) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.insert(id);
        }
        set
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Inserts an id, evicting the oldest entries past capacity.
    pub fn insert(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > SEEN_SET_CAP {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Persistable form, oldest first.
    pub fn to_ids(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }
}

/// Drops items at or older than the newest match ever surfaced.
///
/// This is the zombie guard: after a restart clears the seen set, the
/// upstream batch can still contain items that were already shown in a
/// previous session.
pub fn fresh_items(items: Vec<Hit>, latest_hit_timestamp: i64) -> Vec<Hit> {
    if latest_hit_timestamp <= 0 {
        return items;
    }
    items
        .into_iter()
        .filter(|item| item.created_utc > latest_hit_timestamp)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, created_utc: i64) -> Hit {
        Hit {
            id: id.to_string(),
            title: "title".to_string(),
            author: "someone".to_string(),
            subreddit: "rust".to_string(),
            permalink: format!("/r/rust/comments/{id}"),
            url: None,
            selftext: None,
            created_utc,
            score: 0,
            num_comments: 0,
            link_flair_text: None,
            is_self: true,
            over_18: false,
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let mut seen = SeenSet::new();
        seen.insert("a");
        seen.insert("a");
        assert_eq!(seen.len(), 1);
        assert!(seen.contains("a"));
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut seen = SeenSet::new();
        for i in 0..SEEN_SET_CAP + 10 {
            seen.insert(format!("id{i}"));
        }
        assert_eq!(seen.len(), SEEN_SET_CAP);
        assert!(!seen.contains("id0"));
        assert!(!seen.contains("id9"));
        assert!(seen.contains("id10"));
        assert!(seen.contains(&format!("id{}", SEEN_SET_CAP + 9)));
    }

    #[test]
    fn round_trips_through_id_list_in_order() {
        let mut seen = SeenSet::new();
        seen.insert("a");
        seen.insert("b");
        seen.insert("c");

        let ids = seen.to_ids();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let rebuilt = SeenSet::from_ids(ids);
        assert_eq!(rebuilt.to_ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn freshness_drops_items_at_or_before_watermark() {
        let items = vec![hit("old", 1500), hit("edge", 2000), hit("new", 2500)];
        let fresh = fresh_items(items, 2000);
        let ids: Vec<&str> = fresh.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["new"]);
    }

    #[test]
    fn zero_watermark_passes_everything() {
        let items = vec![hit("a", 10), hit("b", 20)];
        assert_eq!(fresh_items(items, 0).len(), 2);
    }
}
