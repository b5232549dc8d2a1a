//! Time-bounded cache of extracted documents, keyed by normalized URL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::IngestedDocument;

/// In-process cache so repeated builds over the same URLs skip the network.
pub struct ContentCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, IngestedDocument)>>,
}

impl ContentCache {
    /// A zero `ttl` disables caching.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Return a fresh entry, dropping it if expired.
    pub async fn get(&self, key: &str) -> Option<IngestedDocument> {
        if !self.is_enabled() {
            return None;
        }
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((stored_at, doc)) if stored_at.elapsed() < self.ttl => Some(doc.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a document, dropping every expired entry.
    pub async fn insert(&self, key: String, doc: IngestedDocument) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), doc));
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str) -> IngestedDocument {
        IngestedDocument {
            url: url.into(),
            content_hash: "abc".into(),
            word_count: 3,
            concepts: vec![],
            signals: vec![],
        }
    }

    #[tokio::test]
    async fn stores_and_returns_documents() {
        let cache = ContentCache::new(Duration::from_secs(60));
        cache.insert("https://a.example.com/".into(), doc("https://a.example.com/")).await;

        let hit = cache.get("https://a.example.com/").await.expect("cache hit");
        assert_eq!(hit.content_hash, "abc");
        assert!(cache.get("https://b.example.com/").await.is_none());
    }

    #[tokio::test]
    async fn zero_ttl_disables_cache() {
        let cache = ContentCache::new(Duration::ZERO);
        cache.insert("k".into(), doc("k")).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn expired_entries_are_evicted() {
        let cache = ContentCache::new(Duration::from_millis(10));
        cache.insert("k".into(), doc("k")).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn insert_prunes_stale_entries_for_other_urls() {
        let cache = ContentCache::new(Duration::from_millis(20));
        cache.insert("https://a.example.com/".into(), doc("https://a.example.com/")).await;
        cache.insert("https://b.example.com/".into(), doc("https://b.example.com/")).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        cache.insert("https://c.example.com/".into(), doc("https://c.example.com/")).await;
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("https://c.example.com/").await.is_some());
    }
}
