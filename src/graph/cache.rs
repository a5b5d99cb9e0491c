//! In-memory search result cache.
//!
//! Keys digest the full query shape. Entries expire after the configured TTL
//! (checked on access) and the map is bounded: once full, the oldest entry by
//! insertion order is evicted. Hits return a clone, so callers may freely
//! mutate their copy.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::{SearchInput, SearchResult};

#[derive(Debug)]
struct CacheEntry {
    stored_at: Instant,
    payload: SearchResult,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    insertion_order: VecDeque<String>,
}

#[derive(Debug)]
pub struct SearchCache {
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<CacheInner>,
}

impl SearchCache {
    /// A zero TTL disables caching entirely.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Digest of the normalized query shape.
    pub fn key(input: &SearchInput) -> String {
        let mut fields = input.fields_of_study.clone();
        fields.sort();
        let mut sources: Vec<&str> = input.sources.iter().map(|s| s.id()).collect();
        sources.sort();
        let raw = format!(
            "{}|{}|{}|{}|{}|{}",
            input.query.trim().to_lowercase(),
            input.limit,
            input
                .year_range
                .and_then(|r| r.min)
                .map(|y| y.to_string())
                .unwrap_or_default(),
            input
                .year_range
                .and_then(|r| r.max)
                .map(|y| y.to_string())
                .unwrap_or_default(),
            fields.join(","),
            sources.join(","),
        );
        format!("{:x}", md5::compute(raw.as_bytes()))
    }

    pub fn get(&self, key: &str) -> Option<SearchResult> {
        if !self.enabled() {
            return None;
        }
        let mut inner = self.inner.lock().unwrap();
        let expired = match inner.map.get(key) {
            Some(entry) => entry.stored_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            inner.map.remove(key);
            inner.insertion_order.retain(|k| k != key);
            return None;
        }
        inner.map.get(key).map(|entry| entry.payload.clone())
    }

    pub fn put(&self, key: String, payload: SearchResult) {
        if !self.enabled() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.map.contains_key(&key) {
            inner.insertion_order.retain(|k| k != &key);
        }
        while inner.map.len() >= self.max_entries {
            match inner.insertion_order.pop_front() {
                Some(oldest) => {
                    inner.map.remove(&oldest);
                }
                None => break,
            }
        }
        inner.insertion_order.push_back(key.clone());
        inner.map.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                payload,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKind;

    fn sample_result(query: &str) -> SearchResult {
        SearchResult {
            query: query.to_string(),
            results: Vec::new(),
            provider_errors: Vec::new(),
        }
    }

    #[test]
    fn test_key_ignores_source_order() {
        let mut a = SearchInput::new("deep learning");
        a.sources = vec![ProviderKind::Crossref, ProviderKind::OpenAlex];
        let mut b = SearchInput::new("deep learning");
        b.sources = vec![ProviderKind::OpenAlex, ProviderKind::Crossref];
        assert_eq!(SearchCache::key(&a), SearchCache::key(&b));
    }

    #[test]
    fn test_key_distinguishes_limits() {
        let a = SearchInput::new("q").limit(10);
        let b = SearchInput::new("q").limit(20);
        assert_ne!(SearchCache::key(&a), SearchCache::key(&b));
    }

    #[test]
    fn test_hit_returns_clone() {
        let cache = SearchCache::new(Duration::from_secs(60), 8);
        cache.put("k".into(), sample_result("q"));

        let mut first = cache.get("k").unwrap();
        first.query.push_str("-mutated");

        let second = cache.get("k").unwrap();
        assert_eq!(second.query, "q");
    }

    #[test]
    fn test_zero_ttl_disables() {
        let cache = SearchCache::new(Duration::ZERO, 8);
        cache.put("k".into(), sample_result("q"));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fifo_eviction() {
        let cache = SearchCache::new(Duration::from_secs(60), 2);
        cache.put("a".into(), sample_result("1"));
        cache.put("b".into(), sample_result("2"));
        cache.put("c".into(), sample_result("3"));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_expiry_on_access() {
        let cache = SearchCache::new(Duration::from_millis(1), 8);
        cache.put("k".into(), sample_result("q"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }
}
