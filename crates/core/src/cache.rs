use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// In-memory TTL cache for assembled responses. Entries are evicted
/// lazily on read once they pass the TTL.
#[derive(Debug)]
pub struct ResponseCache<T> {
    entries: DashMap<String, CacheEntry<T>>,
    ttl: Duration,
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    cached_at: DateTime<Utc>,
}

impl<T: Clone> ResponseCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.get_at(key, Utc::now())
    }

    pub fn insert(&self, key: String, value: T) {
        self.insert_at(key, value, Utc::now());
    }

    fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        let hit = {
            let entry = self.entries.get(key)?;
            if now - entry.cached_at > self.ttl {
                None
            } else {
                Some(entry.value.clone())
            }
        };
        if hit.is_none() {
            self.entries.remove(key);
        }
        hit
    }

    fn insert_at(&self, key: String, value: T, now: DateTime<Utc>) {
        self.entries.insert(key, CacheEntry { value, cached_at: now });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_value_within_ttl() {
        let cache = ResponseCache::new(Duration::minutes(15));
        let now = Utc::now();
        cache.insert_at("AAPL:medium".to_string(), 42, now);
        assert_eq!(cache.get_at("AAPL:medium", now + Duration::minutes(14)), Some(42));
    }

    #[test]
    fn expires_after_ttl() {
        let cache = ResponseCache::new(Duration::minutes(15));
        let now = Utc::now();
        cache.insert_at("AAPL:medium".to_string(), 42, now);
        assert_eq!(cache.get_at("AAPL:medium", now + Duration::minutes(16)), None);
        // the stale entry is dropped, not just hidden
        assert!(cache.entries.get("AAPL:medium").is_none());
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache: ResponseCache<i32> = ResponseCache::new(Duration::minutes(15));
        assert_eq!(cache.get("TSLA:high"), None);
    }

    #[test]
    fn insert_refreshes_timestamp() {
        let cache = ResponseCache::new(Duration::minutes(15));
        let now = Utc::now();
        cache.insert_at("MSFT:low".to_string(), 1, now);
        cache.insert_at("MSFT:low".to_string(), 2, now + Duration::minutes(10));
        assert_eq!(cache.get_at("MSFT:low", now + Duration::minutes(20)), Some(2));
    }
}
