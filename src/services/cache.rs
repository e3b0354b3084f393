use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Process-local key -> value map where entries go stale after a fixed TTL.
/// Unbounded in key count; stale entries are invisible to `get` and dropped
/// by `evict_expired`.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, (Instant, V)>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        self.entries.write().await.insert(key, (Instant::now(), value));
    }

    /// Drops stale entries, returning how many went.
    pub async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", vec![1, 2]).await;

        assert_eq!(cache.get(&"a").await, Some(vec![1, 2]));
        assert_eq!(cache.get(&"b").await, None);
    }

    #[tokio::test]
    async fn test_expiry_and_eviction() {
        let cache = TtlCache::new(Duration::from_millis(30));
        cache.insert(1u32, "old").await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.insert(2u32, "new").await;

        assert_eq!(cache.get(&1).await, None);
        assert_eq!(cache.get(&2).await, Some("new"));
        assert_eq!(cache.len().await, 2);

        assert_eq!(cache.evict_expired().await, 1);
        assert_eq!(cache.len().await, 1);
    }
}
