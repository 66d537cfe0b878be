//! In-memory TTL cache.
//!
//! Values are stored as `serde_json::Value` so one representation serves
//! both the TTL map and the persisted snapshot; typed records are the API
//! surface. Expired entries are invisible to readers immediately and are
//! physically removed by a once-a-minute background sweep.

pub mod persist;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::sources::Area;

/// Default TTL per area. Callers may override per write.
pub fn ttl_for(area: Area) -> Duration {
    match area {
        Area::Quotes | Area::Indices | Area::GlobalIndices => Duration::from_secs(30),
        Area::HkQuotes | Area::UsQuotes | Area::Forex | Area::Futures => Duration::from_secs(30),
        Area::IndustryRanking | Area::FundFlow => Duration::from_secs(120),
        Area::MarketOverview | Area::NorthboundFlow => Duration::from_secs(120),
        Area::FundEstimates => Duration::from_secs(120),
        Area::News => Duration::from_secs(180),
        Area::HotTopics => Duration::from_secs(300),
        Area::Klines | Area::Leaderboard => Duration::from_secs(600),
        Area::Reports | Area::Notices => Duration::from_secs(1800),
        Area::FundDetail => Duration::from_secs(3600),
    }
}

struct Entry {
    value: Value,
    expire_at: Instant,
    #[allow(dead_code)]
    ttl: Duration,
}

/// Process-global TTL map. Reads take the read lock only; an expired entry
/// behaves as a miss without being evicted in the read path.
pub struct MemoryCache {
    map: RwLock<HashMap<String, Entry>>,
}

pub const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

impl MemoryCache {
    pub fn new() -> Self {
        Self { map: RwLock::new(HashMap::new()) }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<Value> {
        let map = self.map.read();
        let entry = map.get(key)?;
        if now >= entry.expire_at {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Typed read; a deserialization mismatch is treated as a miss.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn put(&self, key: &str, value: Value, ttl: Duration) {
        self.put_at(key, value, ttl, Instant::now());
    }

    fn put_at(&self, key: &str, value: Value, ttl: Duration, now: Instant) {
        let mut map = self.map.write();
        map.insert(key.to_string(), Entry { value, expire_at: now + ttl, ttl });
    }

    /// Typed write. Serialization of our own record types cannot fail.
    pub fn put_as<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Ok(v) = serde_json::to_value(value) {
            self.put(key, v, ttl);
        }
    }

    /// Drop every key with the given prefix. Used to invalidate a family
    /// (`quote_`, `news_`, ...) when its upstream semantics change.
    pub fn purge_prefix(&self, prefix: &str) -> usize {
        let mut map = self.map.write();
        let before = map.len();
        map.retain(|k, _| !k.starts_with(prefix));
        before - map.len()
    }

    /// Remove entries past their expiry. Called by the background sweep.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    fn evict_expired_at(&self, now: Instant) -> usize {
        let mut map = self.map.write();
        let before = map.len();
        map.retain(|_, e| now < e.expire_at);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic eviction; errors cannot occur, the task just logs its work.
pub fn spawn_eviction(cache: Arc<MemoryCache>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(EVICTION_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let evicted = cache.evict_expired();
            if evicted > 0 {
                debug!(evicted, "cache sweep");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expired_entries_read_as_miss_without_eviction() {
        let cache = MemoryCache::new();
        let t0 = Instant::now();
        cache.put_at("quote_sh600519", json!({"price": 1688.0}), Duration::from_secs(30), t0);

        assert!(cache.get_at("quote_sh600519", t0 + Duration::from_secs(29)).is_some());
        assert!(cache.get_at("quote_sh600519", t0 + Duration::from_secs(30)).is_none());
        // Still physically present until the sweep runs.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.evict_expired_at(t0 + Duration::from_secs(31)), 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn writers_replace_atomically() {
        let cache = MemoryCache::new();
        let t0 = Instant::now();
        cache.put_at("k", json!(1), Duration::from_secs(10), t0);
        cache.put_at("k", json!(2), Duration::from_secs(10), t0 + Duration::from_secs(1));
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(2)).unwrap(), json!(2));
    }

    #[test]
    fn prefix_purge_scopes_to_family() {
        let cache = MemoryCache::new();
        cache.put("quote_sh600519", json!(1), Duration::from_secs(60));
        cache.put("quote_sz000001", json!(2), Duration::from_secs(60));
        cache.put("news_latest", json!(3), Duration::from_secs(60));

        assert_eq!(cache.purge_prefix("quote_"), 2);
        assert!(cache.get("news_latest").is_some());
        assert!(cache.get("quote_sh600519").is_none());
    }

    #[test]
    fn typed_round_trip() {
        let cache = MemoryCache::new();
        let quotes = vec![crate::models::Quote {
            code: "sh600519".into(),
            price: 1688.0,
            ..Default::default()
        }];
        cache.put_as("quote_batch", &quotes, Duration::from_secs(30));
        let back: Vec<crate::models::Quote> = cache.get_as("quote_batch").unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].code, "sh600519");
    }

    #[test]
    fn ttl_table_matches_areas() {
        assert_eq!(ttl_for(Area::Quotes), Duration::from_secs(30));
        assert_eq!(ttl_for(Area::FundFlow), Duration::from_secs(120));
        assert_eq!(ttl_for(Area::News), Duration::from_secs(180));
        assert_eq!(ttl_for(Area::Reports), Duration::from_secs(1800));
        assert_eq!(ttl_for(Area::FundDetail), Duration::from_secs(3600));
        assert_eq!(ttl_for(Area::Leaderboard), Duration::from_secs(600));
        assert_eq!(ttl_for(Area::HotTopics), Duration::from_secs(300));
    }
}
