//! In-memory resolver cache
//!
//! Entries are keyed by `(pubkey, identifier)` — or the latest-record
//! sentinel — and carry an absolute expiry. Stale entries are evicted
//! on access; there is no background sweeper and no persistence across
//! runs.

use lodestone_core::Payload;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Identifier used for `resolve_latest` results
pub(crate) const LATEST_IDENTIFIER: &str = "__latest__";

struct CacheEntry {
    payload: Payload,
    expires_at: u64,
}

#[derive(Default)]
pub(crate) struct ResolverCache {
    entries: Mutex<HashMap<(String, String), CacheEntry>>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh payload for the key, evicting it if past expiry
    pub fn get(&self, pubkey: &str, identifier: &str, now: u64) -> Option<Payload> {
        let key = (pubkey.to_string(), identifier.to_string());
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(entry) if entry.expires_at > now => Some(entry.payload.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, pubkey: &str, identifier: &str, payload: Payload, expires_at: u64) {
        self.entries.lock().insert(
            (pubkey.to_string(), identifier.to_string()),
            CacheEntry {
                payload,
                expires_at,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_core::{Endpoint, Payload};

    fn payload() -> Payload {
        Payload::new(60, 1000, vec![Endpoint::new("tcp", "10.0.0.1:80")])
    }

    #[test]
    fn test_hit_before_expiry() {
        let cache = ResolverCache::new();
        cache.insert("pk", "addr", payload(), 1100);
        assert!(cache.get("pk", "addr", 1050).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_eviction_on_stale_access() {
        let cache = ResolverCache::new();
        cache.insert("pk", "addr", payload(), 1100);
        assert!(cache.get("pk", "addr", 1101).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_keys_are_scoped_by_identifier() {
        let cache = ResolverCache::new();
        cache.insert("pk", "addr", payload(), 2000);
        assert!(cache.get("pk", "backup", 1000).is_none());
        assert!(cache.get("pk", LATEST_IDENTIFIER, 1000).is_none());
        assert!(cache.get("other", "addr", 1000).is_none());
    }
}
