//! Response Cache (C2): a process-local, fingerprint-keyed cache of rendered
//! JSON payloads with TTL-only eviction. Advisory by design — callers must
//! treat a cache failure as a miss, never as a user-visible error, and
//! correctness of any endpoint must not depend on the cache being populated.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

const DEFAULT_TTL_SECONDS: u64 = 600;
const DEFAULT_SOFT_CAPACITY: usize = 100;

struct CacheEntry {
    payload: serde_json::Value,
    expires_at: DateTime<Utc>,
}

pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    soft_capacity: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_TTL_SECONDS),
            DEFAULT_SOFT_CAPACITY,
        )
    }
}

impl ResponseCache {
    pub fn new(ttl: Duration, soft_capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            soft_capacity,
        }
    }

    /// Hex digest of a canonical, key-ordered filter serialization so that
    /// semantically equal filters hash equally irrespective of parameter
    /// ordering in the original request.
    pub fn fingerprint(surface: &str, canonical_filter: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(surface.as_bytes());
        hasher.update(b"\0");
        hasher.update(canonical_filter.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    pub fn lookup(&self, fingerprint: &str, now: DateTime<Utc>) -> Option<serde_json::Value> {
        let entries = self.entries.read();
        entries.get(fingerprint).and_then(|entry| {
            if entry.expires_at > now {
                Some(entry.payload.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&self, fingerprint: String, payload: serde_json::Value, now: DateTime<Utc>) {
        let mut entries = self.entries.write();
        if entries.len() >= self.soft_capacity {
            entries.retain(|_, entry| entry.expires_at > now);
        }
        entries.insert(
            fingerprint,
            CacheEntry {
                payload,
                expires_at: now
                    + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero()),
            },
        );
    }

    pub fn sweep_expired(&self, now: DateTime<Utc>) {
        self.entries.write().retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
