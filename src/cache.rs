//! Advisory result cache
//!
//! Purely advisory key-value store consulted by the range query engine for
//! aligned sub-ranges. Absence of a cache (or of an entry) changes latency,
//! never results.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Advisory cache contract: byte values under string keys, optional TTL.
pub trait Cache: Send + Sync {
    /// Returns the cached value, or None if absent or expired.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores a value. `ttl = None` means no expiry.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>);
}

/// In-memory cache with per-entry expiry.
///
/// Expired entries are dropped lazily on read and swept on write.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap();
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, e| !e.is_expired(now));
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: ttl.map(|d| now + d),
            },
        );
    }
}
