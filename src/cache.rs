use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// In-process TTL cache backing the top-list cache and the idempotency
/// markers. The surface mirrors what the engine needs from a networked cache
/// (get, set-with-TTL, atomic set-if-absent, delete) so the backend can be
/// swapped without touching the services.
pub struct TtlCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl TtlCache {
    pub fn new() -> Self {
        TtlCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>> {
        // A panic while holding the lock must not take the cache down with it;
        // cached data is disposable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.lock()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }

    /// Atomic set-if-absent. Returns false if a live entry already exists.
    pub fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let mut entries = self.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some((_, expires_at)) if now < *expires_at => false,
            _ => {
                entries.insert(key.to_string(), (value.to_string(), now + ttl));
                true
            }
        }
    }

    pub fn delete(&self, key: &str) {
        self.lock().remove(key);
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}
