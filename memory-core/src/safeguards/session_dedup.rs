//! Session dedup.

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;

/// Identity key for a result: `(path, start_line, end_line)` when available,
/// else `(path, sha(snippet))`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    path: String,
    discriminator: String,
}

impl IdentityKey {
    /// Build a key from explicit line bounds.
    #[must_use]
    pub fn from_lines(path: &str, start_line: u32, end_line: u32) -> Self {
        Self {
            path: path.to_string(),
            discriminator: format!("{start_line}-{end_line}"),
        }
    }

    /// Build a key from a content hash, when line bounds are unavailable.
    #[must_use]
    pub fn from_snippet(path: &str, snippet: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        snippet.hash(&mut hasher);
        Self {
            path: path.to_string(),
            discriminator: format!("sha:{:x}", hasher.finish()),
        }
    }
}

struct SeenEntry {
    seen_at: DateTime<Utc>,
}

/// Suppresses results previously returned within a session's cooldown
/// window, identified by [`IdentityKey`]. Session slots are LRU-bounded.
pub struct SessionDedup {
    sessions: Mutex<LruCache<String, std::collections::HashMap<IdentityKey, SeenEntry>>>,
    cooldown_ms: u64,
}

impl SessionDedup {
    /// Construct a tracker from safeguard configuration.
    #[must_use]
    pub fn new(max_sessions: usize, cooldown_ms: u64) -> Self {
        let cap = NonZeroUsize::new(max_sessions.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(cap)),
            cooldown_ms,
        }
    }

    /// Whether `key` was already returned in `session` within the cooldown
    /// window. If not suppressed, records it as seen now.
    pub fn check_and_record(&self, session: &str, key: IdentityKey) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.get(session).is_none() {
            sessions.put(session.to_string(), std::collections::HashMap::new());
        }
        let entries = sessions.get_mut(session).expect("just inserted");
        let now = Utc::now();
        if let Some(entry) = entries.get(&key) {
            let elapsed = (now - entry.seen_at).num_milliseconds().max(0) as u64;
            if elapsed < self.cooldown_ms {
                return true;
            }
        }
        entries.insert(key, SeenEntry { seen_at: now });
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_repeat_within_cooldown() {
        let dedup = SessionDedup::new(100, 5 * 60 * 1000);
        let key = IdentityKey::from_lines("mem/1", 1, 10);
        assert!(!dedup.check_and_record("s1", key.clone()));
        assert!(dedup.check_and_record("s1", key));
    }

    #[test]
    fn distinct_sessions_are_independent() {
        let dedup = SessionDedup::new(100, 5 * 60 * 1000);
        let key = IdentityKey::from_snippet("mem/2", "some snippet text");
        assert!(!dedup.check_and_record("s1", key.clone()));
        assert!(!dedup.check_and_record("s2", key));
    }

    #[test]
    fn lru_eviction_bounds_sessions() {
        let dedup = SessionDedup::new(1, 5 * 60 * 1000);
        let key = IdentityKey::from_lines("mem/1", 1, 2);
        assert!(!dedup.check_and_record("s1", key.clone()));
        // Touching s2 evicts s1 from the LRU, so s1's state is forgotten.
        assert!(!dedup.check_and_record("s2", IdentityKey::from_lines("mem/1", 1, 2)));
        assert!(!dedup.check_and_record("s1", key));
    }
}
