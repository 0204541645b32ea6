//! Per-session LRU cache of access decisions
//!
//! Entries are keyed by (object id or none, permission) and stamped with the
//! session login time current when they were stored. An entry stamped before
//! the session's present login time belongs to an earlier login and reads as
//! absent.
//!
//! Every eviction advances an invalidation generation. A decision computed
//! from store reads taken before an eviction is refused by
//! [`DecisionCache::put_if_current`], so invalidation cannot be undone by a
//! reader that was already in flight.

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Cache key: object id (none for a-priori permissions) and permission
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectKey {
    object_id: Option<String>,
    permission: String,
}

impl SubjectKey {
    pub fn new(object_id: Option<&str>, permission: &str) -> Self {
        SubjectKey {
            object_id: object_id.map(str::to_string),
            permission: permission.to_string(),
        }
    }

    /// Key for a permission not tied to an object
    pub fn a_priori(permission: &str) -> Self {
        Self::new(None, permission)
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    pub fn permission(&self) -> &str {
        &self.permission
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedDecision {
    allowed: bool,
    stamp: DateTime<Utc>,
}

struct Entries {
    lru: LruCache<SubjectKey, CachedDecision>,
    generation: u64,
}

impl Entries {
    fn invalidated(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Bounded decision cache owned by one session
pub struct DecisionCache {
    entries: Mutex<Entries>,
}

impl DecisionCache {
    /// Create a cache holding at most `capacity` decisions (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        DecisionCache {
            entries: Mutex::new(Entries {
                lru: LruCache::new(capacity),
                generation: 0,
            }),
        }
    }

    /// Cached decision, if stored at or after `login_time`
    pub fn get(&self, key: &SubjectKey, login_time: DateTime<Utc>) -> Option<bool> {
        let mut entries = self.entries.lock();
        let found = entries
            .lru
            .get(key)
            .map(|entry| (entry.allowed, entry.stamp >= login_time));
        match found {
            Some((allowed, true)) => Some(allowed),
            Some((_, false)) => {
                entries.lru.pop(key);
                None
            }
            None => None,
        }
    }

    /// Store a decision stamped with the login time it was computed under
    pub fn put(&self, key: SubjectKey, allowed: bool, login_time: DateTime<Utc>) {
        self.entries.lock().lru.put(
            key,
            CachedDecision {
                allowed,
                stamp: login_time,
            },
        );
    }

    /// Current invalidation generation; take it before reading the store
    pub fn generation(&self) -> u64 {
        self.entries.lock().generation
    }

    /// Store a decision only if nothing was evicted since `generation`
    ///
    /// Returns whether the decision was stored.
    pub fn put_if_current(
        &self,
        key: SubjectKey,
        allowed: bool,
        login_time: DateTime<Utc>,
        generation: u64,
    ) -> bool {
        let mut entries = self.entries.lock();
        if entries.generation != generation {
            return false;
        }
        entries.lru.put(
            key,
            CachedDecision {
                allowed,
                stamp: login_time,
            },
        );
        true
    }

    pub fn evict(&self, key: &SubjectKey) -> Option<bool> {
        let mut entries = self.entries.lock();
        entries.invalidated();
        entries.lru.pop(key).map(|entry| entry.allowed)
    }

    /// Remove every entry whose object id is in `ids`; returns how many
    pub fn evict_all_for_ids(&self, ids: &[Option<&str>]) -> usize {
        let mut entries = self.entries.lock();
        entries.invalidated();
        let doomed: Vec<SubjectKey> = entries
            .lru
            .iter()
            .filter(|(key, _)| ids.contains(&key.object_id()))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.lru.pop(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.invalidated();
        entries.lru.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().lru.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().lru.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(id: &str, perm: &str) -> SubjectKey {
        SubjectKey::new(Some(id), perm)
    }

    #[test]
    fn test_cache_basic() {
        let cache = DecisionCache::new(10);
        let login = Utc::now();

        assert!(cache.get(&key("doc_1", "read"), login).is_none());

        cache.put(key("doc_1", "read"), true, login);
        assert_eq!(cache.get(&key("doc_1", "read"), login), Some(true));

        cache.put(key("doc_1", "write"), false, login);
        assert_eq!(cache.get(&key("doc_1", "write"), login), Some(false));
    }

    #[test]
    fn test_cache_lru_eviction() {
        let cache = DecisionCache::new(2);
        let login = Utc::now();

        cache.put(key("a", "read"), true, login);
        cache.put(key("b", "read"), true, login);
        cache.put(key("c", "read"), true, login); // Should evict a

        assert!(cache.get(&key("a", "read"), login).is_none());
        assert_eq!(cache.get(&key("b", "read"), login), Some(true));
        assert_eq!(cache.get(&key("c", "read"), login), Some(true));
    }

    #[test]
    fn test_stale_login_epoch() {
        let cache = DecisionCache::new(10);
        let first_login = Utc::now();
        cache.put(key("doc", "read"), true, first_login);

        assert_eq!(cache.get(&key("doc", "read"), first_login), Some(true));

        let second_login = first_login + Duration::seconds(5);
        assert_eq!(cache.get(&key("doc", "read"), second_login), None);
        // Stale entries are dropped on read
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entries_newer_than_login_are_fresh() {
        let cache = DecisionCache::new(10);
        let login = Utc::now();
        cache.put(key("doc", "read"), false, login + Duration::seconds(1));
        assert_eq!(cache.get(&key("doc", "read"), login), Some(false));
    }

    #[test]
    fn test_evict_single() {
        let cache = DecisionCache::new(10);
        let login = Utc::now();
        cache.put(key("doc", "read"), true, login);

        assert_eq!(cache.evict(&key("doc", "read")), Some(true));
        assert_eq!(cache.evict(&key("doc", "read")), None);
    }

    #[test]
    fn test_evict_all_for_ids() {
        let cache = DecisionCache::new(10);
        let login = Utc::now();
        cache.put(key("doc_1", "read"), true, login);
        cache.put(key("doc_1", "write"), false, login);
        cache.put(key("doc_2", "read"), true, login);
        cache.put(SubjectKey::a_priori("create-doc"), true, login);

        assert_eq!(cache.evict_all_for_ids(&[Some("doc_1")]), 2);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.evict_all_for_ids(&[None, Some("missing")]), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("doc_2", "read"), login), Some(true));
    }

    #[test]
    fn test_eviction_refuses_in_flight_puts() {
        let cache = DecisionCache::new(10);
        let login = Utc::now();

        let before = cache.generation();
        cache.evict_all_for_ids(&[Some("doc")]);
        assert!(!cache.put_if_current(key("doc", "read"), true, login, before));
        assert!(cache.get(&key("doc", "read"), login).is_none());

        let current = cache.generation();
        assert!(cache.put_if_current(key("doc", "read"), false, login, current));
        assert_eq!(cache.get(&key("doc", "read"), login), Some(false));

        // Plain puts leave the generation alone
        cache.put(key("doc", "write"), true, login);
        assert_eq!(cache.generation(), current);

        cache.evict(&key("doc", "write"));
        assert_ne!(cache.generation(), current);
    }

    #[test]
    fn test_cache_clear() {
        let cache = DecisionCache::new(10);
        cache.put(key("doc", "read"), true, Utc::now());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(DecisionCache::new(0).capacity(), 1);
    }
}
