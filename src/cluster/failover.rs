//! Bounded TTL cache of removed nodes' failover domains.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub(crate) const DEFAULT_CAPACITY: usize = 100;
pub(crate) const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Maps the jvmRoute of a removed node to its last-known failover domain.
///
/// Consulted when a sticky session points at a node that is gone, so the
/// request can fail over within the node's domain. Entries age out after
/// the TTL; when the cache is full the least recently used entry is
/// evicted. Reads may race with eviction; a miss just means "no hint".
pub struct FailoverDomainCache {
    entries: DashMap<String, CacheEntry>,
    capacity: usize,
    ttl: Duration,
    epoch: Instant,
}

struct CacheEntry {
    domain: String,
    expires: Instant,
    /// Millis since the cache epoch; updated on every hit.
    last_used: AtomicU64,
}

impl FailoverDomainCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
            epoch: Instant::now(),
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Look up the domain hint for a removed node.
    pub fn get(&self, jvm_route: &str) -> Option<String> {
        let expired = match self.entries.get(jvm_route) {
            Some(entry) => {
                if entry.expires > Instant::now() {
                    entry.last_used.store(self.now_millis(), Ordering::Relaxed);
                    return Some(entry.domain.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(jvm_route);
        }
        None
    }

    /// Remember the domain of a node that is being removed.
    pub fn add(&self, jvm_route: impl Into<String>, domain: impl Into<String>) {
        let jvm_route = jvm_route.into();
        if !self.entries.contains_key(&jvm_route) && self.entries.len() >= self.capacity {
            self.evict_one();
        }
        self.entries.insert(
            jvm_route,
            CacheEntry {
                domain: domain.into(),
                expires: Instant::now() + self.ttl,
                last_used: AtomicU64::new(self.now_millis()),
            },
        );
    }

    /// Drop the hint for a node that has re-registered.
    pub fn remove(&self, jvm_route: &str) {
        self.entries.remove(jvm_route);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict an expired entry if one exists, otherwise the least recently
    /// used one.
    fn evict_one(&self) {
        let now = Instant::now();
        let mut victim: Option<(String, u64)> = None;
        for entry in self.entries.iter() {
            if entry.expires <= now {
                victim = Some((entry.key().clone(), 0));
                break;
            }
            let used = entry.last_used.load(Ordering::Relaxed);
            match &victim {
                Some((_, oldest)) if *oldest <= used => {}
                _ => victim = Some((entry.key().clone(), used)),
            }
        }
        if let Some((key, _)) = victim {
            self.entries.remove(&key);
        }
    }
}

impl Default for FailoverDomainCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_add_get_remove() {
        let cache = FailoverDomainCache::default();

        cache.add("node1", "d1");
        assert_eq!(cache.get("node1"), Some("d1".to_string()));
        assert_eq!(cache.get("node2"), None);

        cache.remove("node1");
        assert_eq!(cache.get("node1"), None);
    }

    #[test]
    fn test_entries_expire() {
        let cache = FailoverDomainCache::new(10, Duration::from_millis(30));

        cache.add("node1", "d1");
        assert_eq!(cache.get("node1"), Some("d1".to_string()));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.get("node1"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let cache = FailoverDomainCache::new(2, Duration::from_secs(60));

        cache.add("node1", "d1");
        thread::sleep(Duration::from_millis(5));
        cache.add("node2", "d2");
        thread::sleep(Duration::from_millis(5));

        // Touch node1 so node2 becomes the eviction candidate.
        assert!(cache.get("node1").is_some());
        thread::sleep(Duration::from_millis(5));

        cache.add("node3", "d3");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("node2"), None);
        assert_eq!(cache.get("node1"), Some("d1".to_string()));
        assert_eq!(cache.get("node3"), Some("d3".to_string()));
    }

    #[test]
    fn test_reinsert_refreshes_existing_entry() {
        let cache = FailoverDomainCache::new(2, Duration::from_secs(60));

        cache.add("node1", "d1");
        cache.add("node2", "d2");
        cache.add("node1", "d9");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("node1"), Some("d9".to_string()));
        assert_eq!(cache.get("node2"), Some("d2".to_string()));
    }
}
