//! A TTL-indexed cache of resource records.
//!
//! Unlike a conventional resolver cache, this one keeps a **multiset**
//! per `(owner, type)` key: inserting the same record twice keeps two
//! independent, independently-expiring copies rather than deduplicating
//! them. It is also unbounded — there is no LRU eviction or maximum
//! entry count, only TTL-driven expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dns_types::protocol::types::{DomainName, RecordType, ResourceRecord};

type Key = (DomainName, RecordType);

/// A cache entry: the record as it was inserted, and the absolute
/// instant at which it expires.
#[derive(Debug, Clone)]
struct Entry {
    record: ResourceRecord,
    expires_at: Instant,
}

/// The cache proper. Not `Clone` — shared access goes through
/// `SharedCache`, which wraps this in a mutex, matching the source's
/// single-threaded-but-shareable discipline (see the module-level
/// concurrency note on `SharedCache`).
#[derive(Debug, Default)]
pub struct Cache {
    entries: HashMap<Key, Vec<Entry>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` under `(record.name, record.rtype)`, expiring
    /// `record.ttl` seconds from now. Does not deduplicate: inserting
    /// the same record twice produces two independent entries.
    pub fn put(&mut self, record: ResourceRecord) {
        let key = (record.name.clone(), record.rtype_with_data.rtype());
        let expires_at = Instant::now() + Duration::from_secs(record.ttl.into());
        self.entries.entry(key).or_default().push(Entry {
            record,
            expires_at,
        });
    }

    /// All non-expired records for `(owner, rtype)`, each with its
    /// remaining TTL. Implicitly sweeps the queried key.
    pub fn get(&mut self, owner: &DomainName, rtype: RecordType) -> Vec<ResourceRecord> {
        let key = (owner.clone(), rtype);
        let now = Instant::now();

        let Some(entries) = self.entries.get_mut(&key) else {
            return Vec::new();
        };
        entries.retain(|entry| entry.expires_at > now);
        if entries.is_empty() {
            self.entries.remove(&key);
            return Vec::new();
        }

        entries
            .iter()
            .map(|entry| {
                let mut record = entry.record.clone();
                record.ttl = entry
                    .expires_at
                    .saturating_duration_since(now)
                    .as_secs()
                    .try_into()
                    .unwrap_or(u32::MAX);
                record
            })
            .collect()
    }

    /// Remove every expired entry across the whole cache; delete any
    /// key whose multiset becomes empty. Idempotent.
    pub fn sweep(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entries| {
            entries.retain(|entry| entry.expires_at > now);
            !entries.is_empty()
        });
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

/// A shareable handle to a `Cache`. Because the server is
/// single-threaded and cooperative, the mutex is never contended —
/// but keeping it here means a reimplementation that adds worker
/// threads only has to change how this handle is cloned, not its call
/// sites.
#[derive(Debug, Clone)]
pub struct SharedCache(Arc<Mutex<Cache>>);

impl SharedCache {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Cache::new())))
    }

    pub fn put(&self, record: ResourceRecord) {
        self.0.lock().unwrap().put(record);
    }

    pub fn get(&self, owner: &DomainName, rtype: RecordType) -> Vec<ResourceRecord> {
        self.0.lock().unwrap().get(owner, rtype)
    }

    pub fn sweep(&self) {
        self.0.lock().unwrap().sweep();
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::test_util::*;
    use std::thread::sleep;

    #[test]
    fn put_then_get_returns_the_record() {
        let mut cache = Cache::new();
        let rr = a_record("www.foo.", "89.2.33.1".parse().unwrap());
        cache.put(rr.clone());

        let got = cache.get(&rr.name, RecordType::A);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].rtype_with_data, rr.rtype_with_data);
    }

    #[test]
    fn put_does_not_deduplicate() {
        let mut cache = Cache::new();
        let rr = a_record("www.foo.", "89.2.33.1".parse().unwrap());
        cache.put(rr.clone());
        cache.put(rr.clone());

        assert_eq!(cache.get(&rr.name, RecordType::A).len(), 2);
    }

    #[test]
    fn ttl_zero_is_immediately_expired() {
        let mut cache = Cache::new();
        let mut rr = a_record("www.foo.", "89.2.33.1".parse().unwrap());
        rr.ttl = 0;
        cache.put(rr.clone());

        assert!(cache.get(&rr.name, RecordType::A).is_empty());
    }

    #[test]
    fn get_returns_monotonically_decreasing_ttl() {
        let mut cache = Cache::new();
        let rr = a_record("www.foo.", "89.2.33.1".parse().unwrap());
        cache.put(rr.clone());

        let first = cache.get(&rr.name, RecordType::A)[0].ttl;
        sleep(Duration::from_millis(1100));
        let second = cache.get(&rr.name, RecordType::A)[0].ttl;

        assert!(second <= first);
    }

    #[test]
    fn sweep_is_idempotent() {
        let mut cache = Cache::new();
        let mut rr = a_record("www.foo.", "89.2.33.1".parse().unwrap());
        rr.ttl = 0;
        cache.put(rr);

        cache.sweep();
        assert_eq!(cache.len(), 0);
        cache.sweep();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let mut cache = Cache::new();
        let expired = {
            let mut rr = a_record("old.foo.", "1.2.3.4".parse().unwrap());
            rr.ttl = 0;
            rr
        };
        let live = a_record("new.foo.", "5.6.7.8".parse().unwrap());
        cache.put(expired);
        cache.put(live.clone());

        cache.sweep();

        assert!(cache.get(&live.name, RecordType::A).len() == 1);
        assert_eq!(cache.len(), 1);
    }
}
