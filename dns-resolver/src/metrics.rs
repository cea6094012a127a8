//! Metrics from a resolution attempt. Callers build this structure up
//! as they go rather than poking at a global counter directly.

use dns_types::protocol::types::ResourceRecord;

#[derive(Debug, Default)]
pub struct Metrics {
    /// Questions answered authoritatively: zone answers, CNAMEs,
    /// delegations, and name errors for the served zone.
    pub authoritative_hits: u64,
    /// Questions with no cached data for the name/type asked, at the
    /// point the dispatcher decides how to route them.
    pub cache_misses: u64,
    /// Questions already covered by cached data at dispatch time.
    pub cache_hits: u64,
    /// Questions answered by some upstream nameserver.
    pub nameserver_hits: u64,
    /// Questions an upstream nameserver failed to answer.
    pub nameserver_misses: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authoritative_hit(&mut self) {
        self.authoritative_hits += 1;
    }

    pub fn cache_hit_or_miss(&mut self, cached_rrs: &[ResourceRecord]) {
        if cached_rrs.is_empty() {
            self.cache_misses += 1;
        } else {
            self.cache_hits += 1;
        }
    }

    pub fn nameserver_hit(&mut self) {
        self.nameserver_hits += 1;
    }

    pub fn nameserver_miss(&mut self) {
        self.nameserver_misses += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::test_util::a_record;

    #[test]
    fn cache_hit_or_miss_counts_correctly() {
        let mut metrics = Metrics::new();
        metrics.cache_hit_or_miss(&[]);
        metrics.cache_hit_or_miss(&[a_record("foo.", "1.2.3.4".parse().unwrap())]);

        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(metrics.cache_hits, 1);
    }
}
