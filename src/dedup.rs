//! Bounded decaying cache that suppresses repeated requests. Entries
//! expire by age (TTL) and by capacity (oldest first); both triggers are
//! applied lazily on every operation, so the cache needs no sweeper task.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

/// Identity of one inbound request: sender, optional message id and a
/// digest of the raw payload. An identical payload under a fresh message
/// id is a new request by definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    sender: String,
    msg_no: Option<String>,
    payload_digest: String,
}

impl DedupKey {
    pub fn new(sender: &str, msg_no: Option<&str>, payload: &str) -> Self {
        // DefaultHasher::new() uses fixed keys, so the digest is stable
        // for the lifetime of the cache.
        let mut hasher = DefaultHasher::new();
        payload.hash(&mut hasher);
        Self {
            sender: sender.to_uppercase(),
            msg_no: msg_no.map(|s| s.to_string()),
            payload_digest: format!("{:016x}", hasher.finish()),
        }
    }
}

pub struct DedupCache {
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<DedupKey, Instant>,
    order: VecDeque<DedupKey>,
}

impl DedupCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Insert the key unless a live entry already exists. Returns true if
    /// the key was newly inserted (the request proceeds), false if it was
    /// already present (drop the request).
    pub fn insert_if_absent(&mut self, key: DedupKey) -> bool {
        self.insert_if_absent_at(key, Instant::now())
    }

    fn insert_if_absent_at(&mut self, key: DedupKey, now: Instant) -> bool {
        self.expire(now);

        if self.entries.contains_key(&key) {
            return false;
        }

        self.entries.insert(key.clone(), now);
        self.order.push_back(key);

        while self.order.len() > self.max_entries {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        true
    }

    fn expire(&mut self, now: Instant) {
        loop {
            let expired = match self.order.front() {
                // Entries already gone after a capacity eviction count
                // as expired too.
                Some(oldest) => match self.entries.get(oldest) {
                    Some(inserted) => now.duration_since(*inserted) >= self.ttl,
                    None => true,
                },
                None => return,
            };
            if !expired {
                return;
            }
            if let Some(key) = self.order.pop_front() {
                self.entries.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(sender: &str, msg_no: Option<&str>, payload: &str) -> DedupKey {
        DedupKey::new(sender, msg_no, payload)
    }

    #[test]
    fn repeated_key_is_rejected() {
        let mut cache = DedupCache::new(Duration::from_secs(60), 100);
        assert!(cache.insert_if_absent(key("DF1JSL-8", None, "wx tomorrow")));
        assert!(!cache.insert_if_absent(key("DF1JSL-8", None, "wx tomorrow")));
    }

    #[test]
    fn message_id_participates_in_the_key() {
        let mut cache = DedupCache::new(Duration::from_secs(60), 100);
        assert!(cache.insert_if_absent(key("DF1JSL-8", Some("001"), "wx")));
        assert!(cache.insert_if_absent(key("DF1JSL-8", Some("002"), "wx")));
        assert!(!cache.insert_if_absent(key("DF1JSL-8", Some("001"), "wx")));
    }

    #[test]
    fn sender_case_is_normalized() {
        let mut cache = DedupCache::new(Duration::from_secs(60), 100);
        assert!(cache.insert_if_absent(key("df1jsl-8", None, "wx")));
        assert!(!cache.insert_if_absent(key("DF1JSL-8", None, "wx")));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = DedupCache::new(Duration::from_millis(10), 100);
        let start = Instant::now();
        assert!(cache.insert_if_absent_at(key("DF1JSL-8", None, "wx"), start));
        assert!(!cache.insert_if_absent_at(key("DF1JSL-8", None, "wx"), start));
        let later = start + Duration::from_millis(20);
        assert!(cache.insert_if_absent_at(key("DF1JSL-8", None, "wx"), later));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut cache = DedupCache::new(Duration::from_secs(3600), 2);
        assert!(cache.insert_if_absent(key("A1AAA", None, "one")));
        assert!(cache.insert_if_absent(key("A1AAA", None, "two")));
        assert!(cache.insert_if_absent(key("A1AAA", None, "three")));
        assert_eq!(cache.len(), 2);
        // The first entry was evicted, so it counts as new again.
        assert!(cache.insert_if_absent(key("A1AAA", None, "one")));
    }
}
