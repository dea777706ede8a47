use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Key → (value, inserted-at) map whose entries expire after a fixed TTL.
#[derive(Debug)]
pub struct TtlCache<K, V, C = SystemClock> {
    ttl: Duration,
    clock: C,
    entries: HashMap<K, (V, Instant)>,
}

impl<K: Eq + Hash, V: Clone, C: Clock> TtlCache<K, V, C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            ttl,
            clock,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let fresh = match self.entries.get(key) {
            Some((_, stored)) => now.duration_since(*stored) < self.ttl,
            None => return None,
        };
        if fresh {
            self.entries.get(key).map(|(v, _)| v.clone())
        } else {
            self.entries.remove(key);
            None
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        let now = self.clock.now();
        self.entries.insert(key, (value, now));
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
