//! Process-local TTL cache shared through `AppState`.
//!
//! Backs the rate limiter's fixed-window counters and the checkout
//! idempotency reservations. One instance is created at startup and handed to
//! its consumers; an optional background task purges expired entries until
//! the server shuts down.

use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() >= expires_at,
            None => false,
        }
    }
}

/// State of a fixed-window counter after an [`InMemoryCache::increment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    pub count: u64,
    pub resets_in: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                return Some(entry.value.clone());
            }
        }
        self.store.remove_if(key, |_, entry| entry.is_expired());
        None
    }

    pub fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        self.store
            .insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
    }

    /// Stores `value` only when no live entry exists for `key`. Returns
    /// whether this call won the reservation.
    pub fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(CacheEntry::new(value.to_string(), ttl));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(value.to_string(), ttl));
                true
            }
        }
    }

    pub fn delete(&self, key: &str) {
        self.store.remove(key);
    }

    /// Atomically bumps a counter whose window starts on first use and lasts `window`.
    pub fn increment(&self, key: &str, window: Duration) -> CounterState {
        let mut entry = self
            .store
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::new("0".to_string(), Some(window)));

        if entry.is_expired() {
            *entry = CacheEntry::new("0".to_string(), Some(window));
        }

        let count = entry.value.parse::<u64>().unwrap_or(0).saturating_add(1);
        entry.value = count.to_string();

        let resets_in = entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(window);

        CounterState { count, resets_in }
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.store.len())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Spawns the purge loop. It exits once `shutdown` flips to `true` or its
    /// sender is dropped.
    pub fn spawn_purge_task(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        let interval = interval.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!(purged, "purged expired cache entries");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("cache purge task stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
