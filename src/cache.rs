//! In-memory capability cache: LRU+TTL eviction, warm-up on construction,
//! background refresh, and per-pubkey refresh serialization.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::capability::{Capability, CapabilityQuery};
use crate::errors::{CoordinationError, Pubkey, Result};
use crate::transport::EventStore;

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_WARMUP_LIMIT: usize = 1000;
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Entries older than this fraction of TTL are eligible for background refresh.
pub const REFRESH_AGE_FRACTION: f64 = 0.8;

struct Entry {
    capability: Capability,
    inserted_at: u64,
    last_access: u64,
}

#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub refresh_count: AtomicU64,
    pub evictions: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub refresh_count: u64,
    pub evictions: u64,
    pub size: usize,
}

pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
    pub warmup_limit: usize,
    pub refresh_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: DEFAULT_TTL,
            warmup_limit: DEFAULT_WARMUP_LIMIT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// A monotonic clock injected by the caller, so tests can advance time
/// without sleeping. Production code wires this to wall-clock seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

pub struct SystemClock;
impl Clock for SystemClock {
    fn now(&self) -> u64 {
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs()
    }
}

/// Bounded LRU+TTL cache of capability records, with background refresh.
pub struct CapabilityCache {
    table: RwLock<HashMap<Pubkey, Entry>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    metrics: CacheMetrics,
    refresh_locks: DashMap<Pubkey, Arc<Mutex<()>>>,
    sweep_in_flight: std::sync::atomic::AtomicBool,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    stop: Arc<tokio::sync::Notify>,
}

impl CapabilityCache {
    /// Construct the cache and perform warm-up: fetch up to
    /// `config.warmup_limit` capability records from `store`, tolerating
    /// per-record parse errors.
    pub async fn new(store: &dyn EventStore, config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>> {
        let cache = Arc::new(Self {
            table: RwLock::new(HashMap::new()),
            config,
            clock,
            metrics: CacheMetrics::default(),
            refresh_locks: DashMap::new(),
            sweep_in_flight: std::sync::atomic::AtomicBool::new(false),
            refresh_task: Mutex::new(None),
            stop: Arc::new(tokio::sync::Notify::new()),
        });
        cache.warm_up(store).await;
        Ok(cache)
    }

    async fn warm_up(&self, store: &dyn EventStore) {
        let query = CapabilityQuery { limit: Some(self.config.warmup_limit), ..Default::default() };
        match crate::capability::query(store, &query).await {
            Ok(capabilities) => {
                let now = self.clock.now();
                let mut table = self.table.write().await;
                for cap in capabilities {
                    table.insert(cap.author.clone(), Entry { capability: cap, inserted_at: now, last_access: now });
                }
            }
            Err(e) => tracing::warn!(error = %e, "capability cache warm-up failed"),
        }
    }

    fn ttl_secs(&self) -> u64 {
        self.config.ttl.as_secs()
    }

    /// Return the cached capability for `pubkey` if present and unexpired.
    /// Updates `last_access_timestamp` on a hit; expiry is checked without
    /// mutating the entry beyond dropping it.
    pub async fn get(&self, pubkey: &str) -> Option<Capability> {
        let now = self.clock.now();
        {
            let table = self.table.read().await;
            if let Some(entry) = table.get(pubkey) {
                if now.saturating_sub(entry.inserted_at) <= self.ttl_secs() {
                    // Fall through to take the write lock for the access-time bump.
                } else {
                    drop(table);
                    self.table.write().await.remove(pubkey);
                    self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            } else {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
        let mut table = self.table.write().await;
        if let Some(entry) = table.get_mut(pubkey) {
            entry.last_access = now;
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.capability.clone())
        } else {
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Insert or replace the cached entry for `capability.author`, evicting
    /// the least-recently-accessed entry if at capacity.
    pub async fn set(&self, capability: Capability) {
        let now = self.clock.now();
        let mut table = self.table.write().await;
        let pubkey = capability.author.clone();
        if !table.contains_key(&pubkey) && table.len() >= self.config.max_entries {
            if let Some(victim) = table.iter().min_by_key(|(_, e)| e.last_access).map(|(k, _)| k.clone()) {
                table.remove(&victim);
                self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        table.insert(pubkey, Entry { capability, inserted_at: now, last_access: now });
    }

    pub async fn invalidate(&self, pubkey: &str) {
        self.table.write().await.remove(pubkey);
    }

    pub async fn invalidate_all(&self) {
        self.table.write().await.clear();
    }

    pub async fn size(&self) -> usize {
        self.table.read().await.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            refresh_count: self.metrics.refresh_count.load(Ordering::Relaxed),
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
            size: self.table.try_read().map(|t| t.len()).unwrap_or(0),
        }
    }

    fn refresh_lock(&self, pubkey: &str) -> Arc<Mutex<()>> {
        self.refresh_locks.entry(pubkey.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Force-refresh `pubkey`, serialized against any concurrent refresh of
    /// the same pubkey. Raises [`CoordinationError::CapabilityMissing`] if
    /// the store has no record for it.
    pub async fn refresh(&self, store: &dyn EventStore, pubkey: &str) -> Result<Capability> {
        let lock = self.refresh_lock(pubkey);
        let _guard = lock.lock().await;

        let query = CapabilityQuery { pubkeys: Some(vec![pubkey.to_string()]), limit: Some(1), ..Default::default() };
        let results = crate::capability::query(store, &query).await?;
        let capability = results.into_iter().next().ok_or_else(|| CoordinationError::CapabilityMissing(pubkey.to_string()))?;

        self.set(capability.clone()).await;
        self.metrics.refresh_count.fetch_add(1, Ordering::Relaxed);
        Ok(capability)
    }

    /// One non-overlapping sweep: refresh every entry older than
    /// `REFRESH_AGE_FRACTION * ttl`, all-settled (a per-entry failure logs
    /// and does not stop the sweep).
    pub async fn sweep(&self, store: &dyn EventStore) {
        if self.sweep_in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("refresh sweep already in flight, skipping this tick");
            return;
        }
        let stale_age = (self.ttl_secs() as f64 * REFRESH_AGE_FRACTION) as u64;
        let now = self.clock.now();
        let candidates: Vec<Pubkey> = {
            let table = self.table.read().await;
            table
                .iter()
                .filter(|(_, e)| now.saturating_sub(e.inserted_at) >= stale_age)
                .map(|(k, _)| k.clone())
                .collect()
        };

        let futures = candidates.into_iter().map(|pubkey| async move {
            if let Err(e) = self.refresh(store, &pubkey).await {
                tracing::warn!(error = %e, pubkey, "background capability refresh failed");
            }
        });
        futures::future::join_all(futures).await;

        self.sweep_in_flight.store(false, Ordering::Release);
    }

    /// Start the background refresh loop on `handle`. No-op if already
    /// started. The loop stops when [`Self::stop_refresh_loop`] is called.
    pub fn start_refresh_loop(self: &Arc<Self>, store: Arc<dyn EventStore>)
    where
        Self: 'static,
    {
        let cache = Arc::clone(self);
        let stop = Arc::clone(&self.stop);
        let interval = self.config.refresh_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => cache.sweep(store.as_ref()).await,
                    _ = stop.notified() => break,
                }
            }
        });
        // Best-effort: if a loop is already running this leaks a handle
        // rather than aborting in-flight work out from under it.
        if let Ok(mut guard) = self.refresh_task.try_lock() {
            *guard = Some(handle);
        }
    }

    /// Halt the background refresh loop and release outstanding tasks.
    pub async fn stop_refresh_loop(&self) {
        self.stop.notify_waiters();
        if let Some(handle) = self.refresh_task.lock().await.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEventStore, FixedClock};
    use std::sync::Arc;

    fn capability(author: &str) -> Capability {
        Capability {
            author: author.into(),
            identifier: "g.x.agent".into(),
            supported_kinds: Default::default(),
            supported_nips: Default::default(),
            agent_type: crate::capability::AgentType::Dvm,
            payment_address: "g.x.agent".into(),
            pricing: Default::default(),
            capacity: None,
            model: None,
            skills: None,
            metadata: serde_json::json!({}),
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn get_after_set_within_ttl_returns_value_then_expires() {
        let clock = Arc::new(FixedClock::new(0));
        let store = FakeEventStore::new(vec![]);
        let cache = CapabilityCache::new(&store, CacheConfig { ttl: Duration::from_secs(10), ..Default::default() }, clock.clone()).await.unwrap();
        cache.set(capability(&"a".repeat(64))).await;
        assert!(cache.get(&"a".repeat(64)).await.is_some());
        clock.advance(11);
        assert!(cache.get(&"a".repeat(64)).await.is_none());
    }

    #[tokio::test]
    async fn eviction_is_least_recently_accessed() {
        let clock = Arc::new(FixedClock::new(0));
        let store = FakeEventStore::new(vec![]);
        let cache = CapabilityCache::new(&store, CacheConfig { max_entries: 2, ..Default::default() }, clock.clone()).await.unwrap();

        cache.set(capability(&"1".repeat(64))).await;
        clock.advance(1);
        cache.set(capability(&"2".repeat(64))).await;
        clock.advance(1);
        assert!(cache.get(&"1".repeat(64)).await.is_some());
        clock.advance(1);
        cache.set(capability(&"3".repeat(64))).await;

        assert!(cache.get(&"2".repeat(64)).await.is_none());
        assert!(cache.get(&"1".repeat(64)).await.is_some());
        assert!(cache.get(&"3".repeat(64)).await.is_some());
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[tokio::test]
    async fn invalidate_removes_single_entry_invalidate_all_clears() {
        let clock = Arc::new(FixedClock::new(0));
        let store = FakeEventStore::new(vec![]);
        let cache = CapabilityCache::new(&store, CacheConfig::default(), clock).await.unwrap();
        cache.set(capability(&"1".repeat(64))).await;
        cache.set(capability(&"2".repeat(64))).await;
        cache.invalidate(&"1".repeat(64)).await;
        assert_eq!(cache.size().await, 1);
        cache.invalidate_all().await;
        assert_eq!(cache.size().await, 0);
    }
}
