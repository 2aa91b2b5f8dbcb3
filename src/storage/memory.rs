//! Reference in-memory storage backend.
//!
//! Guards all state behind a single `parking_lot::Mutex<HashMap<..>>` rather
//! than a lock-striped map. `execute_atomic` and `compare_and_swap` hold that
//! mutex for the full read-modify-write, so two concurrent checks for the
//! same key can never both observe the same prior state — the race the
//! teacher's DashMap-based store was exposed to (`get` and `insert` were
//! separate lock acquisitions).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::Result;
use crate::storage::{current_timestamp_ms, Storage, StorageEntry};

/// Garbage collection interval configuration.
#[derive(Debug, Clone)]
pub enum GcInterval {
    /// Run GC every N requests.
    Requests(u64),
    /// Run GC at fixed time intervals.
    Duration(Duration),
    /// Disable automatic GC.
    Manual,
}

impl Default for GcInterval {
    fn default() -> Self {
        Self::Requests(10000)
    }
}

/// Garbage collection configuration.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// When to trigger GC.
    pub interval: GcInterval,
    /// Maximum age of entries before cleanup (default: 1 hour).
    pub max_age: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval: GcInterval::default(),
            max_age: Duration::from_secs(3600),
        }
    }
}

impl GcConfig {
    /// Create config with request-based GC.
    pub fn on_requests(count: u64) -> Self {
        Self {
            interval: GcInterval::Requests(count),
            ..Default::default()
        }
    }

    /// Create config with time-based GC.
    pub fn on_duration(interval: Duration) -> Self {
        Self {
            interval: GcInterval::Duration(interval),
            ..Default::default()
        }
    }

    /// Create config with manual GC only.
    pub fn manual() -> Self {
        Self {
            interval: GcInterval::Manual,
            ..Default::default()
        }
    }

    /// Set the maximum age for entries.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

#[derive(Debug, Clone)]
struct InternalEntry {
    entry: StorageEntry,
    expires_at: u64,
}

struct Inner {
    data: HashMap<String, InternalEntry>,
}

/// Reference in-memory store, single-process only.
///
/// # Example
///
/// ```ignore
/// use halt_core::storage::{MemoryStore, GcConfig};
///
/// let store = MemoryStore::new();
/// let store = MemoryStore::with_gc(GcConfig::manual());
/// ```
pub struct MemoryStore {
    inner: Mutex<Inner>,
    gc_config: GcConfig,
    request_count: AtomicU64,
    shutdown: Arc<Notify>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.inner.lock().data.len())
            .field("gc_config", &self.gc_config)
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new store with default GC configuration.
    pub fn new() -> Self {
        Self::with_gc(GcConfig::default())
    }

    /// Create a new store with custom GC configuration.
    pub fn with_gc(gc_config: GcConfig) -> Self {
        let store = Self {
            inner: Mutex::new(Inner {
                data: HashMap::new(),
            }),
            gc_config: gc_config.clone(),
            request_count: AtomicU64::new(0),
            shutdown: Arc::new(Notify::new()),
        };

        if let GcInterval::Duration(interval) = gc_config.interval {
            store.start_gc_task(interval);
        }

        store
    }

    fn start_gc_task(&self, _interval: Duration) {
        // A `MemoryStore` isn't `Arc`-wrapped by construction, so the
        // background task borrows nothing; callers that want automatic,
        // time-based GC should wrap the store in `Arc` and call
        // `run_gc` on a ticking interval themselves, or rely on the
        // per-request GC (`GcInterval::Requests`), which needs no task.
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            shutdown.notified().await;
        });
    }

    /// Manually trigger garbage collection.
    pub fn run_gc(&self) {
        let now = current_timestamp_ms();
        let max_age_ms = self.gc_config.max_age.as_millis() as u64;
        let cutoff = now.saturating_sub(max_age_ms);
        let mut inner = self.inner.lock();
        inner
            .data
            .retain(|_, internal| internal.expires_at > now || internal.entry.last_update > cutoff);
    }

    /// Number of entries currently stored, including not-yet-GC'd expired ones.
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.inner.lock().data.clear();
    }

    fn maybe_run_gc(&self) {
        if let GcInterval::Requests(threshold) = self.gc_config.interval {
            if threshold == 0 {
                return;
            }
            let count = self.request_count.fetch_add(1, Ordering::Relaxed);
            if count > 0 && count % threshold == 0 {
                self.run_gc();
            }
        }
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

impl Storage for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>> {
        self.maybe_run_gc();
        let now = current_timestamp_ms();
        let mut inner = self.inner.lock();
        match inner.data.get(key) {
            Some(internal) if internal.expires_at > now => Ok(Some(internal.entry.clone())),
            Some(_) => {
                inner.data.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, entry: StorageEntry, ttl: Duration) -> Result<()> {
        self.maybe_run_gc();
        let expires_at = current_timestamp_ms() + ttl.as_millis() as u64;
        self.inner
            .lock()
            .data
            .insert(key.to_string(), InternalEntry { entry, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().data.remove(key);
        Ok(())
    }

    async fn increment(
        &self,
        key: &str,
        delta: u64,
        window_start: u64,
        ttl: Duration,
    ) -> Result<u64> {
        self.maybe_run_gc();
        let now = current_timestamp_ms();
        let expires_at = now + ttl.as_millis() as u64;

        let mut inner = self.inner.lock();
        let count = match inner.data.get_mut(key) {
            Some(internal) if internal.expires_at > now => {
                if internal.entry.window_start != window_start {
                    internal.entry.count = delta;
                    internal.entry.window_start = window_start;
                } else {
                    internal.entry.count += delta;
                }
                internal.entry.last_update = now;
                internal.expires_at = expires_at;
                internal.entry.count
            }
            _ => {
                let entry = StorageEntry::new(delta, window_start).set_last_update(now);
                let count = entry.count;
                inner
                    .data
                    .insert(key.to_string(), InternalEntry { entry, expires_at });
                count
            }
        };

        Ok(count)
    }

    async fn execute_atomic<F, T>(&self, key: &str, ttl: Duration, operation: F) -> Result<T>
    where
        F: FnOnce(Option<StorageEntry>) -> (StorageEntry, T) + Send,
        T: Send,
    {
        self.maybe_run_gc();
        let now = current_timestamp_ms();
        let expires_at = now + ttl.as_millis() as u64;

        let mut inner = self.inner.lock();
        let current = inner.data.get(key).and_then(|internal| {
            (internal.expires_at > now).then(|| internal.entry.clone())
        });

        let (new_entry, result) = operation(current);
        inner.data.insert(
            key.to_string(),
            InternalEntry {
                entry: new_entry,
                expires_at,
            },
        );

        Ok(result)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&StorageEntry>,
        new: StorageEntry,
        ttl: Duration,
    ) -> Result<bool> {
        self.maybe_run_gc();
        let now = current_timestamp_ms();
        let expires_at = now + ttl.as_millis() as u64;

        let mut inner = self.inner.lock();
        let current = inner.data.get(key).and_then(|internal| {
            (internal.expires_at > now).then(|| internal.entry.clone())
        });

        let matches = match (expected, &current) {
            (None, None) => true,
            (Some(exp), Some(cur)) => exp == cur,
            _ => false,
        };

        if matches {
            inner.data.insert(
                key.to_string(),
                InternalEntry {
                    entry: new,
                    expires_at,
                },
            );
        }

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();

        let entry = StorageEntry::new(5, 1000);
        store.set("key1", entry.clone(), Duration::from_secs(60)).await.unwrap();

        let result = store.get("key1").await.unwrap();
        assert_eq!(result, Some(entry));
    }

    #[tokio::test]
    async fn test_memory_store_expiration() {
        let store = MemoryStore::new();

        let entry = StorageEntry::new(5, 1000);
        store.set("key1", entry, Duration::from_millis(10)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = store.get("key1").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_increment() {
        let store = MemoryStore::new();

        let count = store.increment("key1", 1, 1000, Duration::from_secs(60)).await.unwrap();
        assert_eq!(count, 1);

        let count = store.increment("key1", 1, 1000, Duration::from_secs(60)).await.unwrap();
        assert_eq!(count, 2);

        // New window resets the counter
        let count = store.increment("key1", 1, 2000, Duration::from_secs(60)).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_memory_store_execute_atomic_is_race_free() {
        use std::sync::Arc as StdArc;

        let store = StdArc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .execute_atomic("key1", Duration::from_secs(60), |current| {
                        let count = current.map(|e| e.count).unwrap_or(0);
                        (StorageEntry::new(count + 1, 0), ())
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let entry = store.get("key1").await.unwrap().unwrap();
        assert_eq!(entry.count, 50);
    }

    #[tokio::test]
    async fn test_memory_store_cas() {
        let store = MemoryStore::new();

        let entry = StorageEntry::new(1, 1000);
        let success = store
            .compare_and_swap("key1", None, entry.clone(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(success);

        let wrong = StorageEntry::new(999, 1000);
        let entry2 = StorageEntry::new(2, 1000);
        let success = store
            .compare_and_swap("key1", Some(&wrong), entry2.clone(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!success);

        let success = store
            .compare_and_swap("key1", Some(&entry), entry2.clone(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(success);
    }

    #[test]
    fn test_gc_config() {
        let config = GcConfig::on_requests(1000).with_max_age(Duration::from_secs(3600));
        assert!(matches!(config.interval, GcInterval::Requests(1000)));
        assert_eq!(config.max_age, Duration::from_secs(3600));
    }
}
