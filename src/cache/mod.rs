//! In-memory key-value cache with per-entry expiration.
//!
//! Every entry carries its own absolute expiry time, so each key ages
//! independently from the moment it was last written. Expiry is enforced on
//! read: an expired entry is indistinguishable from an absent one even if it
//! has not been physically removed yet. [`spawn_janitor`] reclaims the memory
//! of expired entries in the background.
//!
//! Time is read through [`tokio::time::Instant`], so tests can drive expiry
//! with Tokio's paused clock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Default lifetime of a cache entry (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default interval between janitor sweeps (10 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A thread-safe map from string keys to values that expire.
///
/// All operations take `&self`; the map is guarded by a mutex that is never
/// held across an `.await`, so the cache can be shared behind an [`Arc`]
/// between any number of concurrent request handlers.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use skycache::cache::ExpiringCache;
///
/// let cache = ExpiringCache::new(Duration::from_secs(300));
/// cache.set_default("paris", 18.5_f64);
///
/// assert_eq!(cache.get("paris"), Some(18.5));
/// assert_eq!(cache.get("london"), None);
/// ```
#[derive(Debug)]
pub struct ExpiringCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    default_ttl: Duration,
}

impl<V: Clone> ExpiringCache<V> {
    /// Creates an empty cache whose [`set_default`](Self::set_default) uses `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Returns the lifetime applied by [`set_default`](Self::set_default).
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns a clone of the value stored under `key`, or `None` if there is
    /// no entry or the entry has expired.
    ///
    /// An expired entry found here is removed on the spot.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();

        if let Some(entry) = entries.get(key) {
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
            entries.remove(key);
        }
        None
    }

    /// Inserts or replaces the entry for `key`, expiring `ttl` from now.
    ///
    /// The previous entry, if any, is replaced wholesale regardless of how
    /// fresh it was. Other keys are untouched.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.lock()
            .insert(key.into(), Entry { value, expires_at });
    }

    /// Inserts or replaces the entry for `key` using the default TTL.
    pub fn set_default(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.default_ttl);
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Returns the number of stored entries, including expired entries that
    /// have not been purged yet.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a half-written entry
    // behind (inserts are a single `HashMap` call), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Spawns a background task that calls [`ExpiringCache::purge_expired`]
/// every `interval`.
///
/// The task holds only a weak reference and exits on its first tick after
/// the last strong reference to the cache is dropped. The first sweep runs
/// one full `interval` after spawning.
///
/// # Panics
///
/// Panics if `interval` is zero or if called outside a Tokio runtime.
pub fn spawn_janitor<V>(cache: &Arc<ExpiringCache<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + 'static,
{
    let cache = Arc::downgrade(cache);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(cache) = cache.upgrade() else {
                debug!("cache dropped, janitor exiting");
                break;
            };

            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = cache.len(), "purged expired cache entries");
            }
        }
    })
}
