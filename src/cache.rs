//! Time-expiring response cache with in-flight request de-duplication.
//!
//! [`ResponseCache`] maps string keys (derived from the request: kind,
//! endpoint, parameters) to values with an absolute expiry. Reads never
//! return an expired value: stale entries are evicted on read, and a
//! background sweeper ([`ResponseCache::spawn_sweeper`]) purges entries
//! nobody reads again.
//!
//! [`ResponseCache::get_cached_response`] is the de-duplicating entry
//! point. Concurrent callers for the same key share one underlying fetch
//! and all observe the same value or the same error:
//!
//! ```text
//! caller A ──┐
//! caller B ──┼──▶ pending[key] ──▶ producer() ──▶ entries[key] (on success)
//! caller C ──┘         (one Shared future, removed once settled)
//! ```
//!
//! Time is measured with `tokio::time::Instant`, so tests can drive
//! expiry with a paused clock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::CrmResult;

type SharedFetch<V> = Shared<BoxFuture<'static, CrmResult<V>>>;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Absolute expiry for `ttl` from `now`. TTLs too large for the clock
/// never expire in practice.
fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// An in-flight retrieval. `ticket` identifies the registration so a
/// settled fetch only removes its own entry, never a newer one.
struct Pending<V> {
    ticket: u64,
    fetch: SharedFetch<V>,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    pending: HashMap<String, Pending<V>>,
    default_ttl: Duration,
    next_ticket: u64,
}

struct Inner<V> {
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> Inner<V> {
    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - state.entries.len();
        if removed > 0 {
            debug!(removed, "cache cleanup: purged expired entries");
        }
        removed
    }

    /// Completes a registration: drops it from the pending table and, on
    /// success, stores the value. A registration that was invalidated
    /// while in flight is not cached.
    fn settle(&self, key: &str, ticket: u64, result: &CrmResult<V>, ttl: Duration) {
        let mut state = self.lock();
        let still_registered = state
            .pending
            .get(key)
            .map(|p| p.ticket == ticket)
            .unwrap_or(false);
        if !still_registered {
            return;
        }
        state.pending.remove(key);
        if let Ok(value) = result {
            state.entries.insert(
                key.to_string(),
                CacheEntry {
                    value: value.clone(),
                    expires_at: expiry(Instant::now(), ttl),
                },
            );
        }
    }
}

/// Shared, cloneable response cache. Clones refer to the same storage.
pub struct ResponseCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for ResponseCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Default entry lifetime when none is configured: five minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default interval between background sweeps: one minute.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

impl<V> Default for ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    pending: HashMap::new(),
                    default_ttl,
                    next_ticket: 0,
                }),
            }),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.lock().default_ttl
    }

    pub fn set_default_ttl(&self, ttl: Duration) {
        self.inner.lock().default_ttl = ttl;
    }

    /// Stores `value` under `key`, replacing any prior entry. Expiry is
    /// now + `ttl`, or now + the default TTL when `ttl` is `None`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let mut state = self.inner.lock();
        let ttl = ttl.unwrap_or(state.default_ttl);
        state.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: expiry(Instant::now(), ttl),
            },
        );
    }

    /// Returns the value if present and unexpired. An expired entry is
    /// evicted as a side effect.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.inner.lock();
        fresh_value(&mut state, key, Instant::now())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes one entry. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Removes every stored entry. In-flight retrievals are unaffected.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Drops the entry and any in-flight registration for `key`.
    ///
    /// Callers already awaiting the in-flight fetch still receive its
    /// result, but that result is not cached.
    pub fn invalidate(&self, key: &str) {
        let mut state = self.inner.lock();
        state.entries.remove(key);
        state.pending.remove(key);
    }

    /// Invalidates every entry (and in-flight registration) whose key
    /// contains `pattern`. Returns the number of stored entries removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut state = self.inner.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.contains(pattern));
        state.pending.retain(|key, _| !key.contains(pattern));
        before - state.entries.len()
    }

    /// Keys of stored entries, including ones that have expired but not
    /// yet been evicted.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of retrievals currently in flight.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Purges every expired entry. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        self.inner.cleanup()
    }

    /// Starts the background sweep on the current tokio runtime.
    ///
    /// The task holds only a weak reference: it stops by itself once the
    /// last clone of the cache is dropped. Abort the returned handle to
    /// stop it earlier.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner<V>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(inner) => {
                        inner.cleanup();
                    }
                    None => break,
                }
            }
        })
    }

    /// De-duplicating read-through lookup.
    ///
    /// 1. If a retrieval for `key` is in flight, await that same retrieval.
    /// 2. Otherwise, on a fresh cache hit, return the cached value.
    /// 3. Otherwise call `producer`, register its future as the in-flight
    ///    retrieval for `key`, and await it. When it settles the
    ///    registration is removed and, on success, the value is stored
    ///    with `ttl` (or the default TTL).
    ///
    /// `producer` is invoked at most once per miss and must not call back
    /// into this cache synchronously.
    pub async fn get_cached_response<F, Fut>(
        &self,
        key: &str,
        producer: F,
        ttl: Option<Duration>,
    ) -> CrmResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CrmResult<V>> + Send + 'static,
    {
        let fetch = {
            let mut state = self.inner.lock();
            if let Some(pending) = state.pending.get(key) {
                debug!(key, "cache: joining in-flight request");
                pending.fetch.clone()
            } else {
                if let Some(value) = fresh_value(&mut state, key, Instant::now()) {
                    debug!(key, "cache hit");
                    return Ok(value);
                }
                debug!(key, "cache miss");
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                let ttl = ttl.unwrap_or(state.default_ttl);
                let weak = Arc::downgrade(&self.inner);
                let owned_key = key.to_string();
                let fut = producer();
                let fetch = async move {
                    let result = fut.await;
                    if let Some(inner) = weak.upgrade() {
                        inner.settle(&owned_key, ticket, &result, ttl);
                    }
                    result
                }
                .boxed()
                .shared();
                state.pending.insert(
                    key.to_string(),
                    Pending {
                        ticket,
                        fetch: fetch.clone(),
                    },
                );
                fetch
            }
        };
        fetch.await
    }
}

fn fresh_value<V: Clone>(state: &mut CacheState<V>, key: &str, now: Instant) -> Option<V> {
    match state.entries.get(key) {
        Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
        Some(_) => {
            state.entries.remove(key);
            None
        }
        None => None,
    }
}
