use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{BlobConfig, CacheError, CacheResult, CrossOriginFetch, FetchMode};

type SharedFetch = Shared<BoxFuture<'static, CacheResult<MediaHandle>>>;

/// Locally owned, replayable copy of remote media.
///
/// Clones share the same underlying resource. The cache revokes it exactly
/// once, when its last reference is released; after that [`MediaHandle::bytes`]
/// returns `None`.
#[derive(Clone)]
pub struct MediaHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: Uuid,
    key: String,
    content_type: Option<String>,
    size_bytes: u64,
    bytes: Mutex<Option<Bytes>>,
}

impl MediaHandle {
    fn new(key: &str, bytes: Bytes, content_type: Option<String>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                key: key.to_string(),
                content_type,
                size_bytes: bytes.len() as u64,
                bytes: Mutex::new(Some(bytes)),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Remote key this handle was materialized from
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Local locator for players, stable for the life of the handle
    pub fn url(&self) -> String {
        format!("local:{}", self.inner.id)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.inner.content_type.as_deref()
    }

    pub fn size_bytes(&self) -> u64 {
        self.inner.size_bytes
    }

    /// Media bytes, or `None` once revoked
    pub fn bytes(&self) -> Option<Bytes> {
        self.inner.bytes.lock().clone()
    }

    pub fn is_revoked(&self) -> bool {
        self.inner.bytes.lock().is_none()
    }

    /// Returns true only for the call that actually revoked
    fn revoke(&self) -> bool {
        self.inner.bytes.lock().take().is_some()
    }

    fn same_as(&self, other: &MediaHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaHandle")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("size_bytes", &self.inner.size_bytes)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

enum Entry {
    Pending {
        generation: u64,
        fetch: SharedFetch,
        /// Acquirers still waiting on this fetch
        waiters: usize,
        /// Keep the result even if every waiter gives up
        keep_warm: bool,
    },
    Ready {
        handle: MediaHandle,
        refs: usize,
        generation: u64,
        /// Order in which unreferenced entries became warm, oldest evicted first
        warmed: u64,
    },
    Degraded {
        error: CacheError,
    },
}

/// Counters describing cache activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub fetches: u64,
    pub hits: u64,
    pub coalesced: u64,
    pub revocations: u64,
    /// Warm entries dropped to stay within the warm limits
    pub evictions: u64,
    pub entries: usize,
    /// Ready entries nobody holds a reference to
    pub warm: usize,
    pub degraded: usize,
}

/// Fetch-through cache of remote media as ref-counted local handles.
///
/// Concurrent acquires of a key that is still being fetched share one request.
/// A failed fetch leaves a `Degraded` entry and raises the cache-wide degraded
/// flag until the entry is revalidated. Unreferenced entries left by
/// [`MediaCache::prime`] and [`MediaCache::revalidate`] are kept within the
/// warm limits of [`BlobConfig`], least recently warmed evicted first.
#[derive(Clone)]
pub struct MediaCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    fetcher: Arc<dyn CrossOriginFetch>,
    mode: FetchMode,
    max_warm_entries: usize,
    max_warm_bytes: u64,
    entries: Mutex<HashMap<String, Entry>>,
    generation: AtomicU64,
    warm_clock: AtomicU64,
    degraded: watch::Sender<bool>,
    fetches: AtomicU64,
    hits: AtomicU64,
    coalesced: AtomicU64,
    revocations: AtomicU64,
    evictions: AtomicU64,
}

/// One acquirer's claim on a pending fetch. Dropped unclaimed (the caller
/// stopped waiting), it hands its share back to the entry.
struct Waiter {
    cache: MediaCache,
    key: String,
    generation: u64,
    claimed: bool,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if !self.claimed {
            self.cache.abandon(&self.key, self.generation);
        }
    }
}

impl MediaCache {
    pub fn new(fetcher: Arc<dyn CrossOriginFetch>) -> Self {
        Self::from_config(fetcher, &BlobConfig::default())
    }

    pub fn with_mode(fetcher: Arc<dyn CrossOriginFetch>, mode: FetchMode) -> Self {
        Self::from_config(fetcher, &BlobConfig::default().with_fetch_mode(mode))
    }

    /// Fetch mode and warm limits taken from `config`
    pub fn from_config(fetcher: Arc<dyn CrossOriginFetch>, config: &BlobConfig) -> Self {
        let (degraded, _) = watch::channel(false);
        Self {
            inner: Arc::new(CacheInner {
                fetcher,
                mode: config.fetch_mode,
                max_warm_entries: config.max_warm_entries,
                max_warm_bytes: config.max_warm_bytes,
                entries: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                warm_clock: AtomicU64::new(0),
                degraded,
                fetches: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
                revocations: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }),
        }
    }

    /// Take a reference to the media at `key`, fetching it if needed.
    ///
    /// Each successful acquire must be paired with one [`MediaCache::release`].
    /// Dropping the future before it resolves gives its reference back.
    #[instrument(skip(self))]
    pub async fn acquire(&self, key: &str) -> CacheResult<MediaHandle> {
        loop {
            let (fetch, generation) = {
                let mut entries = self.inner.entries.lock();
                match entries.get_mut(key) {
                    Some(Entry::Ready { handle, refs, .. }) => {
                        *refs += 1;
                        self.inner.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(handle.clone());
                    }
                    Some(Entry::Degraded { .. }) => {
                        debug!("Entry degraded, not refetching until revalidated");
                        return Err(CacheError::degraded(key));
                    }
                    Some(Entry::Pending {
                        fetch,
                        generation,
                        waiters,
                        ..
                    }) => {
                        *waiters += 1;
                        self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                        (fetch.clone(), *generation)
                    }
                    None => self.start_fetch(&mut entries, key, 1, false),
                }
            };

            let mut waiter = Waiter {
                cache: self.clone(),
                key: key.to_string(),
                generation,
                claimed: false,
            };
            let fetched = fetch.await;
            waiter.claimed = true;

            let mut entries = self.inner.entries.lock();
            match (entries.get(key), fetched) {
                // The settled fetch already counted this waiter as a reference
                (Some(Entry::Ready { handle, generation: g, .. }), _) if *g == generation => {
                    return Ok(handle.clone());
                }
                (Some(Entry::Degraded { error }), _) => return Err(error.clone()),
                // Released, superseded or cleared while this caller was waiting
                (_, Ok(_)) => continue,
                (_, Err(error)) => return Err(error),
            }
        }
    }

    /// Drop one reference. The last release revokes the handle and evicts
    /// the entry; releasing an unknown or unreferenced key does nothing.
    pub fn release(&self, key: &str) {
        let mut entries = self.inner.entries.lock();
        let last = match entries.get_mut(key) {
            Some(Entry::Ready { refs, .. }) if *refs > 0 => {
                *refs -= 1;
                *refs == 0
            }
            _ => {
                debug!(key, "Release without a live reference ignored");
                return;
            }
        };

        if last {
            if let Some(Entry::Ready { handle, .. }) = entries.remove(key) {
                self.revoke(&handle);
                debug!(key, "Last reference released, handle revoked");
            }
        }
    }

    /// Retry a degraded entry. Entries in any other state are left alone.
    #[instrument(skip(self))]
    pub async fn revalidate(&self, key: &str) -> CacheResult<()> {
        let fetch = {
            let mut entries = self.inner.entries.lock();
            if !matches!(entries.get(key), Some(Entry::Degraded { .. })) {
                return Ok(());
            }
            entries.remove(key);
            let (fetch, _) = self.start_fetch(&mut entries, key, 0, true);
            self.refresh_degraded(&entries);
            fetch
        };

        fetch.await.map(|_| ())
    }

    /// Retry every degraded entry concurrently; returns how many recovered
    pub async fn revalidate_degraded(&self) -> usize {
        let keys = self.degraded_keys();
        if keys.is_empty() {
            return 0;
        }

        info!(count = keys.len(), "Revalidating degraded media");
        let results = futures::future::join_all(keys.iter().map(|key| self.revalidate(key))).await;
        let recovered = results.iter().filter(|r| r.is_ok()).count();
        if recovered < keys.len() {
            warn!(recovered, failed = keys.len() - recovered, "Some media still unavailable");
        }
        recovered
    }

    /// Install bytes that are already local (e.g. just uploaded) as a warm
    /// entry. An existing ready or in-flight entry wins; a degraded one is
    /// replaced.
    pub fn prime(&self, key: &str, bytes: Bytes, content_type: Option<String>) {
        let mut entries = self.inner.entries.lock();
        if matches!(entries.get(key), Some(Entry::Ready { .. }) | Some(Entry::Pending { .. })) {
            return;
        }
        entries.insert(
            key.to_string(),
            Entry::Ready {
                handle: MediaHandle::new(key, bytes, content_type),
                refs: 0,
                generation: self.next_generation(),
                warmed: self.next_warm_tick(),
            },
        );
        self.enforce_warm_limits(&mut entries);
        self.refresh_degraded(&entries);
        debug!(key, "Cache primed");
    }

    /// True while any entry is degraded
    pub fn is_degraded(&self) -> bool {
        *self.inner.degraded.borrow()
    }

    /// Watch the cache-wide degraded flag
    pub fn subscribe_degraded(&self) -> watch::Receiver<bool> {
        self.inner.degraded.subscribe()
    }

    pub fn degraded_keys(&self) -> Vec<String> {
        let entries = self.inner.entries.lock();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Degraded { .. }))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Current reference count for `key`, zero if not ready
    pub fn ref_count(&self, key: &str) -> usize {
        match self.inner.entries.lock().get(key) {
            Some(Entry::Ready { refs, .. }) => *refs,
            _ => 0,
        }
    }

    /// True if `key` has a ready entry, referenced or warm
    pub fn contains(&self, key: &str) -> bool {
        matches!(self.inner.entries.lock().get(key), Some(Entry::Ready { .. }))
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.inner.entries.lock();
        CacheStats {
            fetches: self.inner.fetches.load(Ordering::Relaxed),
            hits: self.inner.hits.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            revocations: self.inner.revocations.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            entries: entries.len(),
            warm: entries
                .values()
                .filter(|entry| matches!(entry, Entry::Ready { refs: 0, .. }))
                .count(),
            degraded: entries
                .values()
                .filter(|entry| matches!(entry, Entry::Degraded { .. }))
                .count(),
        }
    }

    /// Revoke every handle and forget every entry
    pub fn clear(&self) {
        let mut entries = self.inner.entries.lock();
        let drained: Vec<Entry> = entries.drain().map(|(_, entry)| entry).collect();
        for entry in drained {
            if let Entry::Ready { handle, .. } = entry {
                self.revoke(&handle);
            }
        }
        self.refresh_degraded(&entries);
        info!("Media cache cleared");
    }

    /// Insert a pending entry and spawn its fetch; the caller holds the lock
    fn start_fetch(
        &self,
        entries: &mut HashMap<String, Entry>,
        key: &str,
        waiters: usize,
        keep_warm: bool,
    ) -> (SharedFetch, u64) {
        let generation = self.next_generation();
        self.inner.fetches.fetch_add(1, Ordering::Relaxed);

        let cache = self.clone();
        let owned_key = key.to_string();
        let task = tokio::spawn(async move { cache.fetch_and_settle(owned_key, generation).await });

        let interrupted_key = key.to_string();
        let fetch = async move {
            match task.await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Interrupted {
                    key: interrupted_key,
                }),
            }
        }
        .boxed()
        .shared();

        entries.insert(
            key.to_string(),
            Entry::Pending {
                generation,
                fetch: fetch.clone(),
                waiters,
                keep_warm,
            },
        );
        (fetch, generation)
    }

    async fn fetch_and_settle(&self, key: String, generation: u64) -> CacheResult<MediaHandle> {
        let fetched = self.inner.fetcher.fetch(&key, self.inner.mode).await;

        let mut entries = self.inner.entries.lock();
        let pending = match entries.get(&key) {
            Some(Entry::Pending {
                generation: g,
                waiters,
                keep_warm,
                ..
            }) if *g == generation => Some((*waiters, *keep_warm)),
            _ => None,
        };

        let result = match fetched {
            Ok(media) => {
                let handle = MediaHandle::new(&key, media.bytes, media.content_type);
                match pending {
                    Some((0, false)) => {
                        entries.remove(&key);
                        self.revoke(&handle);
                        debug!(%key, "Every acquirer gave up, fetched media dropped");
                    }
                    Some((waiters, _)) => {
                        entries.insert(
                            key.clone(),
                            Entry::Ready {
                                handle: handle.clone(),
                                refs: waiters,
                                generation,
                                warmed: self.next_warm_tick(),
                            },
                        );
                        if waiters == 0 {
                            self.enforce_warm_limits(&mut entries);
                        }
                        debug!(%key, refs = waiters, "Media ready");
                    }
                    // Superseded by clear() or prime(); nobody will release it
                    None => self.revoke(&handle),
                }
                Ok(handle)
            }
            Err(error) => {
                let error = CacheError::from(error);
                warn!(%key, %error, "Media fetch failed, entry degraded");
                if pending.is_some() {
                    entries.insert(
                        key.clone(),
                        Entry::Degraded {
                            error: error.clone(),
                        },
                    );
                }
                Err(error)
            }
        };

        self.refresh_degraded(&entries);
        result
    }

    /// Give back the share of an acquirer that stopped waiting
    fn abandon(&self, key: &str, generation: u64) {
        let mut entries = self.inner.entries.lock();
        let last = match entries.get_mut(key) {
            Some(Entry::Pending {
                generation: g,
                waiters,
                ..
            }) if *g == generation => {
                *waiters = waiters.saturating_sub(1);
                false
            }
            // Settled between the wake-up and the drop
            Some(Entry::Ready {
                generation: g,
                refs,
                ..
            }) if *g == generation && *refs > 0 => {
                *refs -= 1;
                *refs == 0
            }
            _ => false,
        };

        if last {
            if let Some(Entry::Ready { handle, .. }) = entries.remove(key) {
                self.revoke(&handle);
                debug!(key, "Abandoned acquire held the last reference, handle revoked");
            }
        }
    }

    /// Evict least recently warmed unreferenced entries until the warm set
    /// fits both limits
    fn enforce_warm_limits(&self, entries: &mut HashMap<String, Entry>) {
        let mut warm: Vec<(u64, String, u64)> = entries
            .iter()
            .filter_map(|(key, entry)| match entry {
                Entry::Ready {
                    handle,
                    refs: 0,
                    warmed,
                    ..
                } => Some((*warmed, key.clone(), handle.size_bytes())),
                _ => None,
            })
            .collect();
        warm.sort();

        let mut count = warm.len();
        let mut bytes: u64 = warm.iter().map(|(_, _, size)| size).sum();
        for (_, key, size) in warm {
            if count <= self.inner.max_warm_entries && bytes <= self.inner.max_warm_bytes {
                break;
            }
            if let Some(Entry::Ready { handle, .. }) = entries.remove(&key) {
                self.revoke(&handle);
                self.inner.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(%key, "Warm entry evicted");
            }
            count -= 1;
            bytes -= size;
        }
    }

    fn next_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_warm_tick(&self) -> u64 {
        self.inner.warm_clock.fetch_add(1, Ordering::Relaxed)
    }

    fn revoke(&self, handle: &MediaHandle) {
        if handle.revoke() {
            self.inner.revocations.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn refresh_degraded(&self, entries: &HashMap<String, Entry>) {
        let degraded = entries
            .values()
            .any(|entry| matches!(entry, Entry::Degraded { .. }));
        self.inner.degraded.send_if_modified(|flag| {
            if *flag == degraded {
                return false;
            }
            *flag = degraded;
            true
        });
    }
}

impl PartialEq for MediaHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for MediaHandle {}
