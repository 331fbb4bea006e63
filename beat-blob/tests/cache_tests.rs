use std::sync::Arc;
use std::time::Duration;

use beat_blob::memory::MemoryFetcher;
use beat_blob::{BlobConfig, CacheError, FetchError, FetchMode, MediaCache};
use tokio_test::{assert_err, assert_ok};

const BEAT: &str = "beat-42";

/// Test factory functions
fn create_cache(fetcher: &MemoryFetcher) -> MediaCache {
    MediaCache::new(Arc::new(fetcher.clone()))
}

fn fetcher_with_beat() -> MemoryFetcher {
    let fetcher = MemoryFetcher::new().with_delay(Duration::from_millis(50));
    fetcher.insert(BEAT, vec![1u8; 2048], Some("audio/mpeg"));
    fetcher
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_acquires_share_one_fetch() {
    let fetcher = fetcher_with_beat();
    let cache = create_cache(&fetcher);

    let (first, second) = tokio::join!(cache.acquire(BEAT), cache.acquire(BEAT));
    let first = assert_ok!(first);
    let second = assert_ok!(second);

    assert_eq!(fetcher.calls(BEAT), 1);
    assert_eq!(first, second);
    assert_eq!(first.url(), second.url());
    assert_eq!(cache.ref_count(BEAT), 2);

    let stats = cache.stats();
    assert_eq!(stats.fetches, 1);
    assert_eq!(stats.coalesced, 1);
}

#[tokio::test(start_paused = true)]
async fn test_ready_entry_is_served_without_network() {
    let fetcher = fetcher_with_beat();
    let cache = create_cache(&fetcher);

    let handle = assert_ok!(cache.acquire(BEAT).await);
    let again = assert_ok!(cache.acquire(BEAT).await);

    assert_eq!(handle, again);
    assert_eq!(fetcher.calls(BEAT), 1);
    assert_eq!(cache.stats().hits, 1);
    assert_eq!(handle.bytes().map(|b| b.len()), Some(2048));
    assert_eq!(handle.content_type(), Some("audio/mpeg"));
}

#[tokio::test(start_paused = true)]
async fn test_handle_is_revoked_exactly_once_on_last_release() {
    let fetcher = fetcher_with_beat();
    let cache = create_cache(&fetcher);

    let handle = assert_ok!(cache.acquire(BEAT).await);
    assert_ok!(cache.acquire(BEAT).await);

    cache.release(BEAT);
    assert!(!handle.is_revoked());
    assert_eq!(cache.ref_count(BEAT), 1);

    cache.release(BEAT);
    assert!(handle.is_revoked());
    assert!(handle.bytes().is_none());
    assert_eq!(cache.ref_count(BEAT), 0);

    cache.release(BEAT);
    cache.release("never-acquired");
    assert_eq!(cache.stats().revocations, 1);
    assert_eq!(cache.stats().entries, 0);

    // A fresh cycle fetches and materializes a new handle
    let fresh = assert_ok!(cache.acquire(BEAT).await);
    assert_ne!(fresh, handle);
    assert!(!fresh.is_revoked());
    assert_eq!(fetcher.calls(BEAT), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_degrades_entry_and_cache() {
    let fetcher = fetcher_with_beat();
    fetcher.deny_cross_origin(BEAT);
    let cache = create_cache(&fetcher);
    let degraded = cache.subscribe_degraded();

    let (first, second) = tokio::join!(cache.acquire(BEAT), cache.acquire(BEAT));
    let expected = CacheError::Fetch(FetchError::CrossOrigin { url: BEAT.to_string() });
    assert_eq!(first.unwrap_err(), expected);
    assert_eq!(second.unwrap_err(), expected);
    assert_eq!(fetcher.calls(BEAT), 1);

    assert!(cache.is_degraded());
    assert!(*degraded.borrow());
    assert_eq!(cache.degraded_keys(), vec![BEAT.to_string()]);
    assert_eq!(cache.ref_count(BEAT), 0);

    // Degraded entries are not refetched by acquire
    assert_eq!(cache.acquire(BEAT).await.unwrap_err(), CacheError::degraded(BEAT));
    assert_eq!(fetcher.calls(BEAT), 1);
}

#[tokio::test(start_paused = true)]
async fn test_revalidate_recovers_degraded_entries_only() {
    let fetcher = fetcher_with_beat();
    fetcher.insert("beat-7", vec![2u8; 16], None);
    let cache = create_cache(&fetcher);

    assert_ok!(cache.acquire("beat-7").await);
    fetcher.set_offline(true);
    assert_err!(cache.acquire(BEAT).await);
    assert!(cache.is_degraded());

    assert_err!(cache.revalidate(BEAT).await);
    assert!(cache.is_degraded());

    fetcher.set_offline(false);
    assert_eq!(cache.revalidate_degraded().await, 1);
    assert!(!cache.is_degraded());
    assert!(cache.degraded_keys().is_empty());

    // Ready entries were untouched, the recovered one is warm
    assert_eq!(fetcher.calls("beat-7"), 1);
    assert_eq!(cache.ref_count(BEAT), 0);
    assert_ok!(cache.acquire(BEAT).await);
    assert_eq!(fetcher.calls(BEAT), 3);
}

#[tokio::test(start_paused = true)]
async fn test_prime_installs_warm_entry_and_replaces_degraded() {
    let fetcher = MemoryFetcher::new();
    let cache = create_cache(&fetcher);

    fetcher.fail_next(FetchError::network("Failed to fetch"));
    assert_err!(cache.acquire(BEAT).await);
    assert!(cache.is_degraded());

    cache.prime(BEAT, vec![9u8; 64].into(), Some("audio/wav".into()));
    assert!(!cache.is_degraded());

    let handle = assert_ok!(cache.acquire(BEAT).await);
    assert_eq!(handle.size_bytes(), 64);
    assert_eq!(fetcher.calls(BEAT), 1);
}

#[tokio::test(start_paused = true)]
async fn test_clear_revokes_everything() {
    let fetcher = fetcher_with_beat();
    fetcher.insert("beat-7", vec![2u8; 16], None);
    let cache = create_cache(&fetcher);

    let a = assert_ok!(cache.acquire(BEAT).await);
    let b = assert_ok!(cache.acquire("beat-7").await);

    cache.clear();

    assert!(a.is_revoked() && b.is_revoked());
    assert_eq!(cache.stats().entries, 0);
    assert_eq!(cache.stats().revocations, 2);
    cache.release(BEAT);
    assert_eq!(cache.stats().revocations, 2);
}

#[tokio::test(start_paused = true)]
async fn test_same_origin_mode_skips_cross_origin_check() {
    let fetcher = fetcher_with_beat();
    fetcher.deny_cross_origin(BEAT);
    let cache = MediaCache::with_mode(Arc::new(fetcher.clone()), FetchMode::SameOrigin);

    assert_ok!(cache.acquire(BEAT).await);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_acquire_releases_fetched_media() {
    let fetcher = fetcher_with_beat();
    let cache = create_cache(&fetcher);

    let gave_up = tokio::time::timeout(Duration::from_millis(10), cache.acquire(BEAT)).await;
    assert!(gave_up.is_err());

    // Let the spawned fetch settle with nobody waiting
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(fetcher.calls(BEAT), 1);
    assert_eq!(cache.ref_count(BEAT), 0);
    let stats = cache.stats();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.revocations, 1);

    // The next acquire starts over with a live handle
    let handle = assert_ok!(cache.acquire(BEAT).await);
    assert!(!handle.is_revoked());
    assert_eq!(cache.ref_count(BEAT), 1);
    assert_eq!(fetcher.calls(BEAT), 2);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_waiter_does_not_hold_a_coalesced_reference() {
    let fetcher = fetcher_with_beat();
    let cache = create_cache(&fetcher);

    let patient = tokio::spawn({
        let cache = cache.clone();
        async move { cache.acquire(BEAT).await }
    });
    tokio::task::yield_now().await;

    let gave_up = tokio::time::timeout(Duration::from_millis(10), cache.acquire(BEAT)).await;
    assert!(gave_up.is_err());

    let handle = assert_ok!(assert_ok!(patient.await));
    assert_eq!(fetcher.calls(BEAT), 1);
    assert_eq!(cache.ref_count(BEAT), 1);

    cache.release(BEAT);
    assert!(handle.is_revoked());
    assert_eq!(cache.stats().entries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_warm_entries_stay_within_limits() {
    let fetcher = MemoryFetcher::new();
    let config = BlobConfig::default().with_warm_limits(4, 64 * 1024 * 1024);
    let cache = MediaCache::from_config(Arc::new(fetcher.clone()), &config);

    for i in 0..100 {
        cache.prime(&format!("upload-{i}"), vec![0u8; 1024 * 1024].into(), None);
    }

    let stats = cache.stats();
    assert_eq!(stats.warm, 4);
    assert_eq!(stats.entries, 4);
    assert_eq!(stats.evictions, 96);
    assert_eq!(stats.revocations, 96);

    // Newest survive, oldest went first
    assert!(cache.contains("upload-99"));
    assert!(cache.contains("upload-96"));
    assert!(!cache.contains("upload-95"));
    assert!(!cache.contains("upload-0"));
}

#[tokio::test(start_paused = true)]
async fn test_warm_byte_budget_spares_referenced_entries() {
    let fetcher = MemoryFetcher::new();
    let config = BlobConfig::default().with_warm_limits(8, 3 * 1024);
    let cache = MediaCache::from_config(Arc::new(fetcher.clone()), &config);

    cache.prime("held", vec![0u8; 2048].into(), None);
    let held = assert_ok!(cache.acquire("held").await);

    cache.prime("a", vec![0u8; 2048].into(), None);
    cache.prime("b", vec![0u8; 2048].into(), None);

    // Only one 2 KiB warm entry fits the budget; the referenced one is not counted
    assert!(cache.contains("held"));
    assert!(!held.is_revoked());
    assert!(!cache.contains("a"));
    assert!(cache.contains("b"));
    assert_eq!(cache.stats().warm, 1);
    assert_eq!(cache.stats().evictions, 1);
}
