//! Integration Tests for the Cache Manager
//!
//! Drives the public facade end to end against a temporary disk tier.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use unified_cache::cache::{FixedMemoryProbe, ManualClock, STATISTICS_FILE};
use unified_cache::{CacheBudget, CacheCategory, CacheManager, Config};

const START: u64 = 1_700_000_000_000;
const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PrayerDay {
    fajr: String,
    maghrib: String,
}

// == Helper Functions ==

async fn open_at(dir: &TempDir, clock: Arc<ManualClock>) -> CacheManager {
    CacheManager::open_with(
        &Config::with_cache_dir(dir.path()),
        clock,
        &FixedMemoryProbe(8 * GIB),
    )
    .await
    .unwrap()
}

async fn open(dir: &TempDir) -> (CacheManager, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    (open_at(dir, clock.clone()).await, clock)
}

fn mecca() -> PrayerDay {
    PrayerDay {
        fajr: "05:12".to_string(),
        maghrib: "18:41".to_string(),
    }
}

// == Store / Retrieve ==

#[tokio::test]
async fn test_store_then_retrieve_every_category() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;

    for category in CacheCategory::ALL {
        manager.store(mecca(), "today", category, None).await;
    }
    for category in CacheCategory::ALL {
        let value: Option<PrayerDay> = manager.retrieve(category, "today").await;
        assert_eq!(value, Some(mecca()), "category {category}");
    }

    let stats = manager.statistics().await;
    assert_eq!(stats.total_hits, CacheCategory::ALL.len() as u64);
    assert_eq!(stats.total_misses, 0);
    assert_eq!(stats.hit_rate(), 1.0);
}

#[tokio::test]
async fn test_same_key_in_different_categories_is_distinct() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;

    manager.store(21.5f64, "home", CacheCategory::QiblaDirections, None).await;
    manager.store("Cairo", "home", CacheCategory::LocationData, None).await;

    let bearing: Option<f64> = manager.retrieve(CacheCategory::QiblaDirections, "home").await;
    let city: Option<String> = manager.retrieve(CacheCategory::LocationData, "home").await;
    assert_eq!(bearing, Some(21.5));
    assert_eq!(city.as_deref(), Some("Cairo"));
}

#[tokio::test]
async fn test_retrieve_absent_is_a_miss_not_an_error() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;

    let value: Option<String> = manager.retrieve(CacheCategory::CalendarEvents, "ramadan").await;
    assert!(value.is_none());

    let stats = manager.statistics().await;
    assert_eq!(stats.total_misses, 1);
    assert_eq!(stats.category(CacheCategory::CalendarEvents).misses, 1);
    assert_eq!(stats.hit_rate(), 0.0);
}

#[tokio::test]
async fn test_retrieve_with_wrong_shape_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;

    manager.store("not a prayer day", "k", CacheCategory::PrayerTimes, None).await;
    let value: Option<PrayerDay> = manager.retrieve(CacheCategory::PrayerTimes, "k").await;

    assert!(value.is_none());
    let stats = manager.statistics().await;
    assert_eq!(stats.total_hits, 0);
    assert_eq!(stats.total_misses, 1);
    assert_eq!(stats.total_size_bytes, 0);
    assert!(!manager.contains(CacheCategory::PrayerTimes, "k").await);
}

#[tokio::test]
async fn test_unserializable_payload_is_dropped() {
    use std::collections::HashMap;

    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;

    // JSON object keys must be strings
    let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
    bad.insert((1, 2), 3);
    manager.store(bad, "bad", CacheCategory::TemporaryData, None).await;

    assert_eq!(manager.entry_count().await, 0);
    assert!(!manager.contains(CacheCategory::TemporaryData, "bad").await);
}

#[tokio::test]
async fn test_overwrite_replaces_entry() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;

    manager.store(1u32, "k", CacheCategory::UserPreferences, None).await;
    manager.store(2u32, "k", CacheCategory::UserPreferences, None).await;

    let value: Option<u32> = manager.retrieve(CacheCategory::UserPreferences, "k").await;
    assert_eq!(value, Some(2));
    assert_eq!(manager.entry_count().await, 1);
    assert_eq!(manager.size_bytes().await, 1);
}

// == Expiry ==

#[tokio::test]
async fn test_expired_entry_is_removed_on_retrieve() {
    let dir = TempDir::new().unwrap();
    let (manager, clock) = open(&dir).await;

    let big = "x".repeat(3_000);
    manager
        .store(big, "track", CacheCategory::TrackingHistory, Some(Duration::from_secs(60)))
        .await;
    assert!(manager.is_persisted(CacheCategory::TrackingHistory, "track").await);

    clock.advance(Duration::from_secs(60));
    assert!(manager.contains(CacheCategory::TrackingHistory, "track").await);

    clock.advance(Duration::from_millis(1));
    assert!(!manager.contains(CacheCategory::TrackingHistory, "track").await);
    let value: Option<String> = manager.retrieve(CacheCategory::TrackingHistory, "track").await;
    assert!(value.is_none());

    let stats = manager.statistics().await;
    assert_eq!(stats.total_evictions, 1);
    assert_eq!(stats.total_misses, 1);
    assert_eq!(stats.total_size_bytes, 0);
    let blobs = std::fs::read_dir(dir.path().join("trackingHistory")).unwrap().count();
    assert_eq!(blobs, 0);
}

#[tokio::test]
async fn test_contains_does_not_touch_statistics() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;

    manager.store(true, "k", CacheCategory::UserPreferences, None).await;
    assert!(manager.contains(CacheCategory::UserPreferences, "k").await);
    assert!(!manager.contains(CacheCategory::UserPreferences, "other").await);

    let stats = manager.statistics().await;
    assert_eq!(stats.total_hits + stats.total_misses, 0);
}

// == Remove / Clear ==

#[tokio::test]
async fn test_remove_absent_key_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;

    manager.store(1u8, "k", CacheCategory::LocationData, None).await;
    assert!(manager.remove(CacheCategory::LocationData, "k").await);
    let after_first = manager.statistics().await;

    assert!(!manager.remove(CacheCategory::LocationData, "k").await);
    assert!(!manager.remove(CacheCategory::LocationData, "never").await);

    let after_more = manager.statistics().await;
    assert_eq!(after_first, after_more);
    assert_eq!(after_more.total_evictions, 1);
}

#[tokio::test]
async fn test_clear_category_resets_bucket() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;

    manager.store("a", "1", CacheCategory::IslamicContent, None).await;
    manager.store("b", "2", CacheCategory::IslamicContent, None).await;
    manager.store("c", "3", CacheCategory::MagneticDeclination, None).await;
    let _: Option<String> = manager.retrieve(CacheCategory::IslamicContent, "1").await;

    assert_eq!(manager.clear(CacheCategory::IslamicContent).await, 2);

    let stats = manager.statistics().await;
    assert_eq!(stats.category(CacheCategory::IslamicContent).hits, 0);
    assert_eq!(stats.category(CacheCategory::IslamicContent).current_size, 0);
    assert_eq!(stats.total_size_bytes, 3);
    assert!(manager.contains(CacheCategory::MagneticDeclination, "3").await);
}

#[tokio::test]
async fn test_clear_all_resets_everything() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;

    manager.store("x".repeat(2_000), "big", CacheCategory::ApiResponses, None).await;
    manager.store(1u8, "small", CacheCategory::PrayerTimes, None).await;
    let _: Option<u8> = manager.retrieve(CacheCategory::PrayerTimes, "small").await;

    assert_eq!(manager.clear_all().await, 2);
    assert_eq!(manager.entry_count().await, 0);
    assert_eq!(manager.statistics().await, Default::default());
}

// == Preload ==

#[tokio::test]
async fn test_preload_stores_every_pair() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;

    let keys = vec!["jan".to_string(), "feb".to_string()];
    manager.preload(vec![31u8, 28u8], keys, CacheCategory::CalendarEvents).await;

    let feb: Option<u8> = manager.retrieve(CacheCategory::CalendarEvents, "feb").await;
    assert_eq!(feb, Some(28));
    assert_eq!(manager.entry_count().await, 2);
}

#[tokio::test]
async fn test_preload_length_mismatch_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;

    let keys = vec!["jan".to_string()];
    manager.preload(vec![31u8, 28u8], keys, CacheCategory::CalendarEvents).await;

    assert_eq!(manager.entry_count().await, 0);
}

// == Eviction ==

#[tokio::test]
async fn test_lru_evicts_least_recently_accessed() {
    let dir = TempDir::new().unwrap();
    let (manager, clock) = open(&dir).await;
    let cat = CacheCategory::QiblaDirections;

    for key in ["a", "b", "c"] {
        manager.store(key, key, cat, None).await;
        clock.advance(Duration::from_millis(10));
    }
    let _: Option<String> = manager.retrieve(cat, "a").await;

    let budget = manager.budget().await;
    let evicted = manager
        .set_budget(CacheBudget::new(budget.max_memory_bytes, 2))
        .await;

    assert_eq!(evicted, 1);
    assert!(manager.contains(cat, "a").await);
    assert!(!manager.contains(cat, "b").await);
    assert!(manager.contains(cat, "c").await);
}

#[tokio::test]
async fn test_max_entries_two_evicts_first_stored() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;
    manager.set_budget(CacheBudget::new(1 << 20, 2)).await;
    let cat = CacheCategory::ApiResponses;

    manager.store("v1", "k1", cat, None).await;
    manager.store("v2", "k2", cat, None).await;
    manager.store("v3", "k3", cat, None).await;

    let k1: Option<String> = manager.retrieve(cat, "k1").await;
    let k2: Option<String> = manager.retrieve(cat, "k2").await;
    let k3: Option<String> = manager.retrieve(cat, "k3").await;
    assert!(k1.is_none());
    assert_eq!(k2.as_deref(), Some("v2"));
    assert_eq!(k3.as_deref(), Some("v3"));
    assert_eq!(manager.statistics().await.category(cat).evictions, 1);
}

#[tokio::test]
async fn test_size_accounting_matches_live_entries() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;
    manager.set_budget(CacheBudget::new(5_000, 100)).await;
    let cat = CacheCategory::TrackingHistory;

    // Serialized as a JSON string: two quote bytes plus the content
    manager.store("a".repeat(1_998), "a", cat, None).await;
    manager.store("b".repeat(1_998), "b", cat, None).await;
    manager.store("c".repeat(98), "c", cat, None).await;
    assert_eq!(manager.size_bytes().await, 4_100);

    manager.store("d".repeat(1_998), "d", cat, None).await;
    // 6_100 > 5_000: dropping the oldest (2_000) is enough
    assert_eq!(manager.size_bytes().await, 4_100);
    assert!(!manager.contains(cat, "a").await);

    manager.remove(cat, "c").await;
    assert_eq!(manager.size_bytes().await, 4_000);
    assert_eq!(manager.statistics().await.category(cat).current_size, 4_000);
}

// == Memory Pressure ==

#[tokio::test]
async fn test_memory_pressure_empties_low_priority_buckets() {
    let dir = TempDir::new().unwrap();
    let (manager, clock) = open(&dir).await;

    manager.store("older", "qibla", CacheCategory::QiblaDirections, None).await;
    clock.advance(Duration::from_secs(1));
    manager.store("scratch", "t1", CacheCategory::TemporaryData, None).await;
    manager.store("x".repeat(2_000), "api", CacheCategory::ApiResponses, None).await;

    manager.handle_memory_pressure().await;

    let stats = manager.statistics().await;
    assert_eq!(stats.category(CacheCategory::TemporaryData).current_size, 0);
    assert_eq!(stats.category(CacheCategory::ApiResponses).current_size, 0);
    assert!(!manager.contains(CacheCategory::TemporaryData, "t1").await);
    assert!(!manager.contains(CacheCategory::ApiResponses, "api").await);
    // Older, but higher priority
    assert!(manager.contains(CacheCategory::QiblaDirections, "qibla").await);
    assert!(manager.is_under_pressure());

    clock.advance(Duration::from_secs(31));
    assert!(!manager.is_under_pressure());
}

// == Disk Tier ==

#[tokio::test]
async fn test_only_large_entries_survive_memory_flush() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;
    let cat = CacheCategory::LocationData;

    // 2 serialized bytes vs. 2_000 serialized bytes
    manager.store(42u8, "small", cat, None).await;
    manager.store("x".repeat(1_998), "large", cat, None).await;
    assert!(!manager.is_persisted(cat, "small").await);
    assert!(manager.is_persisted(cat, "large").await);

    manager.flush_memory_tier().await;

    let small: Option<u8> = manager.retrieve(cat, "small").await;
    let large: Option<String> = manager.retrieve(cat, "large").await;
    assert!(small.is_none());
    assert_eq!(large.map(|s| s.len()), Some(1_998));
}

#[tokio::test]
async fn test_disk_threshold_is_exclusive() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;
    let cat = CacheCategory::IslamicContent;

    // JSON strings serialize with two quote bytes
    manager.store("a".repeat(1_022), "at_threshold", cat, None).await;
    manager.store("b".repeat(1_023), "over_threshold", cat, None).await;
    assert_eq!(manager.statistics().await.category(cat).current_size, 1_024 + 1_025);
    assert!(!manager.is_persisted(cat, "at_threshold").await);
    assert!(manager.is_persisted(cat, "over_threshold").await);

    manager.flush_memory_tier().await;

    let at: Option<String> = manager.retrieve(cat, "at_threshold").await;
    let over: Option<String> = manager.retrieve(cat, "over_threshold").await;
    assert!(at.is_none());
    assert_eq!(over.map(|s| s.len()), Some(1_023));
}

#[tokio::test]
async fn test_disk_tier_survives_restart() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    {
        let manager = open_at(&dir, clock.clone()).await;
        manager.store(mecca(), "mecca", CacheCategory::PrayerTimes, None).await;
        manager
            .store(vec![0u16; 600], "route", CacheCategory::TrackingHistory, None)
            .await;
        let _: Option<Vec<u16>> = manager.retrieve(CacheCategory::TrackingHistory, "route").await;
        manager.shutdown().await;
    }
    assert!(dir.path().join(STATISTICS_FILE).exists());

    let manager = open_at(&dir, clock).await;
    assert_eq!(manager.entry_count().await, 1);
    assert_eq!(manager.statistics().await.total_hits, 1);

    let route: Option<Vec<u16>> = manager.retrieve(CacheCategory::TrackingHistory, "route").await;
    assert_eq!(route.map(|r| r.len()), Some(600));
    let day: Option<PrayerDay> = manager.retrieve(CacheCategory::PrayerTimes, "mecca").await;
    assert!(day.is_none());
}

#[tokio::test]
async fn test_corrupt_blob_is_treated_as_miss_and_deleted() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;
    let cat = CacheCategory::MagneticDeclination;

    manager.store("y".repeat(2_000), "grid", cat, None).await;
    manager.flush_memory_tier().await;

    let blob = dir
        .path()
        .join(cat.as_str())
        .join(cat.qualify("grid"));
    std::fs::write(&blob, b"\x00\x01 definitely not an entry").unwrap();

    let value: Option<String> = manager.retrieve(cat, "grid").await;
    assert!(value.is_none());
    assert!(!blob.exists());
    assert_eq!(manager.size_bytes().await, 0);
    assert_eq!(manager.statistics().await.total_misses, 1);
}

#[tokio::test]
async fn test_deleting_cache_directory_self_heals() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;
    let cat = CacheCategory::ApiResponses;

    manager.store("z".repeat(2_000), "feed", cat, None).await;
    manager.flush_memory_tier().await;
    std::fs::remove_dir_all(dir.path().join(cat.as_str())).unwrap();

    let value: Option<String> = manager.retrieve(cat, "feed").await;
    assert!(value.is_none());
    assert_eq!(manager.entry_count().await, 0);

    // Writes recreate the directory
    manager.store("z".repeat(2_000), "feed", cat, None).await;
    assert!(manager.is_persisted(cat, "feed").await);
}

// == Concurrency ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_and_writers() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = open(&dir).await;
    let cat = CacheCategory::TrackingHistory;

    let mut handles = Vec::new();
    for worker in 0..8u32 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let mut hits = 0u64;
            for i in 0..25u32 {
                let key = format!("k{}", i % 10);
                if (worker + i) % 3 == 0 {
                    manager.store(worker * 100 + i, key, cat, None).await;
                } else if manager.retrieve::<u32>(cat, &key).await.is_some() {
                    hits += 1;
                }
            }
            hits
        }));
    }

    let mut hits = 0;
    for handle in handles {
        hits += handle.await.unwrap();
    }

    let stats = manager.statistics().await;
    assert_eq!(stats.total_hits, hits);
    assert!(manager.entry_count().await <= 10);
    assert_eq!(
        stats.total_size_bytes,
        stats.category(cat).current_size
    );
}
