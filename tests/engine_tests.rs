//! Tests for Engine
//!
//! These tests verify:
//! - Basic get/upsert/remove operations
//! - Tombstones and TTLs across memtables, SSTables and compaction
//! - Range reads over many generations
//! - Restart: generation numbering and crash leftovers
//! - Engine lifecycle (close, writes after close)
//! - Concurrent access patterns

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use ringkv::storage::sstable::SsTableBuilder;
use ringkv::value::{Cell, Value};
use ringkv::{Config, Engine, RingError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_engine(dir: &TempDir, memtable_size_limit: usize) -> Engine {
    let config = Config::builder()
        .data_dir(dir.path())
        .memtable_size_limit(memtable_size_limit)
        .build();
    Engine::open(config).unwrap()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(&temp_dir, 1024 * 1024);
    (temp_dir, engine)
}

fn get_str(engine: &Engine, key: &str) -> Option<String> {
    engine
        .get(key.as_bytes())
        .unwrap()
        .map(|v| String::from_utf8(v.to_vec()).unwrap())
}

fn collect_range(engine: &Engine, from: &[u8], to: Option<&[u8]>) -> Vec<(Bytes, Bytes)> {
    engine.range(from, to).unwrap().collect()
}

fn table_files(engine: &Engine) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(engine.storage_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn wait_for_flushes(engine: &Engine) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while engine.pending_flushes() > 0 {
        assert!(Instant::now() < deadline, "flushes did not finish");
        thread::sleep(Duration::from_millis(5));
    }
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("nested").join("data");
    let engine = Engine::open_path(&data_dir).unwrap();

    assert!(data_dir.exists());
    assert!(engine.storage_dir().exists());
    assert_eq!(engine.sstable_count(), 0);
}

#[test]
fn test_engine_upsert_get_remove() {
    let (_dir, engine) = setup_temp_engine();

    assert_eq!(get_str(&engine, "key"), None);
    engine.upsert(b"key", b"value").unwrap();
    assert_eq!(get_str(&engine, "key"), Some("value".to_string()));

    engine.upsert(b"key", b"value2").unwrap();
    assert_eq!(get_str(&engine, "key"), Some("value2".to_string()));

    engine.remove(b"key").unwrap();
    assert_eq!(get_str(&engine, "key"), None);
    assert!(engine.latest(b"key").unwrap().unwrap().is_tombstone());

    // Removing a key that never existed is fine
    engine.remove(b"never").unwrap();
    assert_eq!(get_str(&engine, "never"), None);
}

#[test]
fn test_engine_empty_and_binary_values() {
    let (_dir, engine) = setup_temp_engine();
    engine.upsert(b"empty", b"").unwrap();
    engine.upsert(&[0u8, 255, 10], &[1u8, 0, 2]).unwrap();

    assert_eq!(engine.get(b"empty").unwrap(), Some(Bytes::new()));
    assert_eq!(
        engine.get(&[0u8, 255, 10]).unwrap(),
        Some(Bytes::from_static(&[1, 0, 2]))
    );

    engine.compact().unwrap();
    assert_eq!(engine.get(b"empty").unwrap(), Some(Bytes::new()));
}

// =============================================================================
// Tombstone / LWW Tests
// =============================================================================

#[test]
fn test_tombstone_shadows_flushed_value() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open_engine(&temp_dir, 1024 * 1024);
        engine.upsert(b"key", b"value").unwrap();
        engine.close().unwrap();
    }

    let engine = open_engine(&temp_dir, 1024 * 1024);
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(get_str(&engine, "key"), Some("value".to_string()));

    engine.remove(b"key").unwrap();
    assert_eq!(get_str(&engine, "key"), None);
    assert!(collect_range(&engine, b"", None).is_empty());

    // Tombstone in its own table still wins
    engine.close().unwrap();
    let engine = open_engine(&temp_dir, 1024 * 1024);
    assert_eq!(engine.sstable_count(), 2);
    assert_eq!(get_str(&engine, "key"), None);
}

#[test]
fn test_newest_generation_wins_across_tables() {
    let temp_dir = TempDir::new().unwrap();
    for value in ["one", "two", "three"] {
        let engine = open_engine(&temp_dir, 1024 * 1024);
        engine.upsert(b"key", value.as_bytes()).unwrap();
        engine.upsert(value.as_bytes(), b"x").unwrap();
        engine.close().unwrap();
    }

    let engine = open_engine(&temp_dir, 1024 * 1024);
    assert_eq!(engine.sstable_count(), 3);
    assert_eq!(get_str(&engine, "key"), Some("three".to_string()));

    let range = collect_range(&engine, b"", None);
    let keys: Vec<&[u8]> = range.iter().map(|(k, _)| k.as_ref()).collect();
    assert_eq!(keys, vec![&b"key"[..], b"one", b"three", b"two"]);
    assert_eq!(range[0].1, Bytes::from_static(b"three"));
}

// =============================================================================
// TTL Tests
// =============================================================================

#[test]
fn test_ttl_expires_value() {
    let (_dir, engine) = setup_temp_engine();
    engine
        .upsert_with_ttl(b"short", b"v", Duration::from_millis(50))
        .unwrap();
    engine
        .upsert_with_ttl(b"long", b"v", Duration::from_secs(3600))
        .unwrap();

    assert_eq!(get_str(&engine, "short"), Some("v".to_string()));
    thread::sleep(Duration::from_millis(100));

    assert_eq!(get_str(&engine, "short"), None);
    assert_eq!(get_str(&engine, "long"), Some("v".to_string()));
    let keys: Vec<Bytes> = collect_range(&engine, b"", None).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![Bytes::from_static(b"long")]);
}

#[test]
fn test_expired_value_shadows_older_version() {
    let (_dir, engine) = setup_temp_engine();
    engine.upsert(b"key", b"old").unwrap();
    engine.compact().unwrap();

    engine
        .upsert_with_ttl(b"key", b"new", Duration::from_millis(20))
        .unwrap();
    thread::sleep(Duration::from_millis(50));

    assert_eq!(get_str(&engine, "key"), None);
    assert!(collect_range(&engine, b"", None).is_empty());
}

#[test]
fn test_compaction_drops_expired_and_removed() {
    let (_dir, engine) = setup_temp_engine();
    engine.upsert(b"keep", b"v").unwrap();
    engine.upsert(b"gone", b"v").unwrap();
    engine
        .upsert_with_ttl(b"expiring", b"v", Duration::from_millis(20))
        .unwrap();
    engine.remove(b"gone").unwrap();
    thread::sleep(Duration::from_millis(50));

    engine.compact().unwrap();

    assert_eq!(engine.sstable_count(), 1);
    assert!(engine.latest(b"gone").unwrap().is_none());
    assert!(engine.latest(b"expiring").unwrap().is_none());
    assert_eq!(get_str(&engine, "keep"), Some("v".to_string()));
}

#[test]
fn test_ttl_survives_flush() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open_engine(&temp_dir, 1024 * 1024);
        engine
            .upsert_with_ttl(b"key", b"v", Duration::from_millis(300))
            .unwrap();
        engine.close().unwrap();
    }

    let engine = open_engine(&temp_dir, 1024 * 1024);
    let deadline = engine.latest(b"key").unwrap().unwrap().expires_at();
    assert!(deadline.is_some());

    thread::sleep(Duration::from_millis(400));
    assert_eq!(get_str(&engine, "key"), None);
}

#[test]
fn test_set_expiry() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open_engine(&temp_dir, 1024 * 1024);
        engine.upsert(b"flushed", b"on-disk").unwrap();
        engine.upsert(b"removed", b"v").unwrap();
        engine.close().unwrap();
    }

    let engine = open_engine(&temp_dir, 1024 * 1024);
    engine.upsert(b"fresh", b"in-memory").unwrap();
    engine.remove(b"removed").unwrap();

    assert!(engine.set_expiry(b"fresh", Duration::from_millis(50)).unwrap());
    assert!(engine.set_expiry(b"flushed", Duration::from_millis(50)).unwrap());
    assert!(!engine.set_expiry(b"removed", Duration::from_millis(50)).unwrap());
    assert!(!engine.set_expiry(b"missing", Duration::from_millis(50)).unwrap());

    assert_eq!(get_str(&engine, "fresh"), Some("in-memory".to_string()));
    assert_eq!(get_str(&engine, "flushed"), Some("on-disk".to_string()));

    thread::sleep(Duration::from_millis(100));
    assert_eq!(get_str(&engine, "fresh"), None);
    assert_eq!(get_str(&engine, "flushed"), None);
    assert!(!engine.set_expiry(b"fresh", Duration::from_secs(1)).unwrap());
}

// =============================================================================
// Range Tests
// =============================================================================

#[test]
fn test_range_bounds() {
    let (_dir, engine) = setup_temp_engine();
    for key in ["a", "b", "c", "d", "e"] {
        engine.upsert(key.as_bytes(), key.as_bytes()).unwrap();
    }
    engine.remove(b"c").unwrap();

    let keys = |from: &[u8], to: Option<&[u8]>| -> Vec<Bytes> {
        collect_range(&engine, from, to).into_iter().map(|(k, _)| k).collect()
    };

    assert_eq!(keys(&b""[..], None).len(), 4);
    assert_eq!(keys(&b"b"[..], Some(&b"d"[..])), vec![Bytes::from_static(b"b")]);
    assert_eq!(
        keys(&b"b"[..], Some(&b"e"[..])),
        vec![Bytes::from_static(b"b"), Bytes::from_static(b"d")]
    );
    assert_eq!(keys(&b"bb"[..], None).len(), 2);
    assert!(keys(&b"b"[..], Some(&b"b"[..])).is_empty());
    assert!(keys(&b"f"[..], None).is_empty());
}

#[test]
fn test_range_is_snapshot_of_table_set() {
    let (_dir, engine) = setup_temp_engine();
    engine.upsert(b"a", b"1").unwrap();
    engine.upsert(b"b", b"2").unwrap();
    engine.compact().unwrap();
    assert_eq!(engine.sstable_count(), 1);

    let mut range = engine.range(b"", None).unwrap();
    assert_eq!(range.next().unwrap().0, Bytes::from_static(b"a"));

    // Compaction deletes the files the open range is reading from
    engine.compact().unwrap();
    assert_eq!(range.next().unwrap().0, Bytes::from_static(b"b"));
    assert!(range.next().is_none());
}

#[test]
fn test_many_generations_merge() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(&temp_dir, 1024);
    let key = |i: u32| i.to_be_bytes();
    let mut expected: BTreeMap<[u8; 4], u8> = BTreeMap::new();

    for i in 0..2000u32 {
        engine.upsert(&key(i), &[(i % 251) as u8]).unwrap();
        expected.insert(key(i), (i % 251) as u8);
    }
    for i in (0..2000u32).step_by(2) {
        engine.upsert(&key(i), &[7]).unwrap();
        expected.insert(key(i), 7);
    }
    for i in (0..2000u32).step_by(3) {
        engine.remove(&key(i)).unwrap();
        expected.remove(&key(i));
    }
    wait_for_flushes(&engine);
    assert!(engine.sstable_count() > 2, "expected several generations on disk");

    let check = |engine: &Engine| {
        let actual: Vec<(Bytes, Bytes)> = collect_range(engine, b"", None);
        let wanted: Vec<(Bytes, Bytes)> = expected
            .iter()
            .map(|(k, v)| (Bytes::copy_from_slice(k), Bytes::copy_from_slice(&[*v])))
            .collect();
        assert_eq!(actual.len(), wanted.len());
        assert!(actual == wanted, "range differs from expected model");

        for i in (0..2000u32).step_by(97) {
            let got = engine.get(&key(i)).unwrap();
            let want = expected.get(&key(i)).map(|v| Bytes::copy_from_slice(&[*v]));
            assert_eq!(got, want, "key {}", i);
        }
    };

    check(&engine);

    engine.compact().unwrap();
    assert_eq!(engine.sstable_count(), 1);
    check(&engine);

    // Compacting again changes nothing
    engine.compact().unwrap();
    assert_eq!(engine.sstable_count(), 1);
    check(&engine);

    engine.close().unwrap();
    drop(engine);
    let engine = open_engine(&temp_dir, 1024);
    check(&engine);
}

// =============================================================================
// Restart Tests
// =============================================================================

#[test]
fn test_restart_resumes_generations() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open_engine(&temp_dir, 1024 * 1024);
        engine.upsert(b"a", b"1").unwrap();
        engine.close().unwrap();
        assert_eq!(table_files(&engine), vec!["sstable_000001.sst"]);
    }
    {
        let engine = open_engine(&temp_dir, 1024 * 1024);
        engine.upsert(b"b", b"2").unwrap();
        engine.close().unwrap();
        assert_eq!(
            table_files(&engine),
            vec!["sstable_000001.sst", "sstable_000002.sst"]
        );
    }

    let engine = open_engine(&temp_dir, 1024 * 1024);
    engine.compact().unwrap();
    assert_eq!(table_files(&engine), vec!["compact_000003.sst"]);
    assert_eq!(get_str(&engine, "a"), Some("1".to_string()));
    assert_eq!(get_str(&engine, "b"), Some("2".to_string()));
}

#[test]
fn test_close_with_empty_memtable_writes_no_table() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(&temp_dir, 1024 * 1024);
    engine.close().unwrap();
    assert!(table_files(&engine).is_empty());
}

#[test]
fn test_restart_cleans_crash_leftovers() {
    let temp_dir = TempDir::new().unwrap();
    let storage_dir = {
        let engine = open_engine(&temp_dir, 1024 * 1024);
        engine.upsert(b"key", b"compacted").unwrap();
        engine.compact().unwrap();
        engine.close().unwrap();
        engine.storage_dir().to_path_buf()
    };
    assert!(storage_dir.join("compact_000001.sst").exists());

    // A table the compaction replaced but never got to delete
    let stale = Cell::new(
        Bytes::from_static(b"key"),
        Value::from_parts(u64::MAX / 2, Some(Bytes::from_static(b"stale")), None),
        0,
    );
    SsTableBuilder::write(vec![stale], &storage_dir.join("sstable_000000.sst")).unwrap();
    // A flush interrupted before its rename
    fs::write(storage_dir.join("sstable_000002.tmp"), b"partial").unwrap();

    let engine = open_engine(&temp_dir, 1024 * 1024);
    assert_eq!(table_files(&engine), vec!["compact_000001.sst"]);
    assert_eq!(get_str(&engine, "key"), Some("compacted".to_string()));

    engine.upsert(b"next", b"v").unwrap();
    engine.close().unwrap();
    assert_eq!(
        table_files(&engine),
        vec!["compact_000001.sst", "sstable_000002.sst"]
    );
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_writes_after_close_fail() {
    let (_dir, engine) = setup_temp_engine();
    engine.upsert(b"key", b"value").unwrap();
    engine.close().unwrap();
    assert!(engine.is_closed());

    assert!(matches!(engine.upsert(b"k", b"v"), Err(RingError::AlreadyStopped)));
    assert!(matches!(engine.remove(b"k"), Err(RingError::AlreadyStopped)));
    assert!(matches!(
        engine.upsert_with_ttl(b"k", b"v", Duration::from_secs(1)),
        Err(RingError::AlreadyStopped)
    ));
    assert!(matches!(engine.compact(), Err(RingError::AlreadyStopped)));

    // Reads keep working, close stays idempotent
    assert_eq!(get_str(&engine, "key"), Some("value".to_string()));
    engine.close().unwrap();
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_and_readers() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(open_engine(&temp_dir, 4 * 1024));

    let writers: Vec<_> = (0..4u32)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..500u32 {
                    let key = format!("t{}-{:04}", t, i);
                    engine.upsert(key.as_bytes(), key.as_bytes()).unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..50 {
                let records: Vec<_> = engine.range(b"t", None).unwrap().collect();
                assert!(records.windows(2).all(|w| w[0].0 < w[1].0));
                for (key, value) in records {
                    assert_eq!(key, value);
                }
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(collect_range(&engine, b"", None).len(), 2000);
    engine.compact().unwrap();
    assert_eq!(collect_range(&engine, b"", None).len(), 2000);
    assert_eq!(
        get_str(&engine, "t3-0499"),
        Some("t3-0499".to_string())
    );
}

#[test]
fn test_compaction_racing_writers_keeps_newest_versions() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(open_engine(&temp_dir, 64));

    let writers: Vec<_> = (0..8u32)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..200u32 {
                    let key = format!("k{}-{}", t, i % 20);
                    engine.upsert(key.as_bytes(), i.to_string().as_bytes()).unwrap();
                }
            })
        })
        .collect();
    let compactor = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..20 {
                engine.compact().unwrap();
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    compactor.join().unwrap();

    let expected: BTreeMap<String, String> = (0..8u32)
        .flat_map(|t| (0..20u32).map(move |j| (format!("k{}-{}", t, j), (180 + j).to_string())))
        .collect();
    for (key, version) in &expected {
        assert_eq!(get_str(&engine, key).as_ref(), Some(version), "live read of {}", key);
    }

    engine.close().unwrap();
    drop(engine);

    let engine = open_engine(&temp_dir, 64);
    for (key, version) in &expected {
        assert_eq!(get_str(&engine, key).as_ref(), Some(version), "reopened read of {}", key);
    }
    assert_eq!(collect_range(&engine, b"", None).len(), expected.len());
}

#[test]
fn test_close_racing_writers_keeps_acknowledged_writes() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(open_engine(&temp_dir, 256));

    let writers: Vec<_> = (0..4u32)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut acknowledged = BTreeMap::new();
                for i in 0..5000u32 {
                    let key = format!("w{}-{}", t, i % 10);
                    match engine.upsert(key.as_bytes(), i.to_string().as_bytes()) {
                        Ok(()) => {
                            acknowledged.insert(key, i.to_string());
                        }
                        Err(RingError::AlreadyStopped) => break,
                        Err(e) => panic!("unexpected write error: {}", e),
                    }
                }
                acknowledged
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    engine.close().unwrap();

    let mut expected = BTreeMap::new();
    for writer in writers {
        expected.extend(writer.join().unwrap());
    }
    drop(engine);

    let engine = open_engine(&temp_dir, 256);
    for (key, version) in &expected {
        assert_eq!(get_str(&engine, key).as_ref(), Some(version), "reopened read of {}", key);
    }
    assert_eq!(collect_range(&engine, b"", None).len(), expected.len());
}

#[test]
fn test_set_expiry_never_revives_removed_key() {
    let (_temp_dir, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    for round in 0..50 {
        let key = format!("key-{}", round);
        engine.upsert(key.as_bytes(), b"on-disk").unwrap();
        engine.compact().unwrap();

        let remover = {
            let engine = Arc::clone(&engine);
            let key = key.clone();
            thread::spawn(move || engine.remove(key.as_bytes()).unwrap())
        };
        engine.set_expiry(key.as_bytes(), Duration::from_secs(60)).unwrap();
        remover.join().unwrap();

        assert_eq!(get_str(&engine, &key), None, "round {}", round);
    }
}
