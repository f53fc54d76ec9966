//! Tests for Engine
//!
//! These tests verify:
//! - Applying batches and reading values back
//! - Checkpoint advancement and FIFO release of pending batches
//! - Replay protection after a restart
//! - Failed batches block checkpoints until retried
//! - Probing, scanning and explicit collection
//! - Engine lifecycle (open/close/reopen)

use std::path::Path;
use std::sync::{Arc, Mutex};

use atlaslog::config::Config;
use atlaslog::engine::{Engine, Probe};
use atlaslog::log::Cursor;
use atlaslog::wal::{Batch, Event};
use atlaslog::AtlasError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &Path, group_apply_length: u64) -> Config {
    Config::builder()
        .data_dir(dir)
        .segment_capacity(4096)
        .min_collect_length(0)
        .group_apply_length(group_apply_length)
        .heartbeat_interval_ms(50)
        .sweep_pause_ms(10)
        .build()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(temp_dir.path(), 1024 * 1024)).unwrap();
    (temp_dir, engine)
}

fn apply(engine: &Engine, number: u64, events: Vec<Event>) {
    engine
        .apply(Batch::new(number, events))
        .unwrap()
        .wait()
        .unwrap();
}

/// Batch whose release hook records its number
fn tracked(number: u64, events: Vec<Event>, released: &Arc<Mutex<Vec<u64>>>) -> Batch {
    let released = Arc::clone(released);
    Batch::new(number, events).with_release(move || released.lock().unwrap().push(number))
}

fn load_str(engine: &Engine, key: &str) -> Option<String> {
    engine
        .load(key.as_bytes())
        .unwrap()
        .map(|v| String::from_utf8(v).unwrap())
}

fn scan(engine: &Engine) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = engine
        .iterate()
        .map(|e| {
            let e = e.unwrap();
            (
                String::from_utf8(e.key).unwrap(),
                String::from_utf8(e.value).unwrap(),
            )
        })
        .collect();
    entries.sort();
    entries
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let _engine = Engine::open(test_config(&data_dir, 0)).unwrap();

    assert!(data_dir.join("segments").is_dir());
    assert!(data_dir.join("checkpoint").is_dir());
    assert!(data_dir.join("segments").join("0").exists());
}

#[test]
fn test_engine_rejects_tiny_segments() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .segment_capacity(8)
        .build();

    assert!(matches!(Engine::open(config), Err(AtlasError::Config(_))));
}

#[test]
fn test_engine_open_path() {
    let temp_dir = TempDir::new().unwrap();

    let engine = Engine::open_path(temp_dir.path()).unwrap();

    assert_eq!(engine.data_dir(), temp_dir.path());
    assert_eq!(engine.stats().tail, Cursor::HEAD);
    engine.close().unwrap();
}

// =============================================================================
// Apply/Load Tests
// =============================================================================

#[test]
fn test_apply_and_load() {
    let (_temp, engine) = setup_temp_engine();

    apply(&engine, 1, vec![Event::add("a", "1"), Event::add("b", "2")]);

    assert_eq!(load_str(&engine, "a"), Some("1".to_string()));
    assert_eq!(load_str(&engine, "b"), Some("2".to_string()));
    assert_eq!(load_str(&engine, "c"), None);
}

#[test]
fn test_overwrite_returns_latest() {
    let (_temp, engine) = setup_temp_engine();

    apply(&engine, 1, vec![Event::add("key", "old")]);
    apply(&engine, 2, vec![Event::add("key", "new")]);

    assert_eq!(load_str(&engine, "key"), Some("new".to_string()));
    assert_eq!(engine.stats().keys, 1);
    assert_eq!(engine.stats().records_appended, 2);
}

#[test]
fn test_delete_hides_key() {
    let (_temp, engine) = setup_temp_engine();

    apply(&engine, 1, vec![Event::add("key", "value")]);
    apply(&engine, 2, vec![Event::delete("key"), Event::delete("missing")]);

    assert_eq!(load_str(&engine, "key"), None);
    assert_eq!(engine.stats().keys_removed, 1);
    assert_eq!(engine.stats().keys, 0);
}

#[test]
fn test_events_apply_in_order_within_batch() {
    let (_temp, engine) = setup_temp_engine();

    apply(
        &engine,
        1,
        vec![
            Event::add("key", "1"),
            Event::delete("key"),
            Event::add("key", "2"),
        ],
    );

    assert_eq!(load_str(&engine, "key"), Some("2".to_string()));
}

#[test]
fn test_first_record_lands_at_head() {
    let (_temp, engine) = setup_temp_engine();

    apply(&engine, 1, vec![Event::add("a", "1")]);

    // 4 (len) + 4 (key len) + 1 + 1
    assert_eq!(engine.stats().tail, Cursor::new(10));
    match engine.probe(Cursor::HEAD).unwrap() {
        Probe::Record { at, next, live, .. } => {
            assert_eq!(at, Cursor::HEAD);
            assert_eq!(next, Cursor::new(10));
            assert!(live);
        }
        other => panic!("expected a record, got {:?}", other),
    }
}

#[test]
fn test_records_roll_over_segments() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .segment_capacity(64)
        .build();
    let engine = Engine::open(config).unwrap();

    for i in 0..20u64 {
        apply(&engine, i + 1, vec![Event::add(format!("k{:02}", i), "value")]);
    }

    let segments = engine.segments();
    assert!(segments.len() > 1);
    for pair in segments.windows(2) {
        assert_eq!(pair[1].begin, pair[0].end());
    }
    for i in 0..20u64 {
        assert_eq!(load_str(&engine, &format!("k{:02}", i)), Some("value".to_string()));
    }
}

// =============================================================================
// Checkpoint Tests
// =============================================================================

#[test]
fn test_checkpoint_after_group_apply_length() {
    let temp_dir = TempDir::new().unwrap();
    // Every "k"="v" record frames to 10 bytes
    let engine = Engine::open(test_config(temp_dir.path(), 40)).unwrap();
    let released = Arc::new(Mutex::new(Vec::new()));

    for number in 1..=3 {
        engine
            .apply(tracked(number, vec![Event::add("k", "v")], &released))
            .unwrap()
            .wait()
            .unwrap();
    }
    assert!(released.lock().unwrap().is_empty());
    assert_eq!(engine.stats().pending_batches, 3);
    assert_eq!(engine.stats().checkpoint_number, 0);

    engine
        .apply(tracked(4, vec![Event::add("k", "v")], &released))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(*released.lock().unwrap(), vec![1, 2, 3, 4]);
    let stats = engine.stats();
    assert_eq!(stats.pending_batches, 0);
    assert_eq!(stats.checkpoint_number, 4);
    assert_eq!(stats.checkpoint_cursor, Cursor::new(40));
}

#[test]
fn test_checkpoint_is_monotonic_and_behind_tail() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(temp_dir.path(), 0)).unwrap();

    let mut last = (0, Cursor::HEAD);
    for number in 1..=10u64 {
        apply(&engine, number, vec![Event::add(format!("k{}", number), "v")]);

        let stats = engine.stats();
        assert!(stats.checkpoint_number >= last.0);
        assert!(stats.checkpoint_cursor >= last.1);
        assert!(stats.checkpoint_cursor <= stats.tail);
        last = (stats.checkpoint_number, stats.checkpoint_cursor);
    }
    assert_eq!(last.0, 10);
}

#[test]
fn test_close_checkpoints_pending_batches() {
    let temp_dir = TempDir::new().unwrap();
    let released = Arc::new(Mutex::new(Vec::new()));
    {
        let engine = Engine::open(test_config(temp_dir.path(), 1024 * 1024)).unwrap();
        for number in 1..=3 {
            engine
                .apply(tracked(number, vec![Event::add("k", "v")], &released))
                .unwrap()
                .wait()
                .unwrap();
        }
        assert!(released.lock().unwrap().is_empty());
        engine.close().unwrap();
    }
    assert_eq!(*released.lock().unwrap(), vec![1, 2, 3]);

    let engine = Engine::open(test_config(temp_dir.path(), 1024 * 1024)).unwrap();
    assert_eq!(engine.stats().checkpoint_number, 3);
    assert_eq!(engine.stats().checkpoint_cursor, Cursor::new(30));
}

#[test]
fn test_replayed_batch_is_discarded() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(test_config(temp_dir.path(), 0)).unwrap();
        apply(&engine, 1, vec![Event::add("a", "1")]);
        apply(&engine, 2, vec![Event::add("a", "2")]);
    }

    let engine = Engine::open(test_config(temp_dir.path(), 0)).unwrap();
    let released = Arc::new(Mutex::new(Vec::new()));
    let tail = engine.stats().tail;

    engine
        .apply(tracked(1, vec![Event::add("a", "stale")], &released))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(*released.lock().unwrap(), vec![1]);
    assert_eq!(load_str(&engine, "a"), Some("2".to_string()));
    assert_eq!(engine.stats().tail, tail);
    assert_eq!(engine.stats().batches_discarded, 1);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_oversized_record_fails_batch() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .segment_capacity(64)
        .group_apply_length(0)
        .build();
    let engine = Engine::open(config).unwrap();

    let result = engine
        .apply(Batch::new(1, vec![Event::add("big", vec![0u8; 100])]))
        .unwrap()
        .wait();

    assert!(matches!(result, Err(AtlasError::RecordTooLarge { .. })));
    assert_eq!(engine.stats().checkpoint_number, 0);
    assert_eq!(engine.stats().pending_batches, 1);
}

#[test]
fn test_failed_batch_blocks_checkpoint_until_retried() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .segment_capacity(64)
        .group_apply_length(0)
        .build();
    let engine = Engine::open(config).unwrap();
    let released = Arc::new(Mutex::new(Vec::new()));

    let failed = engine
        .apply(tracked(1, vec![Event::add("big", vec![0u8; 100])], &released))
        .unwrap()
        .wait();
    assert!(failed.is_err());

    engine
        .apply(tracked(2, vec![Event::add("b", "2")], &released))
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(engine.stats().checkpoint_number, 0);
    assert!(released.lock().unwrap().is_empty());

    // Resubmitting the same number replaces the failed batch
    engine
        .apply(tracked(1, vec![Event::add("a", "1")], &released))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(engine.stats().checkpoint_number, 1);
    assert_eq!(*released.lock().unwrap(), vec![1]);
    assert_eq!(engine.stats().pending_batches, 1);
    assert_eq!(load_str(&engine, "a"), Some("1".to_string()));
    assert_eq!(load_str(&engine, "b"), Some("2".to_string()));
}

#[test]
fn test_resubmitted_pending_batch_is_not_applied_twice() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(temp_dir.path(), 1024 * 1024)).unwrap();
    let released = Arc::new(Mutex::new(Vec::new()));

    engine
        .apply(tracked(1, vec![Event::add("a", "1")], &released))
        .unwrap()
        .wait()
        .unwrap();
    let tail = engine.stats().tail;

    engine
        .apply(tracked(1, vec![Event::add("a", "1")], &released))
        .unwrap()
        .wait()
        .unwrap();

    let stats = engine.stats();
    assert_eq!(stats.tail, tail);
    assert_eq!(stats.records_appended, 1);
    assert_eq!(stats.pending_batches, 1);

    engine.close().unwrap();
    assert_eq!(*released.lock().unwrap(), vec![1]);
}

// =============================================================================
// Probe/Iterate Tests
// =============================================================================

#[test]
fn test_probe_reports_liveness() {
    let (_temp, engine) = setup_temp_engine();
    apply(&engine, 1, vec![Event::add("a", "1"), Event::add("b", "2")]);
    apply(&engine, 2, vec![Event::add("a", "3")]);

    match engine.probe(Cursor::HEAD).unwrap() {
        Probe::Record { entry, live, .. } => {
            assert_eq!(entry.key, b"a".to_vec());
            assert!(!live);
        }
        other => panic!("expected a record, got {:?}", other),
    }

    let tail = engine.stats().tail;
    assert_eq!(engine.probe(tail).unwrap(), Probe::Tail(tail));
}

#[test]
fn test_iterate_yields_only_live_records() {
    let (_temp, engine) = setup_temp_engine();
    apply(&engine, 1, vec![Event::add("a", "1"), Event::add("b", "2")]);
    apply(&engine, 2, vec![Event::add("a", "3"), Event::add("c", "4")]);
    apply(&engine, 3, vec![Event::delete("c")]);

    assert_eq!(
        scan(&engine),
        vec![
            ("a".to_string(), "3".to_string()),
            ("b".to_string(), "2".to_string())
        ]
    );
}

#[test]
fn test_iterate_empty_engine() {
    let (_temp, engine) = setup_temp_engine();

    assert!(scan(&engine).is_empty());
}

// =============================================================================
// Collect Tests
// =============================================================================

#[test]
fn test_collect_dead_prefix() {
    let (_temp, engine) = setup_temp_engine();
    apply(&engine, 1, vec![Event::add("a", "1"), Event::add("b", "1")]);
    apply(&engine, 2, vec![Event::add("a", "2"), Event::add("b", "2")]);

    // The first two 10-byte records are dead
    let reclaimed = engine.collect(Cursor::HEAD, Cursor::new(20)).unwrap();

    assert_eq!(reclaimed, 20);
    assert_eq!(engine.stats().bytes_reclaimed, 20);
    assert_eq!(engine.stats().live_bytes, 20);
    assert_eq!(load_str(&engine, "a"), Some("2".to_string()));
    assert_eq!(load_str(&engine, "b"), Some("2".to_string()));
    assert_eq!(engine.segments()[0].begin, Cursor::new(20));
}

#[test]
fn test_collect_below_threshold_is_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .min_collect_length(100)
        .build();
    let engine = Engine::open(config).unwrap();
    apply(&engine, 1, vec![Event::add("a", "1")]);
    apply(&engine, 2, vec![Event::add("a", "2")]);

    let reclaimed = engine.collect(Cursor::HEAD, Cursor::new(10)).unwrap();

    assert_eq!(reclaimed, 0);
    assert_eq!(engine.stats().live_bytes, 20);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(test_config(temp_dir.path(), 1024 * 1024)).unwrap();
        apply(&engine, 1, vec![Event::add("a", "1"), Event::add("b", "2")]);
        apply(&engine, 2, vec![Event::add("a", "3"), Event::delete("b")]);
        engine.close().unwrap();
    }

    let engine = Engine::open(test_config(temp_dir.path(), 1024 * 1024)).unwrap();

    assert_eq!(load_str(&engine, "a"), Some("3".to_string()));
    assert_eq!(load_str(&engine, "b"), None);
    assert_eq!(scan(&engine), vec![("a".to_string(), "3".to_string())]);
}

#[test]
fn test_appends_continue_after_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let tail;
    {
        let engine = Engine::open(test_config(temp_dir.path(), 0)).unwrap();
        apply(&engine, 1, vec![Event::add("a", "1")]);
        tail = engine.stats().tail;
    }

    let engine = Engine::open(test_config(temp_dir.path(), 0)).unwrap();
    apply(&engine, 2, vec![Event::add("b", "2")]);

    match engine.probe(tail).unwrap() {
        Probe::Record { at, entry, .. } => {
            assert_eq!(at, tail);
            assert_eq!(entry.key, b"b".to_vec());
        }
        other => panic!("expected a record, got {:?}", other),
    }
    assert_eq!(load_str(&engine, "a"), Some("1".to_string()));
}
