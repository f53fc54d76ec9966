//! Tests for Checkpoint
//!
//! These tests verify:
//! - Loading the newest marker and removing stale ones
//! - The replay guard and the save threshold
//! - Save replaces the marker and never moves backwards

use std::fs;
use std::path::{Path, PathBuf};

use atlaslog::checkpoint::Checkpoint;
use atlaslog::log::Cursor;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

fn markers(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_empty_directory() {
    let (_temp, dir) = setup_temp_dir();

    let checkpoint = Checkpoint::open(&dir, 1024).unwrap();

    assert_eq!(checkpoint.number(), 0);
    assert_eq!(checkpoint.cursor(), Cursor::HEAD);
    assert!(checkpoint.marker().is_none());
    assert!(markers(&dir).is_empty());
}

#[test]
fn test_open_keeps_newest_marker() {
    let (_temp, dir) = setup_temp_dir();
    fs::write(dir.join("3.48"), b"").unwrap();
    fs::write(dir.join("5.80"), b"").unwrap();

    let checkpoint = Checkpoint::open(&dir, 1024).unwrap();

    assert_eq!(checkpoint.number(), 5);
    assert_eq!(checkpoint.cursor(), Cursor::new(80));
    assert_eq!(markers(&dir), vec!["5.80".to_string()]);
}

#[test]
fn test_open_ignores_unparsable_files() {
    let (_temp, dir) = setup_temp_dir();
    fs::write(dir.join("7.112"), b"").unwrap();
    fs::write(dir.join("notes.txt"), b"").unwrap();

    let checkpoint = Checkpoint::open(&dir, 1024).unwrap();

    assert_eq!(checkpoint.number(), 7);
    assert_eq!(checkpoint.cursor(), Cursor::new(112));
    assert_eq!(
        markers(&dir),
        vec!["7.112".to_string(), "notes.txt".to_string()]
    );
}

// =============================================================================
// Replay Guard Tests
// =============================================================================

#[test]
fn test_nothing_applied_without_marker() {
    let (_temp, dir) = setup_temp_dir();
    let checkpoint = Checkpoint::open(&dir, 1024).unwrap();

    assert!(!checkpoint.is_applied(0));
    assert!(!checkpoint.is_applied(1));
}

#[test]
fn test_is_applied_up_to_number() {
    let (_temp, dir) = setup_temp_dir();
    fs::write(dir.join("5.80"), b"").unwrap();
    let checkpoint = Checkpoint::open(&dir, 1024).unwrap();

    assert!(checkpoint.is_applied(0));
    assert!(checkpoint.is_applied(5));
    assert!(!checkpoint.is_applied(6));
}

#[test]
fn test_can_save_after_group_apply_length() {
    let (_temp, dir) = setup_temp_dir();
    fs::write(dir.join("2.100"), b"").unwrap();
    let checkpoint = Checkpoint::open(&dir, 50).unwrap();

    assert!(!checkpoint.can_save(Cursor::new(100)));
    assert!(!checkpoint.can_save(Cursor::new(149)));
    assert!(checkpoint.can_save(Cursor::new(150)));
}

// =============================================================================
// Save Tests
// =============================================================================

#[test]
fn test_save_replaces_marker() {
    let (_temp, dir) = setup_temp_dir();
    let mut checkpoint = Checkpoint::open(&dir, 0).unwrap();

    checkpoint.save(1, Cursor::new(40)).unwrap();
    assert_eq!(markers(&dir), vec!["1.40".to_string()]);

    checkpoint.save(4, Cursor::new(96)).unwrap();
    assert_eq!(markers(&dir), vec!["4.96".to_string()]);
    assert_eq!(checkpoint.number(), 4);
    assert_eq!(checkpoint.cursor(), Cursor::new(96));
    assert!(checkpoint.is_applied(4));
}

#[test]
fn test_save_same_position_keeps_marker() {
    let (_temp, dir) = setup_temp_dir();
    let mut checkpoint = Checkpoint::open(&dir, 0).unwrap();

    checkpoint.save(2, Cursor::new(40)).unwrap();
    checkpoint.save(2, Cursor::new(40)).unwrap();

    assert_eq!(markers(&dir), vec!["2.40".to_string()]);
}

#[test]
fn test_save_rejects_moving_backwards() {
    let (_temp, dir) = setup_temp_dir();
    let mut checkpoint = Checkpoint::open(&dir, 0).unwrap();
    checkpoint.save(4, Cursor::new(96)).unwrap();

    assert!(checkpoint.save(3, Cursor::new(128)).is_err());
    assert!(checkpoint.save(5, Cursor::new(64)).is_err());

    assert_eq!(checkpoint.number(), 4);
    assert_eq!(markers(&dir), vec!["4.96".to_string()]);
}

#[test]
fn test_saved_checkpoint_survives_reopen() {
    let (_temp, dir) = setup_temp_dir();
    {
        let mut checkpoint = Checkpoint::open(&dir, 0).unwrap();
        checkpoint.save(9, Cursor::new(4096)).unwrap();
    }

    let checkpoint = Checkpoint::open(&dir, 0).unwrap();

    assert_eq!(checkpoint.number(), 9);
    assert_eq!(checkpoint.cursor(), Cursor::new(4096));
    assert_eq!(checkpoint.marker(), Some(dir.join("9.4096")));
}
