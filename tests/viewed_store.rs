//! File-backed viewed-state persistence: round-trips across process
//! restarts, on-disk layout, and degradation on corrupt files.

use leadfeed::{JsonFileStore, Namespace, StateStore, ViewedStateStore};
use pretty_assertions::assert_eq;

#[test]
fn test_marks_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let mut store = ViewedStateStore::load(Box::new(JsonFileStore::new(dir.path()).unwrap()));
    store.mark_viewed(Namespace::Leads, "L1");
    store.mark_viewed(Namespace::Leads, "L2");
    store.mark_viewed(Namespace::Events, "42");
    drop(store);

    // Simulated restart: a fresh store over the same directory
    let store = ViewedStateStore::load(Box::new(JsonFileStore::new(dir.path()).unwrap()));
    assert!(store.is_viewed(Namespace::Leads, "L1"));
    assert!(store.is_viewed(Namespace::Leads, "L2"));
    assert!(store.is_viewed(Namespace::Events, "42"));
    assert!(!store.is_viewed(Namespace::Events, "L1"));
    assert_eq!(store.viewed_count(Namespace::Leads), 2);
}

#[test]
fn test_on_disk_layout_is_sorted_json_array() {
    let dir = tempfile::tempdir().unwrap();

    let mut store = ViewedStateStore::load(Box::new(JsonFileStore::new(dir.path()).unwrap()));
    store.mark_viewed(Namespace::Leads, "L9");
    store.mark_viewed(Namespace::Leads, "L1");

    let raw = std::fs::read_to_string(dir.path().join("viewed_leads.json")).unwrap();
    assert_eq!(raw, r#"["L1","L9"]"#);
    // The other namespace was never marked, so its file does not exist
    assert!(!dir.path().join("viewed_events.json").exists());
}

#[test]
fn test_corrupt_file_degrades_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("viewed_leads.json"), "{definitely not json").unwrap();

    let store = ViewedStateStore::load(Box::new(JsonFileStore::new(dir.path()).unwrap()));
    assert_eq!(store.viewed_count(Namespace::Leads), 0);
}

#[test]
fn test_clear_removes_file() {
    let dir = tempfile::tempdir().unwrap();

    let mut store = ViewedStateStore::load(Box::new(JsonFileStore::new(dir.path()).unwrap()));
    store.mark_viewed(Namespace::Events, "7");
    assert!(dir.path().join("viewed_events.json").exists());

    store.clear(Namespace::Events);
    assert!(!dir.path().join("viewed_events.json").exists());
    assert!(!store.is_viewed(Namespace::Events, "7"));
}

#[test]
fn test_backend_clear_of_missing_key_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    let backend = JsonFileStore::new(dir.path()).unwrap();
    assert!(backend.clear("viewed_leads").is_ok());
    assert_eq!(backend.get("viewed_leads").unwrap(), None);
}
