//! Integration tests for the on-disk answer cache

use heyman::cache::{fingerprint, CacheEntry, CacheStore};
use heyman::provider::QueryResponse;
use std::fs;
use tempfile::TempDir;

fn response(content: &str, model: &str) -> QueryResponse {
    QueryResponse {
        content: content.to_string(),
        tokens_input: 1500,
        tokens_output: 12,
        model: model.to_string(),
        provider: "ollama".to_string(),
        cached: false,
    }
}

fn json_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
        .collect()
}

#[test]
fn test_entries_survive_reopening_the_store() {
    let temp = TempDir::new().unwrap();
    CacheStore::new(temp.path(), 30)
        .unwrap()
        .set("find", "files over 1G", "llama3:8b", &response("find . -size +1G", "llama3:8b"))
        .unwrap();

    let reopened = CacheStore::new(temp.path(), 30).unwrap();
    let hit = reopened
        .get("find", "files over 1G", "llama3:8b")
        .unwrap()
        .unwrap();
    assert_eq!(hit.content, "find . -size +1G");
    assert!(hit.cached);
    assert_eq!((hit.tokens_input, hit.tokens_output), (1500, 12));
}

#[test]
fn test_key_components_are_not_interchangeable() {
    let temp = TempDir::new().unwrap();
    let store = CacheStore::new(temp.path(), 30).unwrap();
    store
        .set("ls", "sort by size", "llama3:8b", &response("ls -lS", "llama3:8b"))
        .unwrap();

    assert!(store.get("ls", "sort by size", "llama3:70b").unwrap().is_none());
    assert!(store.get("ls", "sort by time", "llama3:8b").unwrap().is_none());
    assert!(store.get("lsof", "sort by size", "llama3:8b").unwrap().is_none());
    assert!(store.get("ls", "sort by size", "llama3:8b").unwrap().is_some());
}

#[test]
fn test_entry_file_is_named_by_fingerprint() {
    let temp = TempDir::new().unwrap();
    let store = CacheStore::new(temp.path(), 30).unwrap();
    store
        .set("tar", "extract", "gpt-4o", &response("tar -xf a.tar", "gpt-4o"))
        .unwrap();

    let files = json_files(temp.path());
    assert_eq!(files.len(), 1);
    let key = fingerprint("tar", "extract", "gpt-4o");
    assert_eq!(files[0].file_stem().unwrap().to_str().unwrap(), key);

    let entry: CacheEntry = serde_json::from_str(&fs::read_to_string(&files[0]).unwrap()).unwrap();
    assert_eq!(entry.key, key);
    assert_eq!(entry.command, "tar");
    assert_eq!(entry.access_count, 1);
}

#[test]
fn test_hits_are_counted_in_stats() {
    let temp = TempDir::new().unwrap();
    let store = CacheStore::new(temp.path(), 30).unwrap();
    store
        .set("ps", "by memory", "llama3", &response("ps aux --sort=-%mem", "llama3"))
        .unwrap();
    store
        .set("df", "human sizes", "llama3", &response("df -h", "llama3"))
        .unwrap();

    for _ in 0..3 {
        store.get("ps", "by memory", "llama3").unwrap().unwrap();
    }

    // Each entry starts with one access from the write
    let stats = store.stats().unwrap();
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.total_hits, 5);
    assert!(stats.total_size_bytes > 0);
    assert!(stats.oldest_entry.unwrap() <= stats.newest_entry.unwrap());

    assert_eq!(store.clear().unwrap(), 2);
    assert_eq!(store.stats().unwrap().total_entries, 0);
}

#[test]
fn test_garbage_file_heals_to_miss() {
    let temp = TempDir::new().unwrap();
    let store = CacheStore::new(temp.path(), 30).unwrap();
    let key = fingerprint("ls", "q", "m");
    let path = temp.path().join(format!("{}.json", key));
    fs::write(&path, b"{ not json").unwrap();

    assert!(store.get("ls", "q", "m").unwrap().is_none());
    assert!(!path.exists());
}
