//! Tests for [`MemoryCache`].

use crate::cache::{Cache, MemoryCache};
use crate::data::DataTable;
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_store_and_query() {
  let cache = MemoryCache::new();
  assert!(cache.is_empty());
  cache.store(&"a".into(), "out", DataTable::from_rows(vec![json!(1)]));
  cache.store(&"a".into(), "other", DataTable::new());
  assert_eq!(cache.len(), 2);
  assert!(cache.contains("a", "out"));
  let entries = cache.query(&"a".into());
  assert_eq!(entries.len(), 2);
  assert_eq!(entries["out"].len(), 1);
  assert!(cache.query(&"b".into()).is_empty());
}

#[test]
fn test_store_replaces() {
  let cache = MemoryCache::new();
  cache.store(&"a".into(), "out", DataTable::from_rows(vec![json!(1)]));
  cache.store(&"a".into(), "out", DataTable::from_rows(vec![json!(2), json!(3)]));
  assert_eq!(cache.get("a", "out").unwrap().len(), 2);
}

#[test]
fn test_clear() {
  let cache = MemoryCache::new();
  cache.store(&"a".into(), "out", DataTable::new());
  cache.clear();
  assert!(cache.is_empty());
  assert!(cache.get("a", "out").is_none());
}

#[test]
fn test_concurrent_readers() {
  let cache = Arc::new(MemoryCache::new());
  cache.store(&"a".into(), "out", DataTable::from_rows(vec![json!(1)]));
  let handles: Vec<_> = (0..4)
    .map(|_| {
      let cache = Arc::clone(&cache);
      std::thread::spawn(move || cache.query(&"a".into()).len())
    })
    .collect();
  for handle in handles {
    assert_eq!(handle.join().unwrap(), 1);
  }
}
