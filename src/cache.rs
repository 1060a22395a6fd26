//! # Output Cache
//!
//! Key-value store for node outputs keyed by (node, output slot). A run writes to the
//! cache when `store_to_cache` is set and restores node outputs from it when
//! `load_from_cache` is set.
//!
//! Implementations must tolerate concurrent readers while a run writes.

use crate::data::DataTable;
use crate::graph::NodeId;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::trace;

/// Cache of node outputs.
pub trait Cache: Send + Sync {
  /// Returns all cached output tables of a node, keyed by slot name.
  fn query(&self, node: &NodeId) -> HashMap<String, DataTable>;

  /// Stores the table of one output slot, replacing any previous entry.
  fn store(&self, node: &NodeId, slot: &str, data: DataTable);

  /// Removes all entries.
  fn clear(&self);
}

/// In-memory [`Cache`] guarded by a reader-writer lock.
#[derive(Debug, Default)]
pub struct MemoryCache {
  entries: RwLock<HashMap<NodeId, HashMap<String, DataTable>>>,
}

impl MemoryCache {
  /// Creates an empty cache.
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the cached table of one output slot.
  pub fn get(&self, node: &str, slot: &str) -> Option<DataTable> {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(node)
      .and_then(|slots| slots.get(slot))
      .cloned()
  }

  /// Returns true if the slot has a cache entry.
  pub fn contains(&self, node: &str, slot: &str) -> bool {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(node)
      .is_some_and(|slots| slots.contains_key(slot))
  }

  /// Returns the number of cached slots over all nodes.
  pub fn len(&self) -> usize {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .map(HashMap::len)
      .sum()
  }

  /// Returns true if nothing is cached.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Cache for MemoryCache {
  fn query(&self, node: &NodeId) -> HashMap<String, DataTable> {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(node)
      .cloned()
      .unwrap_or_default()
  }

  fn store(&self, node: &NodeId, slot: &str, data: DataTable) {
    trace!(node = %node, slot, rows = data.len(), "MemoryCache::store()");
    self
      .entries
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .entry(node.clone())
      .or_default()
      .insert(slot.to_string(), data);
  }

  fn clear(&self) {
    self
      .entries
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .clear();
  }
}
