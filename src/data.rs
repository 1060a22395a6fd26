//! # Data Tables
//!
//! The unit of data that flows along edges. A [`DataTable`] is an ordered list of
//! rows; each row is an opaque JSON value. The data type system itself is owned by
//! the node algorithms, the scheduler only moves, caches and exports tables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Data held by the slots of one node, keyed by slot name.
pub type SlotData = HashMap<String, DataTable>;

/// An ordered collection of data rows held by a slot.
///
/// # Example
///
/// ```rust
/// use runweave::data::DataTable;
/// use serde_json::json;
///
/// let mut table = DataTable::from_rows(vec![json!(1), json!(2)]);
/// table.push(json!(3));
/// assert_eq!(table.len(), 3);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
  rows: Vec<serde_json::Value>,
}

impl DataTable {
  /// Creates an empty table.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a table from the given rows.
  pub fn from_rows(rows: Vec<serde_json::Value>) -> Self {
    Self { rows }
  }

  /// Appends a row.
  pub fn push(&mut self, row: serde_json::Value) {
    self.rows.push(row);
  }

  /// Appends all rows of `other`, keeping their order.
  pub fn extend_from(&mut self, other: &DataTable) {
    self.rows.extend(other.rows.iter().cloned());
  }

  /// Returns the rows.
  pub fn rows(&self) -> &[serde_json::Value] {
    &self.rows
  }

  /// Returns the number of rows.
  pub fn len(&self) -> usize {
    self.rows.len()
  }

  /// Returns true if the table holds no rows.
  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  /// Removes all rows.
  pub fn clear(&mut self) {
    self.rows.clear();
  }
}

impl FromIterator<serde_json::Value> for DataTable {
  fn from_iter<I: IntoIterator<Item = serde_json::Value>>(iter: I) -> Self {
    Self {
      rows: iter.into_iter().collect(),
    }
  }
}
