//! # Runtime Partitions
//!
//! Algorithms can be tagged with a [`PartitionKey`] to group them into runtime
//! partitions. Each key refers to a [`RuntimePartition`] holding the settings that
//! apply while its nodes run: whether the run continues when one of them fails,
//! whether the failed inputs are exported, and which outputs are written to disk.
//!
//! ## Usage
//!
//! ```rust
//! use runweave::runtime_partition::{PartitionKey, RuntimePartition, RuntimePartitions};
//!
//! let mut partitions = RuntimePartitions::default();
//! partitions.insert(
//!   PartitionKey::from("segmentation"),
//!   RuntimePartition::new("Segmentation").with_continue_on_failure(true),
//! );
//!
//! let key = PartitionKey::from("segmentation");
//! assert!(partitions.get(Some(&key)).continue_on_failure.continue_on_failure);
//!
//! // Unknown keys and untagged nodes use the default partition
//! assert!(!partitions.get(None).continue_on_failure.continue_on_failure);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key that assigns an algorithm to a runtime partition.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct PartitionKey(pub String);

impl PartitionKey {
  /// Creates a new partition key from a string.
  pub fn new(s: String) -> Self {
    Self(s)
  }

  /// Returns the key as a string slice.
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<String> for PartitionKey {
  fn from(s: String) -> Self {
    Self(s)
  }
}

impl From<&str> for PartitionKey {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

impl fmt::Display for PartitionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// What to do when a node of the partition fails.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinueOnFailureSettings {
  /// Continue with the remaining nodes instead of aborting the run.
  pub continue_on_failure: bool,
  /// Export the inputs of a failed node to `<output>/_error/` when continuing.
  pub export_failed_inputs: bool,
}

/// Which outputs of the partition are written to disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
  /// Export outputs whose data type is heavy.
  pub export_heavy_data: bool,
  /// Export outputs whose data type is lightweight.
  pub export_lightweight_data: bool,
}

impl Default for OutputSettings {
  fn default() -> Self {
    Self {
      export_heavy_data: true,
      export_lightweight_data: true,
    }
  }
}

/// Settings of one runtime partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimePartition {
  /// Display name.
  pub name: String,
  /// Failure policy.
  pub continue_on_failure: ContinueOnFailureSettings,
  /// Disk output filter.
  pub output: OutputSettings,
}

impl RuntimePartition {
  /// Creates a partition with the given name and default settings.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }

  /// Sets whether the run continues when a node of this partition fails.
  pub fn with_continue_on_failure(mut self, enabled: bool) -> Self {
    self.continue_on_failure.continue_on_failure = enabled;
    self
  }

  /// Sets whether the inputs of failed nodes are exported.
  pub fn with_export_failed_inputs(mut self, enabled: bool) -> Self {
    self.continue_on_failure.export_failed_inputs = enabled;
    self
  }

  /// Sets the disk output filter.
  pub fn with_output_settings(mut self, output: OutputSettings) -> Self {
    self.output = output;
    self
  }
}

impl Default for RuntimePartition {
  fn default() -> Self {
    Self {
      name: "Default".to_string(),
      continue_on_failure: ContinueOnFailureSettings::default(),
      output: OutputSettings::default(),
    }
  }
}

/// Registry of runtime partitions keyed by [`PartitionKey`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimePartitions {
  default: RuntimePartition,
  partitions: BTreeMap<PartitionKey, RuntimePartition>,
}

impl RuntimePartitions {
  /// Creates a registry that only contains the given default partition.
  pub fn with_default(default: RuntimePartition) -> Self {
    Self {
      default,
      partitions: BTreeMap::new(),
    }
  }

  /// Registers (or replaces) the partition for `key`.
  pub fn insert(&mut self, key: PartitionKey, partition: RuntimePartition) -> Option<RuntimePartition> {
    self.partitions.insert(key, partition)
  }

  /// Returns the partition for `key`, falling back to the default partition for
  /// untagged nodes and unknown keys.
  pub fn get(&self, key: Option<&PartitionKey>) -> &RuntimePartition {
    key
      .and_then(|key| self.partitions.get(key))
      .unwrap_or(&self.default)
  }

  /// Returns the default partition.
  pub fn default_partition(&self) -> &RuntimePartition {
    &self.default
  }

  /// Returns a display name of the form `"<name> (<key>)"`.
  pub fn full_name(&self, key: Option<&PartitionKey>) -> String {
    match key {
      Some(key) => format!("{} ({})", self.get(Some(key)).name, key),
      None => self.default.name.clone(),
    }
  }

  /// Returns the number of registered (non-default) partitions.
  pub fn len(&self) -> usize {
    self.partitions.len()
  }

  /// Returns true if only the default partition exists.
  pub fn is_empty(&self) -> bool {
    self.partitions.is_empty()
  }
}
