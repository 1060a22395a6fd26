//! # Run Configuration
//!
//! [`RunConfiguration`] controls caching, disk output and failure handling of a
//! pipeline run. It is plain data: serializable with serde, loadable from a JSON
//! file, and treated as immutable once a run starts.
//!
//! ## Example
//!
//! ```rust
//! use runweave::config::{InheritedBool, RunConfiguration};
//!
//! let config = RunConfiguration::default()
//!   .with_output_path("/tmp/run")
//!   .with_store_to_cache(true)
//!   .with_continue_on_failure(InheritedBool::Enable)
//!   .with_disabled_store_to_disk("preview");
//! assert!(config.validate().is_ok());
//! ```

use crate::error::ConfigError;
use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A boolean that can defer to the runtime partition setting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InheritedBool {
  /// Use the value configured on the runtime partition.
  #[default]
  Inherit,
  /// Force on for all partitions.
  Enable,
  /// Force off for all partitions.
  Disable,
}

impl InheritedBool {
  /// Resolves the effective value given the partition-level setting.
  pub fn resolve(self, partition_value: bool) -> bool {
    match self {
      InheritedBool::Inherit => partition_value,
      InheritedBool::Enable => true,
      InheritedBool::Disable => false,
    }
  }
}

/// Settings of a single pipeline run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfiguration {
  /// Root directory for disk outputs, failed-input exports and `log.txt`.
  pub output_path: Option<PathBuf>,
  /// Restore node outputs from the cache instead of executing the node.
  pub load_from_cache: bool,
  /// Store node outputs in the cache.
  pub store_to_cache: bool,
  /// Write node outputs below `output_path`.
  pub store_to_disk: bool,
  /// Nodes whose outputs are never stored in the cache.
  pub disable_store_to_cache_nodes: BTreeSet<NodeId>,
  /// Nodes whose outputs are never written to disk.
  pub disable_store_to_disk_nodes: BTreeSet<NodeId>,
  /// Thread budget handed to algorithms.
  pub num_threads: usize,
  /// Do not report failures through `tracing` (the progress log still records them).
  pub silent: bool,
  /// Run nodes even if a producer of one of their inputs was deactivated or failed.
  pub ignore_deactivated_inputs: bool,
  /// Continue after a node failure.
  pub continue_on_failure: InheritedBool,
  /// Export the inputs of failed nodes when continuing.
  pub continue_on_failure_export_failed_inputs: InheritedBool,
}

impl Default for RunConfiguration {
  fn default() -> Self {
    Self {
      output_path: None,
      load_from_cache: true,
      store_to_cache: false,
      store_to_disk: false,
      disable_store_to_cache_nodes: BTreeSet::new(),
      disable_store_to_disk_nodes: BTreeSet::new(),
      num_threads: 1,
      silent: false,
      ignore_deactivated_inputs: false,
      continue_on_failure: InheritedBool::Inherit,
      continue_on_failure_export_failed_inputs: InheritedBool::Inherit,
    }
  }
}

impl RunConfiguration {
  /// Sets the output directory and enables storing to disk.
  pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.output_path = Some(path.into());
    self.store_to_disk = true;
    self
  }

  /// Sets whether outputs are restored from the cache.
  pub fn with_load_from_cache(mut self, enabled: bool) -> Self {
    self.load_from_cache = enabled;
    self
  }

  /// Sets whether outputs are stored in the cache.
  pub fn with_store_to_cache(mut self, enabled: bool) -> Self {
    self.store_to_cache = enabled;
    self
  }

  /// Sets whether outputs are written to disk.
  pub fn with_store_to_disk(mut self, enabled: bool) -> Self {
    self.store_to_disk = enabled;
    self
  }

  /// Excludes a node from cache storage.
  pub fn with_disabled_store_to_cache(mut self, node: impl Into<NodeId>) -> Self {
    self.disable_store_to_cache_nodes.insert(node.into());
    self
  }

  /// Excludes a node from disk storage.
  pub fn with_disabled_store_to_disk(mut self, node: impl Into<NodeId>) -> Self {
    self.disable_store_to_disk_nodes.insert(node.into());
    self
  }

  /// Sets the thread budget.
  pub fn with_num_threads(mut self, num_threads: usize) -> Self {
    self.num_threads = num_threads;
    self
  }

  /// Sets silent mode.
  pub fn with_silent(mut self, silent: bool) -> Self {
    self.silent = silent;
    self
  }

  /// Sets whether deactivated inputs are ignored.
  pub fn with_ignore_deactivated_inputs(mut self, enabled: bool) -> Self {
    self.ignore_deactivated_inputs = enabled;
    self
  }

  /// Sets the continue-on-failure override.
  pub fn with_continue_on_failure(mut self, value: InheritedBool) -> Self {
    self.continue_on_failure = value;
    self
  }

  /// Sets the failed-input export override.
  pub fn with_continue_on_failure_export_failed_inputs(mut self, value: InheritedBool) -> Self {
    self.continue_on_failure_export_failed_inputs = value;
    self
  }

  /// Returns true if outputs of `node` go to the cache.
  pub fn stores_to_cache(&self, node: &NodeId) -> bool {
    self.store_to_cache && !self.disable_store_to_cache_nodes.contains(node)
  }

  /// Returns true if outputs of `node` go to disk.
  pub fn stores_to_disk(&self, node: &NodeId) -> bool {
    self.store_to_disk && !self.disable_store_to_disk_nodes.contains(node)
  }

  /// Checks that the configuration can be used for a run.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.num_threads == 0 {
      return Err(ConfigError::InvalidThreadCount(self.num_threads));
    }
    if self.store_to_disk && self.output_path.is_none() {
      return Err(ConfigError::MissingOutputPath);
    }
    Ok(())
  }

  /// Loads a configuration from a JSON file. Missing fields take default values.
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
  }

  /// Saves the configuration as pretty-printed JSON.
  pub fn save_json_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(self)?;
    std::fs::write(path, json)?;
    Ok(())
  }
}
