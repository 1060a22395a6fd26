//! # Error Types
//!
//! Error taxonomy for graph construction, configuration, scheduling and queued
//! execution.
//!
//! ## Overview
//!
//! - **GraphError**: invalid graph construction (duplicate nodes, unknown slots)
//! - **ConfigError**: a run configuration that cannot be used or loaded
//! - **PartitionError**: a contradictory runtime partition assignment (fatal, pre-run)
//! - **ExportError**: writing data to disk failed
//! - **RunError**: everything that can end a pipeline run
//! - **RunnableError**: what a queued runnable reports when it is interrupted
//!
//! Node algorithms report failures as [`AlgorithmError`](crate::algorithm::AlgorithmError),
//! a boxed error that the run orchestrator catches and handles according to the
//! continue-on-failure policy. It only escapes as [`RunError::NodeFailed`] when the
//! run is aborted.

use crate::algorithm::AlgorithmError;
use crate::graph::{NodeId, SlotRef};
use std::path::PathBuf;
use thiserror::Error;

/// Error type for graph construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
  /// A node with the same id is already part of the graph.
  #[error("node '{0}' already exists")]
  DuplicateNode(NodeId),
  /// The referenced node is not part of the graph.
  #[error("node '{0}' does not exist")]
  UnknownNode(NodeId),
  /// The referenced node has no input slot with this name.
  #[error("node '{}' has no input slot '{}'", .0.node, .0.slot)]
  UnknownInputSlot(SlotRef),
  /// The referenced node has no output slot with this name.
  #[error("node '{}' has no output slot '{}'", .0.node, .0.slot)]
  UnknownOutputSlot(SlotRef),
  /// A node declares two slots with the same name and direction.
  #[error("node '{node}' declares slot '{slot}' twice")]
  DuplicateSlot {
    /// Node declaring the slot
    node: NodeId,
    /// Slot name
    slot: String,
  },
}

/// Error type for run configurations.
#[derive(Error, Debug)]
pub enum ConfigError {
  /// `store_to_disk` is enabled but no output path was set.
  #[error("storing to disk requires an output path")]
  MissingOutputPath,
  /// The thread budget must allow at least one thread.
  #[error("thread budget must be at least 1, got {0}")]
  InvalidThreadCount(usize),
  /// Reading or writing the configuration file failed.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  /// The configuration file is not valid JSON for a run configuration.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Error type for partition graph construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
  /// The partition graph contains a cycle; the runtime partition assignment is
  /// contradictory and the run cannot be ordered.
  #[error("partition graph contains a cycle through partition {partition}")]
  Cycle {
    /// Index of a partition on the cycle
    partition: usize,
  },
}

/// Error type for exporting data to disk.
#[derive(Error, Debug)]
pub enum ExportError {
  /// Creating a directory or writing a file failed.
  #[error("could not write '{}': {source}", .path.display())]
  Io {
    /// Path that could not be written
    path: PathBuf,
    /// Underlying I/O error
    #[source]
    source: std::io::Error,
  },
  /// The data could not be serialized.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Error type for pipeline runs.
#[derive(Error, Debug)]
pub enum RunError {
  /// The run configuration is invalid.
  #[error("invalid run configuration: {0}")]
  Configuration(#[from] ConfigError),
  /// The partition graph could not be ordered.
  #[error(transparent)]
  Partition(#[from] PartitionError),
  /// No vertex of a partition's data-flow graph is ready although vertices remain.
  #[error("no executable vertex left in partition {partition}; the graph contains a cycle")]
  DataFlowCycle {
    /// Index of the partition
    partition: usize,
  },
  /// A node failed and continue-on-failure is not active for its partition.
  #[error("node '{node}' failed: {source}")]
  NodeFailed {
    /// Node that failed
    node: NodeId,
    /// Error returned by the algorithm
    #[source]
    source: AlgorithmError,
  },
  /// The run was cancelled.
  #[error("the run was cancelled")]
  Cancelled,
  /// Writing outputs to disk failed.
  #[error(transparent)]
  Export(#[from] ExportError),
  /// Any other I/O failure (output directory, log file).
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl RunError {
  /// Returns true if the error signals a user-initiated cancellation.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, RunError::Cancelled)
  }
}

/// Error reported by an interrupted runnable.
///
/// Cancellation is reported as its own variant, separate from failures.
#[derive(Error, Debug)]
pub enum RunnableError {
  /// The runnable was cancelled, either while queued or while running.
  #[error("cancelled")]
  Cancelled,
  /// The runnable returned an error.
  #[error("failed: {0}")]
  Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
  /// The runnable panicked.
  #[error("panicked: {0}")]
  Panicked(String),
}

impl RunnableError {
  /// Returns true if the runnable was cancelled.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, RunnableError::Cancelled)
  }
}

impl From<RunError> for RunnableError {
  fn from(error: RunError) -> Self {
    match error {
      RunError::Cancelled => RunnableError::Cancelled,
      other => RunnableError::Failed(Box::new(other)),
    }
  }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
