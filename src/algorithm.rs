//! # Node Algorithms
//!
//! The minimal contract the scheduler needs to drive a node: given the data gathered
//! on its input slots, produce data for its output slots. What an algorithm computes
//! is up to the implementation.
//!
//! ## Example
//!
//! ```rust
//! use runweave::algorithm::{algorithm_fn, Algorithm};
//! use runweave::data::{DataTable, SlotData};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! // Algorithm that doubles every integer row of its "in" slot
//! let double: Arc<dyn Algorithm> = algorithm_fn(|mut inputs: SlotData| {
//!   let input = inputs.remove("in").unwrap_or_default();
//!   let doubled: DataTable = input
//!     .rows()
//!     .iter()
//!     .filter_map(|row| row.as_i64())
//!     .map(|value| json!(value * 2))
//!     .collect();
//!   let mut outputs = SlotData::new();
//!   outputs.insert("out".to_string(), doubled);
//!   Ok(outputs)
//! });
//! ```

use crate::data::SlotData;
use crate::graph::NodeId;
use crate::progress::ProgressInfo;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Error type for algorithm execution.
pub type AlgorithmError = Box<dyn std::error::Error + Send + Sync>;

/// Per-node execution context handed to [`Algorithm::execute`].
#[derive(Clone, Debug)]
pub struct RunContext {
  /// Node being executed.
  pub node: NodeId,
  /// Number of threads the algorithm may use internally.
  pub num_threads: usize,
  /// Root output directory of the run, if any.
  pub output_path: Option<PathBuf>,
  /// Scratch directory for temporary files (`<output_path>/_scratch`), if any.
  pub scratch_dir: Option<PathBuf>,
}

/// The workload of an algorithm node.
///
/// Implementations should poll [`ProgressInfo::is_cancelled`] during long-running
/// work and return early when it is set; the run orchestrator only checks for
/// cancellation between nodes.
#[async_trait]
pub trait Algorithm: Send + Sync {
  /// Executes the algorithm.
  ///
  /// # Arguments
  ///
  /// * `inputs` - Gathered input data, one table per input slot. Slots that received
  ///   no data hold an empty table.
  /// * `context` - Execution context (thread budget, directories)
  /// * `progress` - Progress handle scoped to this node
  ///
  /// # Returns
  ///
  /// Data per output slot. Output slots missing from the map are treated as empty.
  async fn execute(
    &self,
    inputs: SlotData,
    context: &RunContext,
    progress: &ProgressInfo,
  ) -> Result<SlotData, AlgorithmError>;
}

/// Wrapper that implements `Algorithm` for synchronous closures.
struct FnAlgorithm<F> {
  function: F,
}

#[async_trait]
impl<F> Algorithm for FnAlgorithm<F>
where
  F: Fn(SlotData) -> Result<SlotData, AlgorithmError> + Send + Sync,
{
  async fn execute(
    &self,
    inputs: SlotData,
    _context: &RunContext,
    _progress: &ProgressInfo,
  ) -> Result<SlotData, AlgorithmError> {
    (self.function)(inputs)
  }
}

/// Creates an algorithm from a synchronous closure over the slot data.
pub fn algorithm_fn<F>(function: F) -> Arc<dyn Algorithm>
where
  F: Fn(SlotData) -> Result<SlotData, AlgorithmError> + Send + Sync + 'static,
{
  Arc::new(FnAlgorithm { function })
}
