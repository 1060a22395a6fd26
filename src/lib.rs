//! # runweave
//!
//! Partitioned, memory-aware execution of pipeline graphs.
//!
//! A pipeline is a graph of nodes connected slot to slot. Algorithm nodes may be
//! tagged with a runtime partition; runweave splits the graph at edges between
//! differently tagged algorithms, runs the resulting partitions in dependency order,
//! and inside every partition orders execution so that heavy data is produced,
//! consumed and released as early as possible.
//!
//! ## Key Features
//!
//! - **Partitioning**: connected components of the graph without cross-partition edges
//! - **Memory-aware ordering**: weighted data-flow graph favouring heavy data paths
//! - **Early release**: a GC graph tracks when outputs are no longer needed
//! - **Caching and disk output**: per-node policies, per-partition output filters
//! - **Continue-on-failure**: per-partition policy with failed-input export
//! - **Queued execution**: a FIFO queue running one cancellable run at a time
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runweave::algorithm::algorithm_fn;
//! use runweave::config::RunConfiguration;
//! use runweave::data::{DataTable, SlotData};
//! use runweave::graph::{DataType, Graph, GraphNode, SlotRef};
//! use runweave::graph_run::GraphRun;
//! use runweave::queue::RunnableQueue;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let source = algorithm_fn(|_: SlotData| {
//!   let mut outputs = SlotData::new();
//!   outputs.insert("out".to_string(), DataTable::from_rows(vec![json!(1)]));
//!   Ok(outputs)
//! });
//! let sink = algorithm_fn(|_: SlotData| Ok(SlotData::new()));
//!
//! let mut graph = Graph::new();
//! graph.add_node(GraphNode::algorithm("source", source).with_output("out", DataType::heavy("image")))?;
//! graph.add_node(GraphNode::algorithm("sink", sink).with_input("in", DataType::heavy("image")))?;
//! graph.connect(SlotRef::new("source", "out"), SlotRef::new("sink", "in"))?;
//!
//! let queue = RunnableQueue::new("runs");
//! let run = GraphRun::new(&graph, RunConfiguration::default().with_output_path("/tmp/out"));
//! let worker = queue.enqueue(Arc::new(run));
//! worker.wait().await;
//! # Ok(())
//! # }
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Node algorithm contract.
pub mod algorithm;
/// Output cache contract and in-memory cache.
pub mod cache;
/// Run configuration.
pub mod config;
/// Data tables flowing along edges.
pub mod data;
/// Data-flow graph ordering execution within a partition.
pub mod dataflow;
/// Error types.
pub mod error;
/// Disk export of output tables.
pub mod export;
/// GC graph deciding when outputs can be released.
pub mod gc;
/// Pipeline graph model.
pub mod graph;
/// Run orchestrator.
pub mod graph_run;
/// Logging setup.
pub mod logging;
/// Partition builder.
pub mod partition;
/// Progress, logging and cancellation handle.
pub mod progress;
/// Runnable queue and worker.
pub mod queue;
/// Runtime partition settings.
pub mod runtime_partition;

pub use config::{InheritedBool, RunConfiguration};
pub use error::{GraphError, PartitionError, RunError, RunnableError};
pub use graph::{DataType, Graph, GraphNode, NodeId, SlotRef};
pub use graph_run::{GraphRun, NodeOutcome, RunReport, RunStatus};
pub use queue::{QueueEvent, Runnable, RunnableId, RunnableQueue, Worker, WorkerState};

#[cfg(test)]
mod cache_test;
#[cfg(test)]
mod config_test;
#[cfg(test)]
mod queue_test;
#[cfg(test)]
mod test_support;
