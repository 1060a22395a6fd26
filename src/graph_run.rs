//! # Run Orchestrator
//!
//! [`GraphRun`] executes a pipeline graph once. It takes a private copy of the graph,
//! splits it into partitions ([`crate::partition`]), orders the partitions and, per
//! partition, walks the data-flow graph ([`crate::dataflow`]) vertex by vertex:
//!
//! - **Input vertex**: gather data from every producer output still held in memory.
//! - **Node vertex**: deactivate, restore from cache, or execute the node.
//! - **Output vertex**: mark the output as produced.
//!
//! Every step informs the GC graph ([`crate::gc`]), and outputs it releases are
//! dropped from memory immediately.
//!
//! ## Failure Handling
//!
//! A failing node aborts the run with [`RunError::NodeFailed`] unless
//! continue-on-failure is active for its runtime partition. When continuing, the node
//! is recorded as failed, nodes depending on it are deactivated and unrelated nodes
//! still run. Optionally, the inputs of the failed node are exported to
//! `<output_path>/_error/<id>/` together with a `graph.json` describing the
//! partition.
//!
//! ## Example
//!
//! ```rust,no_run
//! use runweave::algorithm::algorithm_fn;
//! use runweave::config::RunConfiguration;
//! use runweave::data::SlotData;
//! use runweave::graph::{Graph, GraphNode};
//! use runweave::graph_run::GraphRun;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = Graph::new();
//! graph.add_node(GraphNode::algorithm("a", algorithm_fn(|_: SlotData| Ok(SlotData::new()))))?;
//!
//! let run = GraphRun::new(&graph, RunConfiguration::default().with_output_path("/tmp/run"));
//! let report = run.execute().await?;
//! println!("{:?}", report.status());
//! # Ok(())
//! # }
//! ```

use crate::algorithm::{AlgorithmError, RunContext};
use crate::cache::Cache;
use crate::config::RunConfiguration;
use crate::data::{DataTable, SlotData};
use crate::dataflow::{FlowVertex, build_data_flow_graph};
use crate::error::{ExportError, RunError, RunnableError, panic_message};
use crate::export::{self, DataExporter, JsonDataExporter, slot_directory};
use crate::gc::{GcGraph, build_gc_graph};
use crate::graph::{Graph, GraphNode, NodeId, NodeKind, SlotRef};
use crate::partition::{Partition, build_partition_graph};
use crate::progress::ProgressInfo;
use crate::queue::Runnable;
use crate::runtime_partition::{RuntimePartition, RuntimePartitions};
use async_trait::async_trait;
use chrono::Local;
use futures::FutureExt;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Directory below the output path that receives inputs of failed nodes.
pub const ERROR_DIRECTORY: &str = "_error";
/// Directory below the output path handed to algorithms for temporary files.
pub const SCRATCH_DIRECTORY: &str = "_scratch";
/// File the progress log is written to after the run.
pub const LOG_FILE: &str = "log.txt";

/// Lifecycle state of a [`GraphRun`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
  /// Not started.
  Idle,
  /// Building the partition graph.
  Partitioning,
  /// Running a graph that forms a single partition.
  SinglePartition,
  /// Running several partitions in dependency order.
  MultiPartition,
  /// The run finished, possibly with failed nodes.
  Completed,
  /// The run was aborted.
  Failed,
}

/// What happened to a node during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeOutcome {
  /// The node was executed.
  Executed,
  /// The node's outputs were restored from the cache.
  LoadedFromCache,
  /// The node did not run. Contains the reason.
  Deactivated(String),
  /// The node failed and the run continued. Contains the error message.
  Failed(String),
}

impl NodeOutcome {
  /// Returns true if the node produced no outputs.
  pub fn is_inactive(&self) -> bool {
    matches!(self, NodeOutcome::Deactivated(_) | NodeOutcome::Failed(_))
  }
}

/// Overall result of a run that was not aborted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
  /// Every active node succeeded.
  Completed,
  /// At least one node failed under continue-on-failure.
  CompletedWithFailures,
}

/// Summary of a finished run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
  outcomes: BTreeMap<NodeId, NodeOutcome>,
  partition_count: usize,
  duration: Duration,
}

impl RunReport {
  /// Returns the outcome of a node, if it was reached.
  pub fn outcome(&self, node: &str) -> Option<&NodeOutcome> {
    self.outcomes.get(node)
  }

  /// Returns all outcomes ordered by node id.
  pub fn outcomes(&self) -> &BTreeMap<NodeId, NodeOutcome> {
    &self.outcomes
  }

  /// Returns the number of partitions the graph was split into.
  pub fn partition_count(&self) -> usize {
    self.partition_count
  }

  /// Returns the wall-clock duration of the run.
  pub fn duration(&self) -> Duration {
    self.duration
  }

  /// Returns the nodes that failed.
  pub fn failed_nodes(&self) -> Vec<&NodeId> {
    self
      .outcomes
      .iter()
      .filter(|(_, outcome)| matches!(outcome, NodeOutcome::Failed(_)))
      .map(|(node, _)| node)
      .collect()
  }

  /// Returns the overall status.
  pub fn status(&self) -> RunStatus {
    if self
      .outcomes
      .values()
      .any(|outcome| matches!(outcome, NodeOutcome::Failed(_)))
    {
      RunStatus::CompletedWithFailures
    } else {
      RunStatus::Completed
    }
  }
}

/// Working state of one execution: data held in memory, GC bookkeeping and
/// outcomes.
struct RunSession {
  gc: GcGraph,
  outputs: HashMap<SlotRef, DataTable>,
  inputs: HashMap<SlotRef, DataTable>,
  outcomes: BTreeMap<NodeId, NodeOutcome>,
}

impl RunSession {
  fn new(graph: &Graph) -> Self {
    let all_nodes: BTreeSet<NodeId> = graph.node_ids().cloned().collect();
    Self {
      gc: build_gc_graph(graph, &all_nodes),
      outputs: HashMap::new(),
      inputs: HashMap::new(),
      outcomes: BTreeMap::new(),
    }
  }

  fn release(&mut self, released: Vec<SlotRef>) {
    for output in released {
      if let Some(table) = self.outputs.remove(&output) {
        debug!(output = %output, rows = table.len(), "releasing output");
      }
    }
  }

  fn gather_input(&mut self, graph: &Graph, input: &SlotRef) {
    let sources: Vec<SlotRef> = graph
      .incoming_edges(input)
      .map(|edge| edge.source.clone())
      .collect();
    let mut table = DataTable::new();
    for source in sources {
      if let Some(data) = self.outputs.get(&source) {
        table.extend_from(data);
      }
      let released = self.gc.remove_output_to_input_edge(&source, input);
      self.release(released);
    }
    self.inputs.insert(input.clone(), table);
  }

  fn take_inputs(&mut self, node: &GraphNode) -> SlotData {
    let inputs = node
      .input_refs()
      .map(|input| {
        let table = self.inputs.remove(&input).unwrap_or_default();
        (input.slot, table)
      })
      .collect();
    let released = self.gc.remove_input_to_node_edge(node.id());
    self.release(released);
    inputs
  }

  fn store_outputs(&mut self, node: &GraphNode, mut outputs: SlotData) {
    for output in node.output_refs() {
      let table = outputs.remove(&output.slot).unwrap_or_default();
      self.outputs.insert(output, table);
    }
  }

  fn finish_output(&mut self, output: &SlotRef) {
    let released = self.gc.remove_node_to_output_edge(output);
    self.release(released);
  }

  fn clear_buffers(&mut self, progress: &ProgressInfo) {
    for (slot, table) in self.inputs.drain().chain(self.outputs.drain()) {
      if !table.is_empty() {
        progress.log(format!(
          "[!] Slot {} still contains {} rows. Clearing in post-processing.",
          slot,
          table.len()
        ));
      }
    }
  }
}

// Finishes a run whose future was dropped before `execute` returned.
struct AbortGuard<'a> {
  run: &'a GraphRun,
  armed: bool,
}

impl Drop for AbortGuard<'_> {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    self.run.set_state(RunState::Failed);
    self.run.progress.log("Run aborted: interrupted");
    if let Err(err) = self.run.write_log() {
      warn!(error = %err, "could not write run log");
    }
  }
}

/// A single execution of a pipeline graph.
pub struct GraphRun {
  graph: Graph,
  configuration: RunConfiguration,
  runtime_partitions: RuntimePartitions,
  cache: Option<Arc<dyn Cache>>,
  exporter: Arc<dyn DataExporter>,
  progress: ProgressInfo,
  state: Mutex<RunState>,
  report: Mutex<Option<RunReport>>,
}

impl std::fmt::Debug for GraphRun {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("GraphRun")
      .field("nodes", &self.graph.node_count())
      .field("configuration", &self.configuration)
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}

impl GraphRun {
  /// Creates a run over a copy of `graph`. Later changes to `graph` do not affect
  /// the run.
  pub fn new(graph: &Graph, configuration: RunConfiguration) -> Self {
    Self {
      graph: graph.clone(),
      configuration,
      runtime_partitions: RuntimePartitions::default(),
      cache: None,
      exporter: Arc::new(JsonDataExporter),
      progress: ProgressInfo::new(),
      state: Mutex::new(RunState::Idle),
      report: Mutex::new(None),
    }
  }

  /// Sets the cache used for loading and storing outputs.
  pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
    self.cache = Some(cache);
    self
  }

  /// Sets the exporter used for disk output.
  pub fn with_exporter(mut self, exporter: Arc<dyn DataExporter>) -> Self {
    self.exporter = exporter;
    self
  }

  /// Sets the runtime partition registry.
  pub fn with_runtime_partitions(mut self, runtime_partitions: RuntimePartitions) -> Self {
    self.runtime_partitions = runtime_partitions;
    self
  }

  /// Sets the progress handle, e.g. to share its cancellation token.
  pub fn with_progress_info(mut self, progress: ProgressInfo) -> Self {
    self.progress = progress;
    self
  }

  /// Returns the graph copy the run operates on.
  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Returns the configuration.
  pub fn configuration(&self) -> &RunConfiguration {
    &self.configuration
  }

  /// Returns the progress handle.
  pub fn progress(&self) -> &ProgressInfo {
    &self.progress
  }

  /// Returns the current lifecycle state.
  pub fn state(&self) -> RunState {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Returns the report of the last successful execution.
  pub fn report(&self) -> Option<RunReport> {
    self
      .report
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  fn set_state(&self, state: RunState) {
    debug!(?state, "GraphRun state");
    *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
  }

  /// Executes the run.
  ///
  /// # Errors
  ///
  /// - [`RunError::Configuration`] if the configuration is invalid
  /// - [`RunError::Partition`] if the partitions depend on each other in a cycle; no
  ///   node runs in that case
  /// - [`RunError::DataFlowCycle`] if a partition cannot be ordered
  /// - [`RunError::NodeFailed`] if a node fails without continue-on-failure
  /// - [`RunError::Cancelled`] if the progress handle was cancelled
  /// - [`RunError::Export`] or [`RunError::Io`] if writing outputs fails
  pub async fn execute(&self) -> Result<RunReport, RunError> {
    let started = Instant::now();
    let mut guard = AbortGuard {
      run: self,
      armed: true,
    };
    let result = self.execute_partitions(started).await;
    guard.armed = false;
    match &result {
      Ok(report) => {
        self.set_state(RunState::Completed);
        *self.report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        self.progress.log(format!(
          "Run ending at {}",
          Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
      }
      Err(err) => {
        self.set_state(RunState::Failed);
        self.progress.log(format!("Run aborted: {}", err));
        if !self.configuration.silent && !err.is_cancelled() {
          error!(error = %err, "pipeline run failed");
        }
      }
    }
    self.progress.log(format!(
      "Required {:.3}s to execute.",
      started.elapsed().as_secs_f64()
    ));
    if let Err(err) = self.write_log() {
      warn!(error = %err, "could not write run log");
      if result.is_ok() {
        return Err(err);
      }
    }
    result
  }

  async fn execute_partitions(&self, started: Instant) -> Result<RunReport, RunError> {
    self.configuration.validate()?;
    let progress = &self.progress;
    if !self.configuration.silent {
      progress.log(format!("runweave {}", env!("CARGO_PKG_VERSION")));
      progress.log(format!("Threads: {}", self.configuration.num_threads));
    }
    progress.log(format!(
      "Run starting at {}",
      Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    if let Some(output_path) = &self.configuration.output_path {
      std::fs::create_dir_all(output_path)?;
      std::fs::create_dir_all(output_path.join(SCRATCH_DIRECTORY))?;
      if self.configuration.store_to_disk {
        progress.log(format!("Outputs will be written to {}", output_path.display()));
      }
    }

    self.set_state(RunState::Partitioning);
    let partition_graph = build_partition_graph(&self.graph);
    progress.log(format!(
      "Partition graph has {} partitions and {} dependencies",
      partition_graph.len(),
      partition_graph.edge_count()
    ));
    let order: Vec<&Partition> = match partition_graph.len() {
      0 => {
        progress.log("Nothing to do");
        Vec::new()
      }
      1 => {
        self.set_state(RunState::SinglePartition);
        partition_graph.partitions().collect()
      }
      _ => {
        let order = partition_graph.topological_order()?;
        self.set_state(RunState::MultiPartition);
        order
      }
    };

    let mut session = RunSession::new(&self.graph);
    let mut result = Ok(());
    for partition in order {
      result = self.run_partition(&mut session, partition).await;
      if result.is_err() {
        break;
      }
    }
    session.clear_buffers(progress);
    result?;

    let report = RunReport {
      outcomes: session.outcomes,
      partition_count: partition_graph.len(),
      duration: started.elapsed(),
    };
    info!(
      partitions = report.partition_count,
      nodes = report.outcomes.len(),
      status = ?report.status(),
      "pipeline run finished"
    );
    Ok(report)
  }

  async fn run_partition(&self, session: &mut RunSession, partition: &Partition) -> Result<(), RunError> {
    let runtime = self.runtime_partitions.get(partition.runtime_partition());
    let progress = self.progress.resolve(format!("Partition {}", partition.index()));
    progress.log(format!(
      "Running {} nodes in runtime partition {}",
      partition.len(),
      self.runtime_partitions.full_name(partition.runtime_partition())
    ));

    let mut flow = build_data_flow_graph(&self.graph, partition.nodes());
    let total = flow.len();
    while !flow.is_empty() {
      if progress.is_cancelled() {
        return Err(RunError::Cancelled);
      }
      let Some(vertex) = flow.next_vertex() else {
        return Err(RunError::DataFlowCycle {
          partition: partition.index(),
        });
      };
      flow.remove_vertex(&vertex);
      match &vertex {
        FlowVertex::Input(input) => session.gather_input(&self.graph, input),
        FlowVertex::Node(node) => {
          self
            .run_node(session, node, partition, runtime, &progress)
            .await?
        }
        FlowVertex::Output(output) => session.finish_output(output),
      }
      progress.set_progress(total - flow.len(), total);
    }
    Ok(())
  }

  async fn run_node(
    &self,
    session: &mut RunSession,
    id: &NodeId,
    partition: &Partition,
    runtime: &RuntimePartition,
    progress: &ProgressInfo,
  ) -> Result<(), RunError> {
    let Some(node) = self.graph.node(id.as_str()) else {
      return Ok(());
    };
    let progress = progress.resolve(node.name());
    let inputs = session.take_inputs(node);

    if let Some(reason) = switched_off_reason(node) {
      // Switched-off nodes still provide their cached results to their consumers.
      if let Some(cached) = self.cached_outputs(node) {
        progress.log(format!("{}, outputs restored from cache", reason));
        return self.restore_from_cache(session, node, cached, runtime);
      }
      deactivate(session, id, reason, &progress);
      return Ok(());
    }
    if let Some(reason) = self.inactive_input_reason(session, node) {
      deactivate(session, id, reason, &progress);
      return Ok(());
    }

    let algorithm = match node.kind() {
      NodeKind::PassThrough => {
        let outputs = forward_inputs(node, inputs);
        session.store_outputs(node, outputs);
        session.outcomes.insert(id.clone(), NodeOutcome::Executed);
        return Ok(());
      }
      NodeKind::Algorithm(algorithm) => Arc::clone(&algorithm.algorithm),
    };

    if let Some(cached) = self.cached_outputs(node) {
      progress.log("Outputs restored from cache");
      return self.restore_from_cache(session, node, cached, runtime);
    }

    let failed_inputs = self.exports_failed_inputs(runtime).then(|| inputs.clone());
    let context = RunContext {
      node: id.clone(),
      num_threads: self.configuration.num_threads,
      output_path: self.configuration.output_path.clone(),
      scratch_dir: self
        .configuration
        .output_path
        .as_ref()
        .map(|path| path.join(SCRATCH_DIRECTORY)),
    };
    progress.log("Executing");
    let result = AssertUnwindSafe(algorithm.execute(inputs, &context, &progress))
      .catch_unwind()
      .await
      .unwrap_or_else(|panic| {
        Err(AlgorithmError::from(format!(
          "algorithm panicked: {}",
          panic_message(panic.as_ref())
        )))
      });

    match result {
      Ok(outputs) => {
        self.store_to_cache(node, &outputs);
        self.store_to_disk(node, &outputs, runtime)?;
        session.store_outputs(node, outputs);
        session.outcomes.insert(id.clone(), NodeOutcome::Executed);
        Ok(())
      }
      Err(err) => self.handle_failure(session, node, err, failed_inputs, partition, runtime, &progress),
    }
  }

  fn cached_outputs(&self, node: &GraphNode) -> Option<SlotData> {
    if !self.configuration.load_from_cache {
      return None;
    }
    self.query_cache(node)
  }

  fn restore_from_cache(
    &self,
    session: &mut RunSession,
    node: &GraphNode,
    cached: SlotData,
    runtime: &RuntimePartition,
  ) -> Result<(), RunError> {
    self.store_to_disk(node, &cached, runtime)?;
    session.store_outputs(node, cached);
    session
      .outcomes
      .insert(node.id().clone(), NodeOutcome::LoadedFromCache);
    Ok(())
  }

  fn inactive_input_reason(&self, session: &RunSession, node: &GraphNode) -> Option<String> {
    if self.configuration.ignore_deactivated_inputs {
      return None;
    }
    for input in node.input_refs() {
      if node.input(&input.slot).is_some_and(|slot| slot.optional) {
        continue;
      }
      for edge in self.graph.incoming_edges(&input) {
        if session
          .outcomes
          .get(&edge.source.node)
          .is_some_and(NodeOutcome::is_inactive)
        {
          return Some(format!(
            "input '{}' depends on inactive node '{}'",
            input.slot, edge.source.node
          ));
        }
      }
    }
    None
  }

  fn query_cache(&self, node: &GraphNode) -> Option<SlotData> {
    let cache = self.cache.as_ref()?;
    if node.outputs().is_empty() {
      return None;
    }
    let mut cached = cache.query(node.id());
    let mut outputs = SlotData::new();
    for slot in node.outputs() {
      let table = cached.remove(&slot.name).filter(|table| !table.is_empty())?;
      outputs.insert(slot.name.clone(), table);
    }
    Some(outputs)
  }

  fn store_to_cache(&self, node: &GraphNode, outputs: &SlotData) {
    let Some(cache) = &self.cache else {
      return;
    };
    if !self.configuration.stores_to_cache(node.id()) {
      return;
    }
    for slot in node.outputs() {
      let table = outputs.get(&slot.name).cloned().unwrap_or_default();
      cache.store(node.id(), &slot.name, table);
    }
  }

  fn store_to_disk(&self, node: &GraphNode, outputs: &SlotData, runtime: &RuntimePartition) -> Result<(), RunError> {
    let Some(output_path) = &self.configuration.output_path else {
      return Ok(());
    };
    if !self.configuration.stores_to_disk(node.id()) {
      return Ok(());
    }
    for slot in node.outputs() {
      let exported = if slot.data_type.heavy {
        runtime.output.export_heavy_data
      } else {
        runtime.output.export_lightweight_data
      };
      let Some(table) = outputs.get(&slot.name) else {
        continue;
      };
      if !exported || table.is_empty() {
        continue;
      }
      let directory = slot_directory(output_path, node.id().as_str(), &slot.name);
      self.exporter.export(table, &directory)?;
    }
    Ok(())
  }

  fn continues_on_failure(&self, runtime: &RuntimePartition) -> bool {
    self
      .configuration
      .continue_on_failure
      .resolve(runtime.continue_on_failure.continue_on_failure)
  }

  fn exports_failed_inputs(&self, runtime: &RuntimePartition) -> bool {
    self.continues_on_failure(runtime)
      && self
        .configuration
        .continue_on_failure_export_failed_inputs
        .resolve(runtime.continue_on_failure.export_failed_inputs)
  }

  #[allow(clippy::too_many_arguments)]
  fn handle_failure(
    &self,
    session: &mut RunSession,
    node: &GraphNode,
    err: AlgorithmError,
    failed_inputs: Option<SlotData>,
    partition: &Partition,
    runtime: &RuntimePartition,
    progress: &ProgressInfo,
  ) -> Result<(), RunError> {
    if progress.is_cancelled() {
      return Err(RunError::Cancelled);
    }
    if !self.continues_on_failure(runtime) {
      progress.log(format!("Failed: {}", err));
      return Err(RunError::NodeFailed {
        node: node.id().clone(),
        source: err,
      });
    }

    let message = err.to_string();
    progress.log("------------------------------------------------------------");
    progress.log(format!("Node '{}' failed: {}", node.name(), message));
    progress.log("Continuing with the remaining nodes; dependent nodes are deactivated.");
    progress.log("------------------------------------------------------------");
    if !self.configuration.silent {
      error!(node = %node.id(), error = %message, "node failed, continuing");
    }
    if let Some(inputs) = failed_inputs {
      self.export_failed_inputs(node, &inputs, partition, progress)?;
    }
    session
      .outcomes
      .insert(node.id().clone(), NodeOutcome::Failed(message));
    Ok(())
  }

  fn export_failed_inputs(
    &self,
    node: &GraphNode,
    inputs: &SlotData,
    partition: &Partition,
    progress: &ProgressInfo,
  ) -> Result<(), RunError> {
    let Some(output_path) = &self.configuration.output_path else {
      progress.log("No output path set, inputs of the failed node are not exported");
      return Ok(());
    };
    let directory = output_path
      .join(ERROR_DIRECTORY)
      .join(format!("{:016x}", rand::random::<u64>()));
    export::create_dir_all(&directory)?;
    for (slot, table) in inputs {
      self
        .exporter
        .export(table, &slot_directory(&directory, node.id().as_str(), slot))?;
    }
    write_graph_description(&self.graph.extract(partition.nodes()), &directory)?;
    progress.log(format!("Inputs of the failed node exported to {}", directory.display()));
    Ok(())
  }

  fn write_log(&self) -> Result<(), RunError> {
    let Some(output_path) = &self.configuration.output_path else {
      return Ok(());
    };
    std::fs::create_dir_all(output_path)?;
    std::fs::write(log_file(output_path), self.progress.log_text())?;
    Ok(())
  }
}

fn log_file(output_path: &Path) -> PathBuf {
  output_path.join(LOG_FILE)
}

fn write_graph_description(graph: &Graph, directory: &Path) -> Result<(), ExportError> {
  let path = directory.join("graph.json");
  let json = serde_json::to_string_pretty(&graph.describe())?;
  std::fs::write(&path, json).map_err(|source| ExportError::Io { path, source })
}

fn switched_off_reason(node: &GraphNode) -> Option<String> {
  let NodeKind::Algorithm(algorithm) = node.kind() else {
    return None;
  };
  if !algorithm.enabled {
    Some("node is disabled".to_string())
  } else if algorithm.skipped {
    Some("node is skipped".to_string())
  } else {
    None
  }
}

fn deactivate(session: &mut RunSession, id: &NodeId, reason: String, progress: &ProgressInfo) {
  progress.log(format!("Deactivated: {}", reason));
  session
    .outcomes
    .insert(id.clone(), NodeOutcome::Deactivated(reason));
}

/// Forwards the i-th input of a pass-through node to its i-th output.
fn forward_inputs(node: &GraphNode, mut inputs: SlotData) -> SlotData {
  node
    .outputs()
    .iter()
    .enumerate()
    .map(|(position, output)| {
      let table = node
        .inputs()
        .get(position)
        .and_then(|input| inputs.remove(&input.name))
        .unwrap_or_default();
      (output.name.clone(), table)
    })
    .collect()
}

#[async_trait]
impl Runnable for GraphRun {
  fn task_label(&self) -> String {
    "Pipeline run".to_string()
  }

  fn progress_info(&self) -> ProgressInfo {
    self.progress.clone()
  }

  async fn run(&self) -> Result<(), RunnableError> {
    self.execute().await.map(|_| ()).map_err(RunnableError::from)
  }
}
