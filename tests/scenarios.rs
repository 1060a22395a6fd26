//! End-to-end pipeline runs through the public API.

use async_trait::async_trait;
use runweave::algorithm::{Algorithm, AlgorithmError, RunContext, algorithm_fn};
use runweave::cache::MemoryCache;
use runweave::data::{DataTable, SlotData};
use runweave::error::{PartitionError, RunError};
use runweave::graph_run::{LOG_FILE, RunState};
use runweave::partition::build_partition_graph;
use runweave::progress::ProgressInfo;
use runweave::runtime_partition::{RuntimePartition, RuntimePartitions};
use runweave::{
  DataType, Graph, GraphNode, GraphRun, InheritedBool, NodeOutcome, RunConfiguration, RunStatus, RunnableQueue,
  SlotRef, WorkerState,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tempfile::TempDir;

// Algorithm that emits one row on "out" and counts its executions
struct Source {
  calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Algorithm for Source {
  async fn execute(
    &self,
    _inputs: SlotData,
    context: &RunContext,
    _progress: &ProgressInfo,
  ) -> Result<SlotData, AlgorithmError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let mut outputs = SlotData::new();
    outputs.insert(
      "out".to_string(),
      DataTable::from_rows(vec![json!({ "node": context.node.as_str() })]),
    );
    Ok(outputs)
  }
}

// Algorithm that blocks until the run is cancelled
struct WaitForCancel;

#[async_trait]
impl Algorithm for WaitForCancel {
  async fn execute(
    &self,
    _inputs: SlotData,
    _context: &RunContext,
    progress: &ProgressInfo,
  ) -> Result<SlotData, AlgorithmError> {
    progress.cancellation_token().cancelled().await;
    Err("cancelled".into())
  }
}

// Algorithm that never returns, even when cancelled
struct Stuck {
  started: Arc<Notify>,
}

#[async_trait]
impl Algorithm for Stuck {
  async fn execute(
    &self,
    _inputs: SlotData,
    _context: &RunContext,
    _progress: &ProgressInfo,
  ) -> Result<SlotData, AlgorithmError> {
    self.started.notify_one();
    std::future::pending::<()>().await;
    Ok(SlotData::new())
  }
}

fn source(calls: &Arc<AtomicUsize>) -> Arc<dyn Algorithm> {
  Arc::new(Source {
    calls: Arc::clone(calls),
  })
}

fn image() -> DataType {
  DataType::heavy("image")
}

/// Adds a node with an "in" and an "out" slot.
fn add_step(graph: &mut Graph, id: &str, algorithm: Arc<dyn Algorithm>, tag: Option<&str>) {
  let node = GraphNode::algorithm(id, algorithm)
    .with_input("in", image())
    .with_output("out", image());
  let node = match tag {
    Some(tag) => node.in_partition(tag),
    None => node,
  };
  graph.add_node(node).unwrap();
}

fn link(graph: &mut Graph, from: &str, to: &str) {
  graph
    .connect(SlotRef::new(from, "out"), SlotRef::new(to, "in"))
    .unwrap();
}

#[tokio::test]
async fn two_untagged_nodes_run_as_one_partition() {
  let dir = TempDir::new().unwrap();
  let calls = Arc::new(AtomicUsize::new(0));
  let mut graph = Graph::new();
  add_step(&mut graph, "first", source(&calls), None);
  add_step(&mut graph, "second", source(&calls), None);
  link(&mut graph, "first", "second");

  let partitions = build_partition_graph(&graph);
  assert_eq!(partitions.len(), 1);
  assert_eq!(partitions.edge_count(), 0);

  let report = GraphRun::new(&graph, RunConfiguration::default().with_output_path(dir.path()))
    .execute()
    .await
    .unwrap();
  assert_eq!(report.status(), RunStatus::Completed);
  assert_eq!(calls.load(Ordering::SeqCst), 2);
  assert!(dir.path().join("first/out/data.json").is_file());
  assert!(dir.path().join("second/out/data.json").is_file());
}

#[tokio::test]
async fn alternating_tags_run_three_partitions_in_order() {
  let calls = Arc::new(AtomicUsize::new(0));
  let mut graph = Graph::new();
  add_step(&mut graph, "a", source(&calls), Some("p1"));
  add_step(&mut graph, "b", source(&calls), Some("p2"));
  add_step(&mut graph, "c", source(&calls), Some("p1"));
  link(&mut graph, "a", "b");
  link(&mut graph, "b", "c");

  let partitions = build_partition_graph(&graph);
  assert_eq!(partitions.len(), 3);
  let a = partitions.partition_of("a").unwrap().index();
  let b = partitions.partition_of("b").unwrap().index();
  let c = partitions.partition_of("c").unwrap().index();
  assert!(partitions.has_edge(a, b));
  assert!(partitions.has_edge(b, c));

  let run = GraphRun::new(&graph, RunConfiguration::default());
  let report = run.execute().await.unwrap();
  assert_eq!(report.partition_count(), 3);
  assert_eq!(calls.load(Ordering::SeqCst), 3);
  let log = run.progress().log_text();
  let first = log.find("Partition 0").unwrap();
  let last = log.find("Partition 2").unwrap();
  assert!(first < last);
}

#[tokio::test]
async fn disabled_disk_storage_still_caches() {
  let dir = TempDir::new().unwrap();
  let calls = Arc::new(AtomicUsize::new(0));
  let mut graph = Graph::new();
  add_step(&mut graph, "kept", source(&calls), None);
  add_step(&mut graph, "preview", source(&calls), None);
  link(&mut graph, "kept", "preview");

  let cache = Arc::new(MemoryCache::new());
  let config = RunConfiguration::default()
    .with_output_path(dir.path())
    .with_store_to_cache(true)
    .with_disabled_store_to_disk("preview");
  GraphRun::new(&graph, config)
    .with_cache(cache.clone())
    .execute()
    .await
    .unwrap();

  assert!(!dir.path().join("preview").exists());
  assert!(dir.path().join("kept/out/data.json").is_file());
  assert!(cache.contains("preview", "out"));
}

#[tokio::test]
async fn partition_continue_on_failure_deactivates_dependents_only() {
  let calls = Arc::new(AtomicUsize::new(0));
  let broken = algorithm_fn(|_: SlotData| Err(AlgorithmError::from("broken input")));
  let mut graph = Graph::new();
  add_step(&mut graph, "src", source(&calls), Some("lenient"));
  add_step(&mut graph, "broken", broken, Some("lenient"));
  add_step(&mut graph, "after", source(&calls), Some("lenient"));
  add_step(&mut graph, "unrelated", source(&calls), Some("lenient"));
  link(&mut graph, "src", "broken");
  link(&mut graph, "broken", "after");
  link(&mut graph, "src", "unrelated");

  let mut partitions = RuntimePartitions::default();
  partitions.insert(
    "lenient".into(),
    RuntimePartition::new("Lenient").with_continue_on_failure(true),
  );
  let report = GraphRun::new(&graph, RunConfiguration::default().with_silent(true))
    .with_runtime_partitions(partitions)
    .execute()
    .await
    .unwrap();

  assert_eq!(report.status(), RunStatus::CompletedWithFailures);
  assert!(matches!(report.outcome("broken"), Some(NodeOutcome::Failed(message)) if message == "broken input"));
  assert!(matches!(report.outcome("after"), Some(NodeOutcome::Deactivated(_))));
  assert_eq!(report.outcome("unrelated"), Some(&NodeOutcome::Executed));
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn partition_cycle_fails_before_any_node_runs() {
  // {a, c} and {b, d} depend on each other: a -> b -> c -> d, with a/c and b/d
  // joined through untagged helper nodes.
  let calls = Arc::new(AtomicUsize::new(0));
  let mut graph = Graph::new();
  add_step(&mut graph, "a", source(&calls), Some("p1"));
  add_step(&mut graph, "b", source(&calls), Some("p2"));
  add_step(&mut graph, "c", source(&calls), Some("p1"));
  add_step(&mut graph, "d", source(&calls), Some("p2"));
  add_step(&mut graph, "ac", source(&calls), None);
  add_step(&mut graph, "bd", source(&calls), None);
  for node in ["c", "d"] {
    let rebuilt = graph
      .remove_node(node)
      .unwrap()
      .with_input("link", image());
    graph.add_node(rebuilt).unwrap();
  }
  link(&mut graph, "a", "b");
  link(&mut graph, "b", "c");
  link(&mut graph, "c", "d");
  link(&mut graph, "a", "ac");
  link(&mut graph, "b", "bd");
  graph
    .connect(SlotRef::new("ac", "out"), SlotRef::new("c", "link"))
    .unwrap();
  graph
    .connect(SlotRef::new("bd", "out"), SlotRef::new("d", "link"))
    .unwrap();

  let result = GraphRun::new(&graph, RunConfiguration::default().with_silent(true))
    .execute()
    .await;
  assert!(matches!(
    result,
    Err(RunError::Partition(PartitionError::Cycle { .. }))
  ));
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelling_an_active_run_interrupts_it() {
  let dir = TempDir::new().unwrap();
  let mut graph = Graph::new();
  add_step(&mut graph, "slow", Arc::new(WaitForCancel), None);
  let config = RunConfiguration::default()
    .with_output_path(dir.path())
    .with_silent(true);
  let run = Arc::new(GraphRun::new(&graph, config));

  let queue = RunnableQueue::new("runs");
  let worker = queue.enqueue(run.clone());
  tokio::task::yield_now().await;
  assert!(queue.cancel(worker.id()));

  match worker.wait().await {
    WorkerState::Interrupted(error) => assert!(error.is_cancelled()),
    other => panic!("unexpected state {:?}", other),
  }
  assert!(run.progress().is_cancelled());
  assert_eq!(run.state(), RunState::Failed);
  let log = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
  assert!(log.contains("Run aborted: the run was cancelled"));
  assert!(log.contains("Required"));
}

#[tokio::test]
async fn run_ignoring_cancellation_is_still_finished() {
  let dir = TempDir::new().unwrap();
  let mut graph = Graph::new();
  let started = Arc::new(Notify::new());
  add_step(
    &mut graph,
    "stuck",
    Arc::new(Stuck {
      started: Arc::clone(&started),
    }),
    None,
  );
  let run = Arc::new(GraphRun::new(
    &graph,
    RunConfiguration::default().with_output_path(dir.path()),
  ));

  let queue = RunnableQueue::with_interrupt_grace("runs", Duration::from_millis(20));
  let worker = queue.enqueue(run.clone());
  started.notified().await;
  assert!(queue.cancel(worker.id()));

  let state = worker.wait().await;
  assert!(state.error().is_some_and(|error| error.is_cancelled()));
  assert_eq!(run.state(), RunState::Failed);
  let log = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
  assert!(log.contains("Run aborted: interrupted"));
}

#[tokio::test]
async fn failed_run_reports_through_queue() {
  let mut graph = Graph::new();
  add_step(
    &mut graph,
    "broken",
    algorithm_fn(|_: SlotData| Err(AlgorithmError::from("nope"))),
    None,
  );
  let config = RunConfiguration::default()
    .with_silent(true)
    .with_continue_on_failure(InheritedBool::Disable);
  let queue = RunnableQueue::new("runs");
  let worker = queue.enqueue(Arc::new(GraphRun::new(&graph, config)));
  let state = worker.wait().await;
  let error = state.error().unwrap();
  assert!(!error.is_cancelled());
  assert!(error.to_string().contains("broken"));
}
