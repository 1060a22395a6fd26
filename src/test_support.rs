//! Algorithms and graphs shared by the unit tests.

use crate::algorithm::{Algorithm, AlgorithmError, RunContext, algorithm_fn};
use crate::data::{DataTable, SlotData};
use crate::graph::{DataType, Graph, GraphNode, SlotRef};
use crate::progress::ProgressInfo;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Algorithm producing no data.
pub(crate) fn noop() -> Arc<dyn Algorithm> {
  algorithm_fn(|_| Ok(SlotData::new()))
}

/// Algorithm writing fixed rows to one output slot.
pub(crate) fn emit(slot: &'static str, rows: Vec<Value>) -> Arc<dyn Algorithm> {
  algorithm_fn(move |_| {
    let mut outputs = SlotData::new();
    outputs.insert(slot.to_string(), DataTable::from_rows(rows.clone()));
    Ok(outputs)
  })
}

/// Algorithm copying one input slot to one output slot.
pub(crate) fn copy(input: &'static str, output: &'static str) -> Arc<dyn Algorithm> {
  algorithm_fn(move |mut inputs| {
    let mut outputs = SlotData::new();
    outputs.insert(output.to_string(), inputs.remove(input).unwrap_or_default());
    Ok(outputs)
  })
}

/// Algorithm that always fails.
pub(crate) fn failing(message: &'static str) -> Arc<dyn Algorithm> {
  algorithm_fn(move |_| Err(AlgorithmError::from(message)))
}

/// Wraps an algorithm and counts its executions.
pub(crate) struct Counting {
  pub(crate) inner: Arc<dyn Algorithm>,
  pub(crate) calls: Arc<AtomicUsize>,
}

impl Counting {
  pub(crate) fn wrap(inner: Arc<dyn Algorithm>) -> (Arc<dyn Algorithm>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counting = Counting {
      inner,
      calls: Arc::clone(&calls),
    };
    (Arc::new(counting), calls)
  }
}

#[async_trait]
impl Algorithm for Counting {
  async fn execute(
    &self,
    inputs: SlotData,
    context: &RunContext,
    progress: &ProgressInfo,
  ) -> Result<SlotData, AlgorithmError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.inner.execute(inputs, context, progress).await
  }
}

/// `a.out -> b.in -> b.out -> c.in` with heavy slots, optionally tagged.
pub(crate) fn chain(tags: [Option<&str>; 3]) -> Graph {
  let mut graph = Graph::new();
  let nodes = [
    GraphNode::algorithm("a", emit("out", vec![json!(1), json!(2)])).with_output("out", DataType::heavy("image")),
    GraphNode::algorithm("b", copy("in", "out"))
      .with_input("in", DataType::heavy("image"))
      .with_output("out", DataType::heavy("image")),
    GraphNode::algorithm("c", noop()).with_input("in", DataType::heavy("image")),
  ];
  for (node, tag) in nodes.into_iter().zip(tags) {
    let node = match tag {
      Some(tag) => node.in_partition(tag),
      None => node,
    };
    graph.add_node(node).unwrap();
  }
  graph.connect(SlotRef::new("a", "out"), SlotRef::new("b", "in")).unwrap();
  graph.connect(SlotRef::new("b", "out"), SlotRef::new("c", "in")).unwrap();
  graph
}
