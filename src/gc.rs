//! # GC Graph
//!
//! Tracks when an output slot's data is no longer needed.
//!
//! ```text
//!   Node ──▶ Output ──▶ Input (each consumer) ──▶ Node (consumer)
//! ```
//!
//! The run removes edges as it makes progress: the producer finishing removes
//! `Node → Output`, a consumer gathering its input removes `Output → Input`, and a
//! consumer starting removes its `Input → Node` edges. An output is *released* as
//! soon as it has neither incoming nor outgoing edges; every removal returns the
//! outputs it released so the caller can drop their data.

use crate::graph::{Graph, NodeId, NodeKind, SlotRef};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::trace;

/// A vertex of the GC graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GcVertex {
  /// A node.
  Node(NodeId),
  /// An input slot.
  Input(SlotRef),
  /// An output slot.
  Output(SlotRef),
}

impl fmt::Display for GcVertex {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GcVertex::Node(node) => write!(f, "node {}", node),
      GcVertex::Input(slot) => write!(f, "input {}", slot),
      GcVertex::Output(slot) => write!(f, "output {}", slot),
    }
  }
}

/// Dependency graph deciding when outputs can be released.
#[derive(Clone, Debug, Default)]
pub struct GcGraph {
  graph: StableDiGraph<GcVertex, ()>,
  indices: HashMap<GcVertex, NodeIndex>,
  pass_through: HashSet<NodeId>,
}

impl GcGraph {
  /// Returns the number of remaining vertices.
  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  /// Returns true if no vertex remains.
  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Returns true if the output is still tracked, i.e. not yet released.
  pub fn is_tracked(&self, output: &SlotRef) -> bool {
    self.indices.contains_key(&GcVertex::Output(output.clone()))
  }

  /// Returns the outputs that are still tracked.
  pub fn tracked_outputs(&self) -> BTreeSet<SlotRef> {
    self
      .indices
      .keys()
      .filter_map(|vertex| match vertex {
        GcVertex::Output(slot) => Some(slot.clone()),
        _ => None,
      })
      .collect()
  }

  /// Returns the nodes that still consume the output, directly or through a chain of
  /// pass-through nodes. Pass-through nodes on the way are included.
  pub fn consumers_of(&self, output: &SlotRef) -> BTreeSet<NodeId> {
    let mut consumers = BTreeSet::new();
    let Some(start) = self.indices.get(&GcVertex::Output(output.clone())) else {
      return consumers;
    };
    let mut visited = HashSet::new();
    let mut stack = vec![*start];
    while let Some(output) = stack.pop() {
      if !visited.insert(output) {
        continue;
      }
      for input in self.graph.neighbors_directed(output, Direction::Outgoing) {
        for node in self.graph.neighbors_directed(input, Direction::Outgoing) {
          let GcVertex::Node(id) = &self.graph[node] else {
            continue;
          };
          consumers.insert(id.clone());
          if self.pass_through.contains(id) {
            stack.extend(self.graph.neighbors_directed(node, Direction::Outgoing));
          }
        }
      }
    }
    consumers
  }

  /// Records that `input` gathered the data of `output`.
  pub fn remove_output_to_input_edge(&mut self, output: &SlotRef, input: &SlotRef) -> Vec<SlotRef> {
    let (Some(source), Some(target)) = (
      self.index(&GcVertex::Output(output.clone())),
      self.index(&GcVertex::Input(input.clone())),
    ) else {
      return Vec::new();
    };
    if let Some(edge) = self.graph.find_edge(source, target) {
      self.graph.remove_edge(edge);
    }
    self.release(source).into_iter().collect()
  }

  /// Records that `node` took its inputs. Outputs still connected to the node's
  /// inputs, e.g. from producers that never ran, are disconnected as well.
  pub fn remove_input_to_node_edge(&mut self, node: &NodeId) -> Vec<SlotRef> {
    let Some(node_index) = self.index(&GcVertex::Node(node.clone())) else {
      return Vec::new();
    };
    let inputs: Vec<NodeIndex> = self
      .graph
      .neighbors_directed(node_index, Direction::Incoming)
      .collect();
    let mut producers = Vec::new();
    for input in inputs {
      producers.extend(self.graph.neighbors_directed(input, Direction::Incoming));
      let vertex = self.graph.remove_node(input);
      if let Some(vertex) = vertex {
        self.indices.remove(&vertex);
      }
    }
    producers
      .into_iter()
      .filter_map(|output| self.release(output))
      .collect()
  }

  /// Records that the producer of `output` finished.
  pub fn remove_node_to_output_edge(&mut self, output: &SlotRef) -> Vec<SlotRef> {
    let (Some(node), Some(target)) = (
      self.index(&GcVertex::Node(output.node.clone())),
      self.index(&GcVertex::Output(output.clone())),
    ) else {
      return Vec::new();
    };
    if let Some(edge) = self.graph.find_edge(node, target) {
      self.graph.remove_edge(edge);
    }
    self.release(target).into_iter().collect()
  }

  fn index(&self, vertex: &GcVertex) -> Option<NodeIndex> {
    self.indices.get(vertex).copied()
  }

  fn add_vertex(&mut self, vertex: GcVertex) -> NodeIndex {
    if let Some(index) = self.indices.get(&vertex) {
      return *index;
    }
    let index = self.graph.add_node(vertex.clone());
    self.indices.insert(vertex, index);
    index
  }

  fn release(&mut self, index: NodeIndex) -> Option<SlotRef> {
    let GcVertex::Output(slot) = self.graph.node_weight(index)? else {
      return None;
    };
    let connected = self
      .graph
      .neighbors_directed(index, Direction::Incoming)
      .chain(self.graph.neighbors_directed(index, Direction::Outgoing))
      .next()
      .is_some();
    if connected {
      return None;
    }
    let slot = slot.clone();
    self.graph.remove_node(index);
    self.indices.remove(&GcVertex::Output(slot.clone()));
    trace!(output = %slot, "released");
    Some(slot)
  }
}

/// Builds the GC graph of the given nodes. Connections to nodes outside the filter
/// are not tracked.
pub fn build_gc_graph(graph: &Graph, node_filter: &BTreeSet<NodeId>) -> GcGraph {
  let mut gc = GcGraph::default();
  for node in graph.nodes().filter(|node| node_filter.contains(node.id())) {
    let node_index = gc.add_vertex(GcVertex::Node(node.id().clone()));
    if matches!(node.kind(), NodeKind::PassThrough) {
      gc.pass_through.insert(node.id().clone());
    }
    for output in node.output_refs() {
      let output_index = gc.add_vertex(GcVertex::Output(output));
      gc.graph.add_edge(node_index, output_index, ());
    }
    for input in node.input_refs() {
      let input_index = gc.add_vertex(GcVertex::Input(input));
      gc.graph.add_edge(input_index, node_index, ());
    }
  }
  for edge in graph.edges() {
    let (Some(source), Some(target)) = (
      gc.index(&GcVertex::Output(edge.source.clone())),
      gc.index(&GcVertex::Input(edge.target.clone())),
    ) else {
      continue;
    };
    gc.graph.add_edge(source, target, ());
  }
  gc
}
