//! # Data-Flow Graph
//!
//! Orders the execution of a partition. Every node is split into three kinds of
//! vertices:
//!
//! ```text
//!   Input ──0──▶ Node ──w──▶ Output ──w──▶ Input (of a consumer) ──0──▶ ...
//! ```
//!
//! The weight `w` of edges leaving a node or an output is [`HEAVY_DATA_WEIGHT`] for
//! heavy slots and [`LIGHT_DATA_WEIGHT`] otherwise, so the shortest distance from the
//! sources is smaller along heavy data paths. [`DataFlowGraph::next_vertex`] always
//! picks the ready vertex with the smallest distance, which pushes heavy data
//! through the partition first and lets it be released early.

use crate::graph::{Graph, NodeId, SlotRef};
use petgraph::Direction;
use petgraph::algo::dijkstra;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Weight of the edge from an input slot to its node.
pub const INPUT_TO_NODE_WEIGHT: u32 = 0;
/// Weight of edges carrying heavy data.
pub const HEAVY_DATA_WEIGHT: u32 = 1;
/// Weight of edges carrying lightweight data.
pub const LIGHT_DATA_WEIGHT: u32 = 4;

/// Returns the weight of an edge carrying data of the given heaviness.
pub fn data_weight(heavy: bool) -> u32 {
  if heavy {
    HEAVY_DATA_WEIGHT
  } else {
    LIGHT_DATA_WEIGHT
  }
}

/// A vertex of the data-flow graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlowVertex {
  /// An input slot gathering data from its producers.
  Input(SlotRef),
  /// A node to execute.
  Node(NodeId),
  /// An output slot produced by its node.
  Output(SlotRef),
}

impl fmt::Display for FlowVertex {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FlowVertex::Input(slot) => write!(f, "input {}", slot),
      FlowVertex::Node(node) => write!(f, "node {}", node),
      FlowVertex::Output(slot) => write!(f, "output {}", slot),
    }
  }
}

/// Weighted execution-order graph of a set of nodes.
#[derive(Clone, Debug, Default)]
pub struct DataFlowGraph {
  graph: StableDiGraph<FlowVertex, u32>,
  indices: HashMap<FlowVertex, NodeIndex>,
  distances: HashMap<NodeIndex, u32>,
}

impl DataFlowGraph {
  /// Returns the number of remaining vertices.
  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  /// Returns true if all vertices were consumed.
  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Returns true if the vertex has not been consumed.
  pub fn contains(&self, vertex: &FlowVertex) -> bool {
    self.indices.contains_key(vertex)
  }

  /// Returns the weight of the edge between two vertices.
  pub fn edge_weight(&self, from: &FlowVertex, to: &FlowVertex) -> Option<u32> {
    let from = *self.indices.get(from)?;
    let to = *self.indices.get(to)?;
    let edge = self.graph.find_edge(from, to)?;
    self.graph.edge_weight(edge).copied()
  }

  /// Returns all remaining edges with their weights.
  pub fn edges(&self) -> Vec<(FlowVertex, FlowVertex, u32)> {
    self
      .graph
      .edge_indices()
      .filter_map(|edge| {
        let (source, target) = self.graph.edge_endpoints(edge)?;
        Some((
          self.graph[source].clone(),
          self.graph[target].clone(),
          self.graph[edge],
        ))
      })
      .collect()
  }

  /// Returns the shortest distance of a vertex from the initial sources.
  pub fn distance(&self, vertex: &FlowVertex) -> Option<u32> {
    let index = self.indices.get(vertex)?;
    self.distances.get(index).copied()
  }

  /// Returns the ready vertex (no remaining incoming edges) with the smallest
  /// distance. Ties go to the vertex inserted first.
  ///
  /// Returns `None` if the graph is empty or every remaining vertex waits on
  /// another one, which only happens on a cycle.
  pub fn next_vertex(&self) -> Option<FlowVertex> {
    self
      .graph
      .node_indices()
      .filter(|index| {
        self
          .graph
          .neighbors_directed(*index, Direction::Incoming)
          .next()
          .is_none()
      })
      .min_by_key(|index| {
        (
          self.distances.get(index).copied().unwrap_or(u32::MAX),
          index.index(),
        )
      })
      .map(|index| self.graph[index].clone())
  }

  /// Consumes a vertex together with its edges. Returns false if it was not present.
  pub fn remove_vertex(&mut self, vertex: &FlowVertex) -> bool {
    match self.indices.remove(vertex) {
      Some(index) => {
        self.graph.remove_node(index);
        true
      }
      None => false,
    }
  }

  /// Returns the order in which nodes would execute, or `None` on a cycle. The graph
  /// itself is left untouched.
  pub fn node_order(&self) -> Option<Vec<NodeId>> {
    let mut remaining = self.clone();
    let mut order = Vec::new();
    while !remaining.is_empty() {
      let vertex = remaining.next_vertex()?;
      remaining.remove_vertex(&vertex);
      if let FlowVertex::Node(node) = vertex {
        order.push(node);
      }
    }
    Some(order)
  }

  fn add_vertex(&mut self, vertex: FlowVertex) -> NodeIndex {
    if let Some(index) = self.indices.get(&vertex) {
      return *index;
    }
    let index = self.graph.add_node(vertex.clone());
    self.indices.insert(vertex, index);
    index
  }

  fn compute_distances(&mut self) {
    let roots: Vec<NodeIndex> = self
      .graph
      .node_indices()
      .filter(|index| {
        self
          .graph
          .neighbors_directed(*index, Direction::Incoming)
          .next()
          .is_none()
      })
      .collect();
    let mut distances: HashMap<NodeIndex, u32> = HashMap::new();
    for root in roots {
      for (index, distance) in dijkstra(&self.graph, root, None, |edge| *edge.weight()) {
        distances
          .entry(index)
          .and_modify(|current| *current = (*current).min(distance))
          .or_insert(distance);
      }
    }
    self.distances = distances;
  }
}

/// Builds the data-flow graph of the given nodes. Nodes outside the filter and edges
/// leaving the filter are ignored.
pub fn build_data_flow_graph(graph: &Graph, node_filter: &BTreeSet<NodeId>) -> DataFlowGraph {
  let mut flow = DataFlowGraph::default();
  for node in graph.nodes().filter(|node| node_filter.contains(node.id())) {
    let node_index = flow.add_vertex(FlowVertex::Node(node.id().clone()));
    for input in node.input_refs() {
      let input_index = flow.add_vertex(FlowVertex::Input(input));
      flow.graph.add_edge(input_index, node_index, INPUT_TO_NODE_WEIGHT);
    }
    for output in node.output_refs() {
      let weight = data_weight(graph.is_heavy(&output));
      let output_index = flow.add_vertex(FlowVertex::Output(output));
      flow.graph.add_edge(node_index, output_index, weight);
    }
  }
  for edge in graph.edges() {
    if !node_filter.contains(&edge.source.node) || !node_filter.contains(&edge.target.node) {
      continue;
    }
    let (Some(source), Some(target)) = (
      flow.indices.get(&FlowVertex::Output(edge.source.clone())).copied(),
      flow.indices.get(&FlowVertex::Input(edge.target.clone())).copied(),
    ) else {
      continue;
    };
    flow
      .graph
      .add_edge(source, target, data_weight(graph.is_heavy(&edge.source)));
  }
  flow.compute_distances();
  flow
}
