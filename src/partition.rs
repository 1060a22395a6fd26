//! # Partition Builder
//!
//! Splits a [`Graph`] into partitions and orders them.
//!
//! An edge is *cut* when it connects two algorithm nodes that are both tagged with
//! runtime partition keys and the keys differ. Nothing else is cut: untagged
//! algorithms and pass-through nodes join whatever partition they are connected to.
//! The partitions are the connected components (ignoring direction) of the graph
//! without its cut edges. Every cut edge then becomes an edge of the
//! [`PartitionGraph`], which must be acyclic.
//!
//! ```text
//!   A(p1) ──▶ B(p2) ──▶ C(p1)      three partitions: {A} ─▶ {B} ─▶ {C}
//! ```
//!
//! Partitions are numbered in order of their smallest node id.

use crate::error::PartitionError;
use crate::graph::{Graph, NodeId};
use crate::runtime_partition::PartitionKey;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

/// A set of nodes executed together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
  index: usize,
  nodes: BTreeSet<NodeId>,
  runtime_partition: Option<PartitionKey>,
}

impl Partition {
  /// Returns the partition number.
  pub fn index(&self) -> usize {
    self.index
  }

  /// Returns the member nodes.
  pub fn nodes(&self) -> &BTreeSet<NodeId> {
    &self.nodes
  }

  /// Returns true if the node belongs to this partition.
  pub fn contains(&self, node: &str) -> bool {
    self.nodes.contains(node)
  }

  /// Returns the runtime partition key of the first tagged algorithm, by node id.
  pub fn runtime_partition(&self) -> Option<&PartitionKey> {
    self.runtime_partition.as_ref()
  }

  /// Returns the number of member nodes.
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  /// Returns true if the partition has no nodes.
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

/// Directed graph of partitions. An edge `A → B` means some node of `B` consumes
/// data produced in `A`.
#[derive(Clone, Debug, Default)]
pub struct PartitionGraph {
  graph: DiGraph<Partition, ()>,
  membership: HashMap<NodeId, NodeIndex>,
}

impl PartitionGraph {
  /// Returns the number of partitions.
  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  /// Returns true if there are no partitions.
  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Returns the number of dependencies between partitions.
  pub fn edge_count(&self) -> usize {
    self.graph.edge_count()
  }

  /// Returns all partitions ordered by index.
  pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
    self.graph.node_weights()
  }

  /// Returns the partition by index.
  pub fn partition(&self, index: usize) -> Option<&Partition> {
    self.graph.node_weight(NodeIndex::new(index))
  }

  /// Returns the partition containing the node.
  pub fn partition_of(&self, node: &str) -> Option<&Partition> {
    self
      .membership
      .get(node)
      .and_then(|index| self.graph.node_weight(*index))
  }

  /// Returns true if partition `from` feeds partition `to`.
  pub fn has_edge(&self, from: usize, to: usize) -> bool {
    let (from, to) = (NodeIndex::new(from), NodeIndex::new(to));
    from.index() < self.len() && to.index() < self.len() && self.graph.contains_edge(from, to)
  }

  /// Returns the partitions in dependency order.
  ///
  /// # Errors
  ///
  /// Returns [`PartitionError::Cycle`] if the partitions depend on each other in a
  /// cycle.
  pub fn topological_order(&self) -> Result<Vec<&Partition>, PartitionError> {
    let order = toposort(&self.graph, None).map_err(|cycle| PartitionError::Cycle {
      partition: self.graph[cycle.node_id()].index,
    })?;
    Ok(order.into_iter().map(|index| &self.graph[index]).collect())
  }
}

/// Returns a copy of the graph without its cross-partition edges.
pub fn cut_cross_partition_edges(graph: &Graph) -> Graph {
  let mut cut = graph.clone();
  for edge in graph.edges() {
    if graph.is_cross_partition_edge(edge) {
      trace!(source = %edge.source, target = %edge.target, "cutting edge");
      cut.disconnect(edge);
    }
  }
  cut
}

/// Builds the partition graph.
pub fn build_partition_graph(graph: &Graph) -> PartitionGraph {
  let cut = cut_cross_partition_edges(graph);
  let ids: Vec<&NodeId> = cut.node_ids().collect();
  let positions: HashMap<&NodeId, usize> = ids
    .iter()
    .enumerate()
    .map(|(position, id)| (*id, position))
    .collect();

  let mut components = UnionFind::<usize>::new(ids.len());
  for edge in cut.edges() {
    if let (Some(source), Some(target)) =
      (positions.get(&edge.source.node), positions.get(&edge.target.node))
    {
      components.union(*source, *target);
    }
  }

  // Node ids are sorted, so components are discovered in order of their smallest id.
  let mut result = PartitionGraph::default();
  let mut roots: HashMap<usize, NodeIndex> = HashMap::new();
  for (position, id) in ids.iter().enumerate() {
    let root = components.find(position);
    let index = *roots.entry(root).or_insert_with(|| {
      let index = result.graph.node_count();
      result.graph.add_node(Partition {
        index,
        nodes: BTreeSet::new(),
        runtime_partition: None,
      })
    });
    let partition = &mut result.graph[index];
    partition.nodes.insert((*id).clone());
    if partition.runtime_partition.is_none() {
      partition.runtime_partition = cut
        .node(id.as_str())
        .and_then(|node| node.runtime_partition())
        .cloned();
    }
    result.membership.insert((*id).clone(), index);
  }

  for edge in graph.edges().filter(|edge| graph.is_cross_partition_edge(edge)) {
    let source = result.membership.get(&edge.source.node).copied();
    let target = result.membership.get(&edge.target.node).copied();
    let (Some(source), Some(target)) = (source, target) else {
      continue;
    };
    // A cut edge can land inside one partition when another path joins both ends.
    if source != target && !result.graph.contains_edge(source, target) {
      result.graph.add_edge(source, target, ());
    }
  }

  debug!(
    partitions = result.len(),
    edges = result.edge_count(),
    "built partition graph"
  );
  result
}
