//! # Graph Model
//!
//! This module defines the [`Graph`] the scheduler operates on. Graphs contain nodes
//! with ordered, typed input and output slots, and edges that connect an output slot
//! to an input slot.
//!
//! ## Node Kinds
//!
//! - **Algorithm nodes** carry the workload ([`Algorithm`]), an optional runtime
//!   partition key and `enabled`/`skipped` flags.
//! - **Pass-through nodes** carry no workload. They forward the rows of their i-th
//!   input slot to their i-th output slot and never cause a partition cut.
//!
//! ## Example
//!
//! ```rust
//! use runweave::algorithm::algorithm_fn;
//! use runweave::data::SlotData;
//! use runweave::graph::{DataType, Graph, GraphNode, SlotRef};
//!
//! let noop = algorithm_fn(|_inputs: SlotData| Ok(SlotData::new()));
//!
//! let mut graph = Graph::new();
//! graph.add_node(
//!   GraphNode::algorithm("source", noop.clone())
//!     .with_output("out", DataType::heavy("image"))
//!     .in_partition("p1"),
//! )?;
//! graph.add_node(
//!   GraphNode::algorithm("sink", noop)
//!     .with_input("in", DataType::heavy("image"))
//!     .in_partition("p1"),
//! )?;
//! graph.connect(SlotRef::new("source", "out"), SlotRef::new("sink", "in"))?;
//! assert_eq!(graph.edge_count(), 1);
//! # Ok::<(), runweave::error::GraphError>(())
//! ```

use crate::algorithm::Algorithm;
use crate::error::GraphError;
use crate::runtime_partition::PartitionKey;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

/// Identity of a node within a graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
  /// Creates a node id.
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  /// Returns the id as a string slice.
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for NodeId {
  fn from(id: &str) -> Self {
    Self(id.to_string())
  }
}

impl From<String> for NodeId {
  fn from(id: String) -> Self {
    Self(id)
  }
}

impl Borrow<str> for NodeId {
  fn borrow(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Reference to a slot: the owning node and the slot name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotRef {
  /// Owning node
  pub node: NodeId,
  /// Slot name
  pub slot: String,
}

impl SlotRef {
  /// Creates a slot reference.
  pub fn new(node: impl Into<NodeId>, slot: impl Into<String>) -> Self {
    Self {
      node: node.into(),
      slot: slot.into(),
    }
  }
}

impl fmt::Display for SlotRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.node, self.slot)
  }
}

/// Data type descriptor of a slot.
///
/// Heavy data types are expensive to hold in memory. The scheduler routes heavy
/// data through the pipeline first so it can be released early.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataType {
  /// Type name
  pub name: String,
  /// Whether values of this type are expensive to hold in memory
  pub heavy: bool,
}

impl DataType {
  /// Creates a lightweight data type.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      heavy: false,
    }
  }

  /// Creates a heavy data type.
  pub fn heavy(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      heavy: true,
    }
  }
}

/// Declaration of an input or output slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
  /// Slot name, unique per node and direction
  pub name: String,
  /// Data type accepted or produced by the slot
  pub data_type: DataType,
  /// Input slots only: a deactivated producer does not deactivate the consumer
  pub optional: bool,
}

/// Workload and scheduling attributes of an algorithm node.
#[derive(Clone)]
pub struct AlgorithmNode {
  /// The workload.
  pub algorithm: Arc<dyn Algorithm>,
  /// Runtime partition the node is assigned to, if any.
  pub runtime_partition: Option<PartitionKey>,
  /// Disabled nodes are not executed and deactivate their dependents.
  pub enabled: bool,
  /// Skipped nodes are not executed and deactivate their dependents.
  pub skipped: bool,
}

impl fmt::Debug for AlgorithmNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AlgorithmNode")
      .field("runtime_partition", &self.runtime_partition)
      .field("enabled", &self.enabled)
      .field("skipped", &self.skipped)
      .finish_non_exhaustive()
  }
}

/// Kind of a node.
#[derive(Clone, Debug)]
pub enum NodeKind {
  /// Node with a workload.
  Algorithm(AlgorithmNode),
  /// Node without a workload that forwards its inputs positionally.
  PassThrough,
}

/// A node of the graph.
#[derive(Clone, Debug)]
pub struct GraphNode {
  id: NodeId,
  name: String,
  inputs: Vec<SlotInfo>,
  outputs: Vec<SlotInfo>,
  kind: NodeKind,
}

impl GraphNode {
  /// Creates an enabled, untagged algorithm node without slots.
  pub fn algorithm(id: impl Into<NodeId>, algorithm: Arc<dyn Algorithm>) -> Self {
    Self::with_kind(
      id.into(),
      NodeKind::Algorithm(AlgorithmNode {
        algorithm,
        runtime_partition: None,
        enabled: true,
        skipped: false,
      }),
    )
  }

  /// Creates a pass-through node without slots.
  pub fn pass_through(id: impl Into<NodeId>) -> Self {
    Self::with_kind(id.into(), NodeKind::PassThrough)
  }

  fn with_kind(id: NodeId, kind: NodeKind) -> Self {
    Self {
      name: id.to_string(),
      id,
      inputs: Vec::new(),
      outputs: Vec::new(),
      kind,
    }
  }

  /// Sets the display name (defaults to the id).
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Appends a required input slot.
  pub fn with_input(mut self, name: impl Into<String>, data_type: DataType) -> Self {
    self.inputs.push(SlotInfo {
      name: name.into(),
      data_type,
      optional: false,
    });
    self
  }

  /// Appends an optional input slot.
  pub fn with_optional_input(mut self, name: impl Into<String>, data_type: DataType) -> Self {
    self.inputs.push(SlotInfo {
      name: name.into(),
      data_type,
      optional: true,
    });
    self
  }

  /// Appends an output slot.
  pub fn with_output(mut self, name: impl Into<String>, data_type: DataType) -> Self {
    self.outputs.push(SlotInfo {
      name: name.into(),
      data_type,
      optional: false,
    });
    self
  }

  /// Assigns the node to a runtime partition. Has no effect on pass-through nodes.
  pub fn in_partition(mut self, key: impl Into<PartitionKey>) -> Self {
    if let NodeKind::Algorithm(algorithm) = &mut self.kind {
      algorithm.runtime_partition = Some(key.into());
    }
    self
  }

  /// Enables or disables the node. Has no effect on pass-through nodes.
  pub fn with_enabled(mut self, enabled: bool) -> Self {
    if let NodeKind::Algorithm(algorithm) = &mut self.kind {
      algorithm.enabled = enabled;
    }
    self
  }

  /// Marks the node as skipped. Has no effect on pass-through nodes.
  pub fn with_skipped(mut self, skipped: bool) -> Self {
    if let NodeKind::Algorithm(algorithm) = &mut self.kind {
      algorithm.skipped = skipped;
    }
    self
  }

  /// Returns the id.
  pub fn id(&self) -> &NodeId {
    &self.id
  }

  /// Returns the display name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Returns the input slots, in order.
  pub fn inputs(&self) -> &[SlotInfo] {
    &self.inputs
  }

  /// Returns the output slots, in order.
  pub fn outputs(&self) -> &[SlotInfo] {
    &self.outputs
  }

  /// Returns the node kind.
  pub fn kind(&self) -> &NodeKind {
    &self.kind
  }

  /// Returns the input slot with the given name.
  pub fn input(&self, name: &str) -> Option<&SlotInfo> {
    self.inputs.iter().find(|slot| slot.name == name)
  }

  /// Returns the output slot with the given name.
  pub fn output(&self, name: &str) -> Option<&SlotInfo> {
    self.outputs.iter().find(|slot| slot.name == name)
  }

  /// Returns true for algorithm nodes.
  pub fn is_algorithm(&self) -> bool {
    matches!(self.kind, NodeKind::Algorithm(_))
  }

  /// Returns the runtime partition key of a tagged algorithm node.
  pub fn runtime_partition(&self) -> Option<&PartitionKey> {
    match &self.kind {
      NodeKind::Algorithm(algorithm) => algorithm.runtime_partition.as_ref(),
      NodeKind::PassThrough => None,
    }
  }

  /// Returns false for disabled or skipped algorithm nodes.
  pub fn is_active(&self) -> bool {
    match &self.kind {
      NodeKind::Algorithm(algorithm) => algorithm.enabled && !algorithm.skipped,
      NodeKind::PassThrough => true,
    }
  }

  /// Returns references to all input slots.
  pub fn input_refs(&self) -> impl Iterator<Item = SlotRef> + '_ {
    self
      .inputs
      .iter()
      .map(|slot| SlotRef::new(self.id.clone(), slot.name.clone()))
  }

  /// Returns references to all output slots.
  pub fn output_refs(&self) -> impl Iterator<Item = SlotRef> + '_ {
    self
      .outputs
      .iter()
      .map(|slot| SlotRef::new(self.id.clone(), slot.name.clone()))
  }

  fn check_slots(&self) -> Result<(), GraphError> {
    for slots in [&self.inputs, &self.outputs] {
      let mut seen = HashSet::new();
      for slot in slots {
        if !seen.insert(slot.name.as_str()) {
          return Err(GraphError::DuplicateSlot {
            node: self.id.clone(),
            slot: slot.name.clone(),
          });
        }
      }
    }
    Ok(())
  }
}

/// A directed connection from an output slot to an input slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
  /// Output slot the data comes from
  pub source: SlotRef,
  /// Input slot the data goes to
  pub target: SlotRef,
}

/// A graph of nodes connected slot to slot.
///
/// Node and edge iteration is ordered by node id, which keeps partition numbering and
/// tie-breaks deterministic.
#[derive(Clone, Debug, Default)]
pub struct Graph {
  nodes: BTreeMap<NodeId, GraphNode>,
  edges: BTreeSet<Edge>,
}

impl Graph {
  /// Creates an empty graph.
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a node.
  ///
  /// # Errors
  ///
  /// Returns an error if a node with the same id exists or the node declares a slot
  /// name twice.
  pub fn add_node(&mut self, node: GraphNode) -> Result<(), GraphError> {
    if self.nodes.contains_key(node.id()) {
      return Err(GraphError::DuplicateNode(node.id().clone()));
    }
    node.check_slots()?;
    self.nodes.insert(node.id().clone(), node);
    Ok(())
  }

  /// Removes a node together with all edges touching it.
  pub fn remove_node(&mut self, id: &str) -> Option<GraphNode> {
    let node = self.nodes.remove(id)?;
    self
      .edges
      .retain(|edge| edge.source.node.as_str() != id && edge.target.node.as_str() != id);
    Some(node)
  }

  /// Connects an output slot to an input slot. Connecting twice is a no-op.
  ///
  /// # Errors
  ///
  /// Returns an error if a node or slot does not exist.
  pub fn connect(&mut self, source: SlotRef, target: SlotRef) -> Result<(), GraphError> {
    let source_node = self
      .nodes
      .get(&source.node)
      .ok_or_else(|| GraphError::UnknownNode(source.node.clone()))?;
    if source_node.output(&source.slot).is_none() {
      return Err(GraphError::UnknownOutputSlot(source));
    }
    let target_node = self
      .nodes
      .get(&target.node)
      .ok_or_else(|| GraphError::UnknownNode(target.node.clone()))?;
    if target_node.input(&target.slot).is_none() {
      return Err(GraphError::UnknownInputSlot(target));
    }
    self.edges.insert(Edge { source, target });
    Ok(())
  }

  /// Removes an edge. Returns true if it existed.
  pub fn disconnect(&mut self, edge: &Edge) -> bool {
    self.edges.remove(edge)
  }

  /// Returns the node with the given id.
  pub fn node(&self, id: &str) -> Option<&GraphNode> {
    self.nodes.get(id)
  }

  /// Returns true if the graph contains the node.
  pub fn contains_node(&self, id: &str) -> bool {
    self.nodes.contains_key(id)
  }

  /// Returns all nodes ordered by id.
  pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
    self.nodes.values()
  }

  /// Returns all node ids in order.
  pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
    self.nodes.keys()
  }

  /// Returns all edges.
  pub fn edges(&self) -> impl Iterator<Item = &Edge> {
    self.edges.iter()
  }

  /// Returns the number of nodes.
  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  /// Returns the number of edges.
  pub fn edge_count(&self) -> usize {
    self.edges.len()
  }

  /// Returns true if the graph has no nodes.
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Returns the edges ending in the given input slot.
  pub fn incoming_edges<'a>(&'a self, input: &'a SlotRef) -> impl Iterator<Item = &'a Edge> + 'a {
    self.edges.iter().filter(move |edge| &edge.target == input)
  }

  /// Returns the edges starting at the given output slot.
  pub fn outgoing_edges<'a>(&'a self, output: &'a SlotRef) -> impl Iterator<Item = &'a Edge> + 'a {
    self.edges.iter().filter(move |edge| &edge.source == output)
  }

  /// Returns true if data on the slot is heavy.
  ///
  /// Output slots are looked up first, then input slots. Unknown slots are light.
  /// This is the single place where heaviness is decided.
  pub fn is_heavy(&self, slot: &SlotRef) -> bool {
    self
      .nodes
      .get(&slot.node)
      .and_then(|node| node.output(&slot.slot).or_else(|| node.input(&slot.slot)))
      .is_some_and(|info| info.data_type.heavy)
  }

  /// Returns true if the edge connects two tagged algorithms with different runtime
  /// partitions. These are the only edges that separate partitions.
  pub fn is_cross_partition_edge(&self, edge: &Edge) -> bool {
    let source = self.nodes.get(&edge.source.node).and_then(GraphNode::runtime_partition);
    let target = self.nodes.get(&edge.target.node).and_then(GraphNode::runtime_partition);
    matches!((source, target), (Some(source), Some(target)) if source != target)
  }

  /// Returns a copy of the graph restricted to the given nodes and the edges between
  /// them.
  pub fn extract(&self, filter: &BTreeSet<NodeId>) -> Graph {
    Graph {
      nodes: self
        .nodes
        .iter()
        .filter(|(id, _)| filter.contains(*id))
        .map(|(id, node)| (id.clone(), node.clone()))
        .collect(),
      edges: self
        .edges
        .iter()
        .filter(|edge| filter.contains(&edge.source.node) && filter.contains(&edge.target.node))
        .cloned()
        .collect(),
    }
  }

  /// Returns a serializable description of the graph structure.
  pub fn describe(&self) -> GraphDescription {
    GraphDescription {
      nodes: self
        .nodes
        .values()
        .map(|node| NodeDescription {
          id: node.id.clone(),
          name: node.name.clone(),
          algorithm: node.is_algorithm(),
          runtime_partition: node.runtime_partition().cloned(),
          active: node.is_active(),
          inputs: node.inputs.clone(),
          outputs: node.outputs.clone(),
        })
        .collect(),
      edges: self.edges.iter().cloned().collect(),
    }
  }
}

/// Serializable structure of a node, without its workload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
  /// Node id
  pub id: NodeId,
  /// Display name
  pub name: String,
  /// True for algorithm nodes
  pub algorithm: bool,
  /// Runtime partition key
  pub runtime_partition: Option<PartitionKey>,
  /// False for disabled or skipped nodes
  pub active: bool,
  /// Input slots
  pub inputs: Vec<SlotInfo>,
  /// Output slots
  pub outputs: Vec<SlotInfo>,
}

/// Serializable structure of a graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
  /// Nodes ordered by id
  pub nodes: Vec<NodeDescription>,
  /// Edges
  pub edges: Vec<Edge>,
}
