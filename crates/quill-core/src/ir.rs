//! Dataflow graph used by compiler passes.
//!
//! The graph is built from a type-checked `Function`:
//! - **Nodes** (`IrNode`) are operator calls
//! - **Edges** (`IrEdge`) are tensor values: parameters, constants, or call results
//!
//! Every node produces exactly one edge. Fusion assigns nodes to groups; each
//! group becomes one kernel and is identified by its root node, the member
//! whose result leaves the group.

use crate::attrs::Attrs;
use crate::operator::OpPattern;
use crate::types::{Tensor, TensorType};
use crate::{Error, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Type alias for IR node identifiers (backed by petgraph NodeIndex).
pub type IrNodeId = NodeIndex;

/// Unique identifier for an edge (tensor value) in the IR graph.
///
/// This is an index into the graph's edge side-table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IrEdgeId(pub usize);

impl IrEdgeId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

// ── IrGraph ──

/// Intermediate representation graph.
///
/// Nodes are operators; edges are tensor values stored in a side-table.
/// petgraph edges exist solely for topological ordering.
pub struct IrGraph {
    graph: DiGraph<IrNode, ()>,

    /// Edge metadata side-table.
    edges: Vec<IrEdge>,

    /// Lookup table: edge ID -> producing node ID.
    edge_producer: HashMap<IrEdgeId, IrNodeId>,

    /// Lookup table: edge ID -> consuming node IDs, one entry per use.
    edge_consumers: HashMap<IrEdgeId, Vec<IrNodeId>>,

    /// Parameter edges, in parameter order.
    pub inputs: Vec<IrEdgeId>,

    /// Function output edges, in output order.
    pub outputs: Vec<IrEdgeId>,
}

impl IrGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            edges: Vec::new(),
            edge_producer: HashMap::new(),
            edge_consumers: HashMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    // ── Node access ──

    pub fn node(&self, id: IrNodeId) -> Result<&IrNode> {
        self.graph
            .node_weight(id)
            .ok_or_else(|| Error::InvalidGraph(format!("Node {:?} not found", id)))
    }

    pub fn node_mut(&mut self, id: IrNodeId) -> Result<&mut IrNode> {
        self.graph
            .node_weight_mut(id)
            .ok_or_else(|| Error::InvalidGraph(format!("Node {:?} not found", id)))
    }

    /// Iterate over all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (IrNodeId, &IrNode)> {
        self.graph
            .node_indices()
            .filter_map(|id| self.graph.node_weight(id).map(|node| (id, node)))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    // ── Edge access ──

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, id: IrEdgeId) -> Result<&IrEdge> {
        self.edges
            .get(id.index())
            .ok_or_else(|| Error::InvalidGraph(format!("Edge {:?} not found", id)))
    }

    pub fn edges(&self) -> impl Iterator<Item = (IrEdgeId, &IrEdge)> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, e)| (IrEdgeId::new(i), e))
    }

    /// Get the node that produces an edge, if any.
    pub fn edge_producer(&self, id: IrEdgeId) -> Option<IrNodeId> {
        self.edge_producer.get(&id).copied()
    }

    /// Get the distinct nodes that consume an edge, in first-use order.
    pub fn edge_consumers(&self, id: IrEdgeId) -> Vec<IrNodeId> {
        let mut consumers: Vec<IrNodeId> = Vec::new();
        for &node in self.edge_consumers.get(&id).into_iter().flatten() {
            if !consumers.contains(&node) {
                consumers.push(node);
            }
        }
        consumers
    }

    pub fn is_output(&self, id: IrEdgeId) -> bool {
        self.outputs.contains(&id)
    }

    // ── Graph mutation ──

    /// Add an edge (tensor value) to the graph and return its ID.
    pub fn add_edge(&mut self, edge: IrEdge) -> IrEdgeId {
        let id = IrEdgeId::new(self.edges.len());
        self.edges.push(edge);
        id
    }

    /// Add a call node producing `output` and return its ID.
    ///
    /// This also updates the producer/consumer lookup tables and adds
    /// petgraph edges for topological ordering. The node starts in its own
    /// fusion group.
    pub fn add_node(&mut self, node: IrNode) -> Result<IrNodeId> {
        for &input in node.inputs.iter().chain(std::iter::once(&node.output)) {
            self.edge(input)?;
        }
        if self.edge_producer.contains_key(&node.output) {
            return Err(Error::InvalidGraph(format!(
                "Edge {:?} already has a producer",
                node.output
            )));
        }

        let inputs = node.inputs.clone();
        let output = node.output;
        let node_id = self.graph.add_node(node);
        self.graph[node_id].group = node_id;

        self.edge_producer.insert(output, node_id);
        for input in inputs {
            self.edge_consumers.entry(input).or_default().push(node_id);
            if let Some(&producer) = self.edge_producer.get(&input) {
                self.graph.add_edge(producer, node_id, ());
            }
        }

        Ok(node_id)
    }

    // ── Fusion groups ──

    /// Move every member of `from`'s group into `into`'s group.
    pub fn merge_groups(&mut self, from: IrNodeId, into: IrNodeId) -> Result<()> {
        let source = self.node(from)?.group;
        let target = self.node(into)?.group;
        if source == target {
            return Ok(());
        }
        for node in self.graph.node_weights_mut() {
            if node.group == source {
                node.group = target;
            }
        }
        Ok(())
    }

    /// Group roots in topological order.
    pub fn group_roots(&self) -> Vec<IrNodeId> {
        self.topological_order()
            .into_iter()
            .filter(|&id| self.graph[id].group == id)
            .collect()
    }

    /// Members of the group rooted at `root`, in topological order.
    pub fn group_members(&self, root: IrNodeId) -> Vec<IrNodeId> {
        self.topological_order()
            .into_iter()
            .filter(|&id| self.graph[id].group == root)
            .collect()
    }

    // ── Graph queries ──

    /// Get the topological order of nodes in the graph.
    ///
    /// Returns nodes in an order such that all inputs to a node are produced
    /// before the node itself. Among ready nodes the earliest-created comes
    /// first, so the order only depends on the construction sequence.
    pub fn topological_order(&self) -> Vec<IrNodeId> {
        let mut indegree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|id| self.graph.edges_directed(id, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<IrNodeId>> = self
            .graph
            .node_indices()
            .filter(|id| indegree[id.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for next in self.graph.neighbors_directed(id, Direction::Outgoing) {
                indegree[next.index()] -= 1;
                if indegree[next.index()] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
        order
    }
}

impl Default for IrGraph {
    fn default() -> Self {
        Self::new()
    }
}

// ── IrNode ──

/// A node in the IR graph: one operator call.
#[derive(Debug, Clone)]
pub struct IrNode {
    pub op: String,

    /// Resolved attributes (schema defaults filled in).
    pub attrs: Attrs,

    pub pattern: OpPattern,

    /// Argument edges, in argument order.
    pub inputs: Vec<IrEdgeId>,

    pub output: IrEdgeId,

    /// Root node of the fusion group this node belongs to.
    pub group: IrNodeId,
}

impl IrNode {
    pub fn new(op: &str, pattern: OpPattern, inputs: Vec<IrEdgeId>, output: IrEdgeId) -> Self {
        Self {
            op: op.to_string(),
            attrs: Attrs::new(),
            pattern,
            inputs,
            output,
            group: NodeIndex::end(),
        }
    }

    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }
}

// ── EdgeData ──

/// Where an edge's value comes from.
#[derive(Debug, Clone)]
pub enum EdgeData {
    /// The i-th function parameter, bound at runtime.
    Param(usize),

    /// Compile-time constant.
    Constant(Tensor),

    /// Result of a call node.
    Intermediate,
}

// ── IrEdge ──

/// An edge (tensor value) in the IR graph.
#[derive(Debug, Clone)]
pub struct IrEdge {
    /// Display name (parameter name or generated).
    pub name: String,

    pub ty: TensorType,

    pub data: EdgeData,
}

impl IrEdge {
    pub fn param(name: &str, ty: TensorType, index: usize) -> Self {
        Self {
            name: name.to_string(),
            ty,
            data: EdgeData::Param(index),
        }
    }

    pub fn constant(name: &str, value: Tensor) -> Self {
        Self {
            name: name.to_string(),
            ty: value.tensor_type(),
            data: EdgeData::Constant(value),
        }
    }

    pub fn intermediate(name: &str, ty: TensorType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            data: EdgeData::Intermediate,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.data, EdgeData::Constant(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn ty() -> TensorType {
        TensorType::new([4], DataType::F32)
    }

    /// a, b -> multiply -> t0 -> add(t0, b) -> t1
    fn build() -> (IrGraph, IrNodeId, IrNodeId) {
        let mut graph = IrGraph::new();
        let a = graph.add_edge(IrEdge::param("a", ty(), 0));
        let b = graph.add_edge(IrEdge::param("b", ty(), 1));
        graph.inputs = vec![a, b];

        let t0 = graph.add_edge(IrEdge::intermediate("t0", ty()));
        let mul = graph
            .add_node(IrNode::new("multiply", OpPattern::ElemWise, vec![a, b], t0))
            .unwrap();
        let t1 = graph.add_edge(IrEdge::intermediate("t1", ty()));
        let add = graph
            .add_node(IrNode::new("add", OpPattern::ElemWise, vec![t0, b], t1))
            .unwrap();
        graph.outputs = vec![t1];
        (graph, mul, add)
    }

    #[test]
    fn test_producers_and_consumers() {
        let (graph, mul, add) = build();
        let t0 = graph.node(mul).unwrap().output;
        let b = graph.inputs[1];

        assert_eq!(graph.edge_producer(t0), Some(mul));
        assert_eq!(graph.edge_consumers(t0), vec![add]);
        assert_eq!(graph.edge_consumers(b), vec![mul, add]);
        assert_eq!(graph.edge_producer(b), None);
        assert!(graph.is_output(graph.node(add).unwrap().output));
    }

    #[test]
    fn test_topological_order() {
        let (graph, mul, add) = build();
        assert_eq!(graph.topological_order(), vec![mul, add]);
    }

    #[test]
    fn test_groups_start_singleton() {
        let (graph, mul, add) = build();
        assert_eq!(graph.group_roots(), vec![mul, add]);
        assert_eq!(graph.group_members(add), vec![add]);
    }

    #[test]
    fn test_merge_groups() {
        let (mut graph, mul, add) = build();
        graph.merge_groups(mul, add).unwrap();

        assert_eq!(graph.group_roots(), vec![add]);
        assert_eq!(graph.group_members(add), vec![mul, add]);
    }

    #[test]
    fn test_second_producer_rejected() {
        let (mut graph, mul, _) = build();
        let t0 = graph.node(mul).unwrap().output;
        let a = graph.inputs[0];
        let err = graph.add_node(IrNode::new("negative", OpPattern::ElemWise, vec![a], t0));
        assert!(err.is_err());
    }
}
