//! Kernel scheduling.
//!
//! Orders kernel launches so every step runs after the steps producing its
//! inputs, and rewrites dependency lists to the new positions. Among steps
//! that are ready at the same time the earliest listed runs first, so an
//! already valid order is kept as is.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use quill_core::{Error, KernelStep, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Schedule kernel steps in dependency order.
pub struct Scheduler {
    steps: Vec<KernelStep>,
}

impl Scheduler {
    /// Create a scheduler for steps whose `deps` index into `steps`.
    pub fn new(steps: Vec<KernelStep>) -> Self {
        Self { steps }
    }

    /// Return the steps in execution order with `deps` remapped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGraph` if the dependencies contain a cycle or refer
    /// to a step that does not exist.
    pub fn schedule(self) -> Result<Vec<KernelStep>> {
        let dep_graph = self.build_dependency_graph()?;

        if petgraph::algo::is_cyclic_directed(&dep_graph) {
            return Err(Error::InvalidGraph(
                "kernel dependencies contain a cycle".to_string(),
            ));
        }

        let order = self.topological_sort(&dep_graph)?;

        let mut position = vec![0; self.steps.len()];
        for (new, &old) in order.iter().enumerate() {
            position[old] = new;
        }

        let mut slots: Vec<Option<KernelStep>> = self.steps.into_iter().map(Some).collect();
        let mut scheduled = Vec::with_capacity(order.len());
        for old in order {
            let mut step = slots[old]
                .take()
                .ok_or_else(|| Error::InvalidGraph(format!("step {old} scheduled twice")))?;
            step.deps = step.deps.iter().map(|&d| position[d]).collect();
            step.deps.sort_unstable();
            step.deps.dedup();
            scheduled.push(step);
        }
        Ok(scheduled)
    }

    /// Build a dependency graph where nodes are steps and edges point from
    /// producer to consumer.
    fn build_dependency_graph(&self) -> Result<DiGraph<usize, ()>> {
        let mut dep_graph = DiGraph::new();
        let indices: Vec<NodeIndex> = (0..self.steps.len())
            .map(|i| dep_graph.add_node(i))
            .collect();

        for (consumer, step) in self.steps.iter().enumerate() {
            for &producer in &step.deps {
                let producer_idx = indices.get(producer).ok_or_else(|| {
                    Error::InvalidGraph(format!(
                        "step {consumer} depends on missing step {producer}"
                    ))
                })?;
                dep_graph.add_edge(*producer_idx, indices[consumer], ());
            }
        }

        Ok(dep_graph)
    }

    /// Kahn's algorithm, always taking the lowest ready step index.
    fn topological_sort(&self, dep_graph: &DiGraph<usize, ()>) -> Result<Vec<usize>> {
        let mut in_degree: Vec<usize> = dep_graph
            .node_indices()
            .map(|idx| dep_graph.edges_directed(idx, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut sorted = Vec::with_capacity(self.steps.len());
        while let Some(Reverse(i)) = ready.pop() {
            sorted.push(dep_graph[NodeIndex::new(i)]);
            for next in dep_graph.neighbors_directed(NodeIndex::new(i), Direction::Outgoing) {
                let degree = &mut in_degree[next.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }

        if sorted.len() != self.steps.len() {
            return Err(Error::InvalidGraph(
                "topological sort did not visit all kernel steps".to_string(),
            ));
        }
        Ok(sorted)
    }
}
