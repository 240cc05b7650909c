//! Elementwise fusion pass.
//!
//! Merges chains of elementwise operators into a single kernel. A producer is
//! fused into its consumer when:
//! - both operators are `ElemWise`
//! - the producer's result has exactly one consumer and is not a function output
//! - the producer's result has the same type as the consumer's result
//!
//! Groups are trees rooted at the member whose result leaves the group.
//! Decisions depend only on the graph, so the same function always yields
//! the same kernel boundaries.

use quill_core::{IrGraph, IrNodeId, OpPattern, Pass, PassContext, Result, Stage};

/// Pass that assigns fusable nodes to shared groups.
///
/// Runs only when the optimization level is at least 1.
pub struct FusionPass;

impl FusionPass {
    pub fn new() -> Self {
        Self
    }

    fn can_fuse(graph: &IrGraph, producer: IrNodeId, consumer: IrNodeId) -> Result<bool> {
        let p = graph.node(producer)?;
        let c = graph.node(consumer)?;

        if p.pattern != OpPattern::ElemWise || c.pattern != OpPattern::ElemWise {
            return Ok(false);
        }
        if p.group == c.group {
            return Ok(false);
        }
        if graph.is_output(p.output) || graph.edge_consumers(p.output) != [consumer] {
            return Ok(false);
        }
        Ok(graph.edge(p.output)?.ty == graph.edge(c.output)?.ty)
    }
}

impl Pass for FusionPass {
    fn name(&self) -> &str {
        "fusion"
    }

    fn stage(&self) -> Stage {
        Stage::Optimization
    }

    fn run(&self, graph: &mut IrGraph, ctx: &PassContext) -> Result<bool> {
        if ctx.opt_level < 1 {
            return Ok(false);
        }

        let mut changed = false;
        for consumer in graph.topological_order() {
            let inputs = graph.node(consumer)?.inputs.clone();
            for edge in inputs {
                let Some(producer) = graph.edge_producer(edge) else {
                    continue;
                };
                if Self::can_fuse(graph, producer, consumer)? {
                    tracing::debug!(
                        producer = %graph.node(producer)?.op,
                        consumer = %graph.node(consumer)?.op,
                        "fusing"
                    );
                    graph.merge_groups(producer, consumer)?;
                    changed = true;
                }
            }
        }
        Ok(changed)
    }
}

impl Default for FusionPass {
    fn default() -> Self {
        Self::new()
    }
}
