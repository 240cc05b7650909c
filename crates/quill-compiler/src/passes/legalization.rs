//! Target legalization pass.
//!
//! Rejects graphs containing operators that have no implementation for the
//! compilation target. There is no fallback to another target.

use quill_core::{Error, IrGraph, Pass, PassContext, Result, Stage};

/// Pass that checks every node's operator supports the target.
pub struct TargetLegalizationPass;

impl TargetLegalizationPass {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for TargetLegalizationPass {
    fn name(&self) -> &str {
        "target_legalization"
    }

    fn stage(&self) -> Stage {
        Stage::Legalization
    }

    fn run(&self, graph: &mut IrGraph, ctx: &PassContext) -> Result<bool> {
        for node_id in graph.topological_order() {
            let node = graph.node(node_id)?;
            let operator = ctx.registry.lookup(&node.op)?;
            if !operator.supports(ctx.target) {
                return Err(Error::Lowering {
                    operator: node.op.clone(),
                    target: ctx.target.to_string(),
                    message: "operator has no implementation for this target".to_string(),
                });
            }
        }
        Ok(false)
    }
}

impl Default for TargetLegalizationPass {
    fn default() -> Self {
        Self::new()
    }
}
