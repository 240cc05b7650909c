//! Lowering of fusion groups to kernels and assembly of function plans.

use crate::codegen;
use crate::scheduler::Scheduler;
use quill_core::{
    ConstantSlot, EdgeData, Error, FunctionPlan, IrEdgeId, IrGraph, IrNodeId, Kernel, KernelBody,
    KernelStep, LowerCtx, OpPattern, OutputSlot, ParamSlot, PassContext, Result, ScalarExpr,
    TensorType, broadcast_shape,
};
use std::collections::{HashMap, HashSet};

/// Hands out kernel names that are unique across a whole module.
#[derive(Default)]
pub(crate) struct KernelNamer {
    used: HashSet<String>,
}

impl KernelNamer {
    pub(crate) fn name(&mut self, module: &str, function: &str, ops: &[String]) -> String {
        let base = sanitize(&format!("{module}_{function}_fused_{}", ops.join("_")));
        let mut candidate = base.clone();
        let mut suffix = 1;
        while self.used.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Kernels and execution plan produced for one function.
pub(crate) struct LoweredFunction {
    pub kernels: Vec<Kernel>,
    pub plan: FunctionPlan,
}

/// Lower every fusion group of `graph` and lay out the function's slots.
pub(crate) fn lower_function(
    module: &str,
    function: &str,
    graph: &IrGraph,
    ctx: &PassContext,
    namer: &mut KernelNamer,
) -> Result<LoweredFunction> {
    let mut slots: HashMap<IrEdgeId, usize> = HashMap::new();

    let mut params = Vec::with_capacity(graph.inputs.len());
    for &edge_id in &graph.inputs {
        let edge = graph.edge(edge_id)?;
        let slot = slots.len();
        slots.insert(edge_id, slot);
        params.push(ParamSlot {
            name: edge.name.clone(),
            ty: edge.ty.clone(),
            slot,
        });
    }

    let mut constants = Vec::new();
    for (edge_id, edge) in graph.edges() {
        if let EdgeData::Constant(value) = &edge.data {
            let slot = slots.len();
            slots.insert(edge_id, slot);
            constants.push(ConstantSlot {
                slot,
                value: value.clone(),
            });
        }
    }

    let roots = graph.group_roots();
    let mut kernels = Vec::with_capacity(roots.len());
    let mut steps = Vec::with_capacity(roots.len());
    let mut step_of_group: HashMap<IrNodeId, usize> = HashMap::new();

    for root in roots {
        let members = graph.group_members(root);
        let (kernel_inputs, mut kernel) = lower_group(graph, &members, ctx)?;
        kernel.name = namer.name(module, function, &kernel.ops);
        if ctx.target.emits_c_source() {
            kernel.source = Some(codegen::emit_c(&kernel));
        }
        tracing::debug!(
            kernel = %kernel.name,
            ops = kernel.ops.len(),
            inputs = kernel.inputs.len(),
            "emitted kernel"
        );

        let output_edge = graph.node(root)?.output;
        let output_slot = slots.len();
        slots.insert(output_edge, output_slot);

        let mut deps = Vec::new();
        let mut input_slots = Vec::with_capacity(kernel_inputs.len());
        for edge in &kernel_inputs {
            let slot = *slots.get(edge).ok_or_else(|| {
                Error::InvalidGraph(format!("edge {edge:?} used before it is produced"))
            })?;
            input_slots.push(slot);
            if let Some(producer) = graph.edge_producer(*edge) {
                let group = graph.node(producer)?.group;
                if let Some(&step) = step_of_group.get(&group) {
                    deps.push(step);
                }
            }
        }
        deps.sort_unstable();
        deps.dedup();

        step_of_group.insert(root, steps.len());
        steps.push(KernelStep {
            kernel: kernel.name.clone(),
            inputs: input_slots,
            output: output_slot,
            deps,
        });
        kernels.push(kernel);
    }

    let steps = Scheduler::new(steps).schedule()?;

    let outputs = graph
        .outputs
        .iter()
        .map(|edge| {
            Ok(OutputSlot {
                slot: *slots.get(edge).ok_or_else(|| {
                    Error::InvalidGraph(format!("output edge {edge:?} has no slot"))
                })?,
                ty: graph.edge(*edge)?.ty.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(LoweredFunction {
        kernels,
        plan: FunctionPlan {
            params,
            constants,
            steps,
            outputs,
            num_slots: slots.len(),
        },
    })
}

/// Lower one group. Returns the kernel's input edges and the kernel (unnamed).
fn lower_group(
    graph: &IrGraph,
    members: &[IrNodeId],
    ctx: &PassContext,
) -> Result<(Vec<IrEdgeId>, Kernel)> {
    let root = *members
        .last()
        .ok_or_else(|| Error::InvalidGraph("empty fusion group".to_string()))?;
    let root_node = graph.node(root)?;
    let output = graph.edge(root_node.output)?.ty.clone();
    let ops: Vec<String> = members
        .iter()
        .map(|&m| graph.node(m).map(|n| n.op.clone()))
        .collect::<Result<_>>()?;

    if members.len() == 1 && root_node.pattern == OpPattern::Opaque {
        let body = lower_node(graph, root, ctx)?;
        let inputs = root_node.inputs.clone();
        let input_types = edge_types(graph, &inputs)?;
        if let KernelBody::Elementwise(expr) = &body {
            check_elementwise(&root_node.op, expr, &input_types, &output, ctx)?;
        }
        return Ok((inputs, new_kernel(body, input_types, output, ops)));
    }

    // Elementwise group: compose member expressions into one tree.
    let mut inputs: Vec<IrEdgeId> = Vec::new();
    let mut composed: HashMap<IrNodeId, ScalarExpr> = HashMap::new();
    for &member in members {
        let node = graph.node(member)?;
        let expr = match lower_node(graph, member, ctx)? {
            KernelBody::Elementwise(expr) => expr,
            _ => {
                return Err(Error::Lowering {
                    operator: node.op.clone(),
                    target: ctx.target.to_string(),
                    message: "elementwise operator must lower to an elementwise kernel"
                        .to_string(),
                });
            }
        };

        let mut args = Vec::with_capacity(node.inputs.len());
        for &edge in &node.inputs {
            let fused = graph
                .edge_producer(edge)
                .and_then(|producer| composed.get(&producer));
            match fused {
                Some(inner) => args.push(inner.clone()),
                None => {
                    let index = match inputs.iter().position(|&e| e == edge) {
                        Some(index) => index,
                        None => {
                            inputs.push(edge);
                            inputs.len() - 1
                        }
                    };
                    args.push(ScalarExpr::input(index));
                }
            }
        }

        let expr = expr.substitute(&args).ok_or_else(|| Error::Lowering {
            operator: node.op.clone(),
            target: ctx.target.to_string(),
            message: format!(
                "kernel expression reads past the operator's {} argument(s)",
                node.inputs.len()
            ),
        })?;
        composed.insert(member, expr);
    }

    let expr = composed
        .remove(&root)
        .ok_or_else(|| Error::InvalidGraph("fusion root was not lowered".to_string()))?;
    let input_types = edge_types(graph, &inputs)?;
    check_elementwise(&root_node.op, &expr, &input_types, &output, ctx)?;
    Ok((
        inputs,
        new_kernel(KernelBody::Elementwise(expr), input_types, output, ops),
    ))
}

fn lower_node(graph: &IrGraph, node_id: IrNodeId, ctx: &PassContext) -> Result<KernelBody> {
    let node = graph.node(node_id)?;
    let operator = ctx.registry.lookup(&node.op)?;
    if !operator.supports(ctx.target) {
        return Err(Error::Lowering {
            operator: node.op.clone(),
            target: ctx.target.to_string(),
            message: "operator has no implementation for this target".to_string(),
        });
    }
    let arg_types = edge_types(graph, &node.inputs)?;
    let output = &graph.edge(node.output)?.ty;
    let lower_ctx = LowerCtx::new(&node.op, &arg_types, output, &node.attrs, ctx.target);
    operator.lower(&lower_ctx)
}

/// Elementwise kernels evaluate in the output element type and read every
/// input broadcast to the output shape.
fn check_elementwise(
    op: &str,
    expr: &ScalarExpr,
    inputs: &[TensorType],
    output: &TensorType,
    ctx: &PassContext,
) -> Result<()> {
    let fail = |message: String| Error::Lowering {
        operator: op.to_string(),
        target: ctx.target.to_string(),
        message,
    };
    if let Some(max) = expr.max_input()
        && max >= inputs.len()
    {
        return Err(fail(format!(
            "kernel expression reads input {max} of {}",
            inputs.len()
        )));
    }
    for input in inputs {
        if input.dtype != output.dtype {
            return Err(fail(format!(
                "elementwise input {input} does not match output {output}"
            )));
        }
        if broadcast_shape(&input.shape, &output.shape).as_deref() != Some(output.shape.as_slice())
        {
            return Err(fail(format!(
                "elementwise input {input} does not broadcast to output {output}"
            )));
        }
    }
    Ok(())
}

fn edge_types(graph: &IrGraph, edges: &[IrEdgeId]) -> Result<Vec<TensorType>> {
    edges
        .iter()
        .map(|&e| Ok(graph.edge(e)?.ty.clone()))
        .collect()
}

fn new_kernel(
    body: KernelBody,
    inputs: Vec<TensorType>,
    output: TensorType,
    ops: Vec<String>,
) -> Kernel {
    Kernel {
        name: String::new(),
        body,
        inputs,
        output,
        ops,
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namer_is_unique_per_module() {
        let mut namer = KernelNamer::default();
        let ops = vec!["add".to_string()];
        assert_eq!(namer.name("default", "main", &ops), "default_main_fused_add");
        assert_eq!(namer.name("default", "main", &ops), "default_main_fused_add_1");
        assert_eq!(namer.name("default", "main", &ops), "default_main_fused_add_2");
        assert_eq!(namer.name("default", "other", &ops), "default_other_fused_add");
    }

    #[test]
    fn test_namer_sanitizes() {
        let mut namer = KernelNamer::default();
        let ops = vec!["my.op".to_string(), "add".to_string()];
        assert_eq!(namer.name("my-mod", "main", &ops), "my_mod_main_fused_my_op_add");
    }
}
