//! Conversion of a type-checked `Function` into an `IrGraph`.

use crate::inference::TypeMap;
use quill_core::{
    Error, ExprId, ExprKind, Function, IrEdge, IrEdgeId, IrGraph, IrNode, OperatorRegistry,
    Result, post_order,
};
use std::collections::HashMap;

/// Build the dataflow graph for `function`.
///
/// Only nodes reachable from the outputs are included. Parameters become the
/// graph inputs in parameter order, even if the body ignores some of them.
pub fn build_graph(
    function: &Function,
    types: &TypeMap,
    registry: &OperatorRegistry,
) -> Result<IrGraph> {
    let mut graph = IrGraph::new();

    let mut var_edges: HashMap<u64, IrEdgeId> = HashMap::new();
    for (index, param) in function.params().iter().enumerate() {
        let edge = graph.add_edge(IrEdge::param(param.name(), param.ty().clone(), index));
        graph.inputs.push(edge);
        var_edges.insert(param.id(), edge);
    }

    let mut expr_edges: HashMap<ExprId, IrEdgeId> = HashMap::new();
    let mut constants = 0usize;

    for expr in post_order(function.outputs()) {
        let edge = match expr.kind() {
            ExprKind::Var(var) => *var_edges
                .get(&var.id())
                .ok_or_else(|| Error::UnboundVariable {
                    name: var.name().to_string(),
                })?,
            ExprKind::Constant(value) => {
                let name = format!("const{constants}");
                let edge = graph.add_edge(IrEdge::constant(&name, value.clone()));
                constants += 1;
                edge
            }
            ExprKind::Call(call) => {
                let op = registry.lookup(&call.op)?;
                let ty = types.get(&expr).cloned().ok_or_else(|| {
                    Error::InvalidGraph(format!("{} has no inferred type", expr.summary()))
                })?;
                let attrs = types.resolved_attrs(&expr).cloned().unwrap_or_default();
                let inputs = call
                    .args
                    .iter()
                    .map(|arg| {
                        expr_edges.get(&arg.id()).copied().ok_or_else(|| {
                            Error::InvalidGraph(format!(
                                "argument of {} has no edge",
                                expr.summary()
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                let name = format!("{}_{}", call.op, graph.node_count());
                let output = graph.add_edge(IrEdge::intermediate(&name, ty));
                graph.add_node(
                    IrNode::new(&call.op, op.pattern(), inputs, output).with_attrs(attrs),
                )?;
                output
            }
        };
        expr_edges.insert(expr.id(), edge);
    }

    for out in function.outputs() {
        let edge = expr_edges
            .get(&out.id())
            .copied()
            .ok_or_else(|| Error::InvalidGraph("function output has no edge".to_string()))?;
        graph.outputs.push(edge);
    }

    tracing::debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "built dataflow graph"
    );
    Ok(graph)
}
