//! Type and shape inference over expression graphs.
//!
//! Inference walks a function bottom-up (arguments before calls), checks each
//! call against its operator's arity and attribute schema, and asks the
//! operator's inference rule for the result type. Shared nodes are inferred
//! once. Any failure aborts the whole pass.

use quill_core::{
    Attrs, Error, Expr, ExprId, ExprKind, Function, InferenceCtx, IrModule, OperatorRegistry,
    Result, TensorType, post_order,
};
use std::collections::{BTreeMap, HashMap};

/// Inferred types for every node of one function.
///
/// Keys are node identities. The map holds a handle to every node it
/// types, so an identity cannot be reused by a new node while the map is
/// alive, even after the function itself is dropped.
#[derive(Debug, Clone)]
pub struct TypeMap {
    types: HashMap<ExprId, TensorType>,
    attrs: HashMap<ExprId, Attrs>,
    outputs: Vec<TensorType>,
    nodes: Vec<Expr>,
}

impl PartialEq for TypeMap {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types && self.attrs == other.attrs && self.outputs == other.outputs
    }
}

impl TypeMap {
    /// Type of a node, if it belongs to the inferred function.
    pub fn get(&self, expr: &Expr) -> Option<&TensorType> {
        self.types.get(&expr.id())
    }

    /// Attributes of a call after schema resolution.
    pub fn resolved_attrs(&self, expr: &Expr) -> Option<&Attrs> {
        self.attrs.get(&expr.id())
    }

    /// Types of the function outputs, in output order.
    pub fn output_types(&self) -> &[TensorType] {
        &self.outputs
    }

    /// Number of typed nodes.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Infer the type of every node reachable from the function outputs.
///
/// # Errors
///
/// - `UnboundVariable` / `InvalidGraph` from function validation
/// - `UnknownOperator` if a call names an unregistered operator
/// - `ArityMismatch` if a call has the wrong number of arguments
/// - `InvalidAttribute` if a call's attributes don't match the schema
/// - `TypeInference` if an operator's inference rule rejects its arguments
#[tracing::instrument(skip_all, fields(params = function.params().len()))]
pub fn infer_function(function: &Function, registry: &OperatorRegistry) -> Result<TypeMap> {
    function.validate()?;

    let mut types: HashMap<ExprId, TensorType> = HashMap::new();
    let mut attrs: HashMap<ExprId, Attrs> = HashMap::new();

    let nodes = post_order(function.outputs());
    for expr in &nodes {
        let ty = match expr.kind() {
            ExprKind::Var(var) => var.ty().clone(),
            ExprKind::Constant(value) => value.tensor_type(),
            ExprKind::Call(call) => {
                let op = registry.lookup(&call.op)?;
                if call.args.len() != op.arity() {
                    return Err(Error::ArityMismatch {
                        operator: call.op.clone(),
                        expected: op.arity(),
                        actual: call.args.len(),
                    });
                }
                let resolved = call.attrs.resolve(&call.op, op.attr_schema())?;
                let arg_types = call
                    .args
                    .iter()
                    .map(|arg| {
                        types.get(&arg.id()).cloned().ok_or_else(|| {
                            Error::InvalidGraph(format!(
                                "argument of {} visited before its definition",
                                expr.summary()
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                let ctx = InferenceCtx::new(expr, &call.op, &arg_types, &resolved);
                let ty = op.infer(&ctx)?;
                tracing::trace!(node = %expr.summary(), ty = %ty, "inferred");
                attrs.insert(expr.id(), resolved);
                ty
            }
        };
        types.insert(expr.id(), ty);
    }

    let outputs = function
        .outputs()
        .iter()
        .map(|out| {
            types
                .get(&out.id())
                .cloned()
                .ok_or_else(|| Error::InvalidGraph("output was not inferred".to_string()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TypeMap {
        types,
        attrs,
        outputs,
        nodes,
    })
}

/// Infer every function of a module, keyed by function name.
pub fn infer_module(
    module: &IrModule,
    registry: &OperatorRegistry,
) -> Result<BTreeMap<String, TypeMap>> {
    module
        .functions()
        .map(|(name, function)| Ok((name.to_string(), infer_function(function, registry)?)))
        .collect()
}
