//! Binary elementwise operator family.
//!
//! Covers: add, subtract, multiply, divide, maximum, minimum

use quill_core::{
    BinaryOp, InferenceCtx, KernelBody, LowerCtx, OpPattern, Operator, Result, ScalarExpr,
    TensorType,
};

use crate::helpers::infer_broadcast;
use crate::registry::CUSTOM_BACKEND;

/// Binary elementwise operator family.
///
/// All members share the same structure:
/// - NumPy-style broadcasting for shape inference, same dtype on both sides
/// - A single `BinaryOp` kernel expression over the two arguments
///
/// Integer division by zero yields 0.
pub struct BinaryElementwiseOp {
    name: &'static str,
    op: BinaryOp,
    backends: &'static [&'static str],
}

impl BinaryElementwiseOp {
    /// Create an add operator.
    pub fn add() -> Self {
        Self {
            name: "add",
            op: BinaryOp::Add,
            backends: &[],
        }
    }

    /// Create a subtract operator.
    pub fn subtract() -> Self {
        Self {
            name: "subtract",
            op: BinaryOp::Sub,
            backends: &[],
        }
    }

    /// Create a multiply operator. Also implemented by the custom backend.
    pub fn multiply() -> Self {
        Self {
            name: "multiply",
            op: BinaryOp::Mul,
            backends: &[CUSTOM_BACKEND],
        }
    }

    /// Create a divide operator.
    pub fn divide() -> Self {
        Self {
            name: "divide",
            op: BinaryOp::Div,
            backends: &[],
        }
    }

    /// Create a maximum operator.
    pub fn maximum() -> Self {
        Self {
            name: "maximum",
            op: BinaryOp::Max,
            backends: &[],
        }
    }

    /// Create a minimum operator.
    pub fn minimum() -> Self {
        Self {
            name: "minimum",
            op: BinaryOp::Min,
            backends: &[],
        }
    }

    pub fn op(&self) -> BinaryOp {
        self.op
    }
}

impl Operator for BinaryElementwiseOp {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> usize {
        2
    }

    fn pattern(&self) -> OpPattern {
        OpPattern::ElemWise
    }

    fn supports_backend(&self, backend: &str) -> bool {
        self.backends.contains(&backend)
    }

    fn infer(&self, ctx: &InferenceCtx) -> Result<TensorType> {
        infer_broadcast(ctx)
    }

    fn lower(&self, _ctx: &LowerCtx) -> Result<KernelBody> {
        Ok(KernelBody::Elementwise(ScalarExpr::binary(
            self.op,
            ScalarExpr::input(0),
            ScalarExpr::input(1),
        )))
    }
}
