//! Fused multiply-add operator.

use quill_core::{
    BinaryOp, InferenceCtx, KernelBody, LowerCtx, OpPattern, Operator, Result, ScalarExpr,
    TensorType,
};

use crate::registry::CUSTOM_BACKEND;

/// `multiply_add(a, b, c) = a * b + c`.
///
/// All three arguments must have identical types; no broadcasting.
pub struct MultiplyAddOp;

impl Operator for MultiplyAddOp {
    fn name(&self) -> &str {
        "multiply_add"
    }

    fn arity(&self) -> usize {
        3
    }

    fn pattern(&self) -> OpPattern {
        OpPattern::ElemWise
    }

    fn supports_backend(&self, backend: &str) -> bool {
        backend == CUSTOM_BACKEND
    }

    fn infer(&self, ctx: &InferenceCtx) -> Result<TensorType> {
        let first = ctx.arg_type(0)?;
        for index in 1..3 {
            if ctx.arg_type(index)? != first {
                return Err(ctx.type_error("multiply_add requires identical argument types"));
            }
        }
        Ok(first.clone())
    }

    fn lower(&self, _ctx: &LowerCtx) -> Result<KernelBody> {
        Ok(KernelBody::Elementwise(ScalarExpr::binary(
            BinaryOp::Add,
            ScalarExpr::binary(BinaryOp::Mul, ScalarExpr::input(0), ScalarExpr::input(1)),
            ScalarExpr::input(2),
        )))
    }
}
