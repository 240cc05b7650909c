//! Unary elementwise operator family.
//!
//! Covers: negative, abs, relu, exp, sqrt

use quill_core::{
    InferenceCtx, KernelBody, LowerCtx, OpPattern, Operator, Result, ScalarExpr, TensorType,
    UnaryOp,
};

use crate::helpers::require_float;

/// Unary elementwise operator family.
///
/// The output type equals the argument type. `exp` and `sqrt` accept only
/// floating-point arguments.
pub struct UnaryElementwiseOp {
    name: &'static str,
    op: UnaryOp,
    float_only: bool,
}

impl UnaryElementwiseOp {
    pub fn negative() -> Self {
        Self {
            name: "negative",
            op: UnaryOp::Neg,
            float_only: false,
        }
    }

    pub fn abs() -> Self {
        Self {
            name: "abs",
            op: UnaryOp::Abs,
            float_only: false,
        }
    }

    pub fn relu() -> Self {
        Self {
            name: "relu",
            op: UnaryOp::Relu,
            float_only: false,
        }
    }

    pub fn exp() -> Self {
        Self {
            name: "exp",
            op: UnaryOp::Exp,
            float_only: true,
        }
    }

    pub fn sqrt() -> Self {
        Self {
            name: "sqrt",
            op: UnaryOp::Sqrt,
            float_only: true,
        }
    }
}

impl Operator for UnaryElementwiseOp {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> usize {
        1
    }

    fn pattern(&self) -> OpPattern {
        OpPattern::ElemWise
    }

    fn infer(&self, ctx: &InferenceCtx) -> Result<TensorType> {
        if self.float_only {
            require_float(ctx, 0)?;
        }
        Ok(ctx.arg_type(0)?.clone())
    }

    fn lower(&self, _ctx: &LowerCtx) -> Result<KernelBody> {
        Ok(KernelBody::Elementwise(ScalarExpr::unary(
            self.op,
            ScalarExpr::input(0),
        )))
    }
}
