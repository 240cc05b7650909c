//! Operators backed by host functions.

use quill_core::{InferenceCtx, KernelBody, LowerCtx, Operator, Result, TensorType};

/// Operator whose kernel calls a host function registered with the runtime
/// under `symbol`.
///
/// The output type is fixed with [`with_output_type`](Self::with_output_type),
/// otherwise it equals the first argument's type.
pub struct ExternOp {
    name: String,
    symbol: String,
    arity: usize,
    output: Option<TensorType>,
}

impl ExternOp {
    pub fn new(name: &str, symbol: &str, arity: usize) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            arity,
            output: None,
        }
    }

    pub fn with_output_type(mut self, ty: TensorType) -> Self {
        self.output = Some(ty);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl Operator for ExternOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.arity
    }

    fn infer(&self, ctx: &InferenceCtx) -> Result<TensorType> {
        match &self.output {
            Some(ty) => Ok(ty.clone()),
            None if ctx.arg_count() > 0 => Ok(ctx.arg_type(0)?.clone()),
            None => Err(ctx.type_error("extern operator without arguments needs an output type")),
        }
    }

    fn lower(&self, _ctx: &LowerCtx) -> Result<KernelBody> {
        Ok(KernelBody::Extern {
            symbol: self.symbol.clone(),
        })
    }
}
