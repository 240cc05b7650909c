//! Trailing windowed mean over the last axis.

use quill_core::{InferenceCtx, KernelBody, LowerCtx, Operator, Result, TensorType};

use crate::helpers::require_float;
use crate::registry::CUSTOM_BACKEND;

/// `mean_window(x, w)`: for each position `i` along the last axis of `x`,
/// the mean of `x[max(0, i + 1 - w) ..= i]`.
///
/// `x` is a floating-point tensor of rank 1 or more. `w` holds a single
/// element of any dtype; its value is read at run time and must be a whole
/// number of at least 1. Leading positions average over the shorter prefix.
pub struct MeanWindowOp;

impl Operator for MeanWindowOp {
    fn name(&self) -> &str {
        "mean_window"
    }

    fn arity(&self) -> usize {
        2
    }

    fn supports_backend(&self, backend: &str) -> bool {
        backend == CUSTOM_BACKEND
    }

    fn infer(&self, ctx: &InferenceCtx) -> Result<TensorType> {
        require_float(ctx, 0)?;
        let data = ctx.arg_type(0)?;
        if data.rank() == 0 {
            return Err(ctx.type_error("mean_window requires data of rank 1 or more"));
        }
        if ctx.arg_type(1)?.numel() != 1 {
            return Err(ctx.type_error("window must contain exactly one element"));
        }
        Ok(data.clone())
    }

    fn lower(&self, _ctx: &LowerCtx) -> Result<KernelBody> {
        Ok(KernelBody::WindowedMean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{Attrs, DataType, Error, Expr};

    fn infer(args: &[TensorType]) -> Result<TensorType> {
        let call = Expr::call("mean_window", vec![]);
        let attrs = Attrs::new();
        MeanWindowOp.infer(&InferenceCtx::new(&call, "mean_window", args, &attrs))
    }

    #[test]
    fn test_output_matches_data() {
        let data = TensorType::new([10], DataType::F32);
        let out = infer(&[data.clone(), TensorType::new([1], DataType::I64)]).unwrap();
        assert_eq!(out, data);

        // scalar windows of any dtype are accepted
        assert!(infer(&[data, TensorType::scalar(DataType::F32)]).is_ok());
    }

    #[test]
    fn test_rejects_integer_data() {
        let err = infer(&[
            TensorType::new([10], DataType::I32),
            TensorType::new([1], DataType::I32),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::TypeInference { .. }));
    }

    #[test]
    fn test_rejects_wide_window() {
        assert!(
            infer(&[
                TensorType::new([10], DataType::F64),
                TensorType::new([2], DataType::I64),
            ])
            .is_err()
        );
    }

    #[test]
    fn test_rejects_scalar_data() {
        assert!(
            infer(&[
                TensorType::scalar(DataType::F32),
                TensorType::new([1], DataType::I64),
            ])
            .is_err()
        );
    }
}
