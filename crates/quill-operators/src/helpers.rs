//! Shared inference helpers.

use quill_core::{DataType, InferenceCtx, Result, TensorType, broadcast_shape};

/// Output type of a broadcasting elementwise call.
///
/// Every argument must share the first argument's dtype; shapes broadcast
/// NumPy style.
pub fn infer_broadcast(ctx: &InferenceCtx) -> Result<TensorType> {
    let first = ctx.arg_type(0)?;
    let mut shape = first.shape.clone();
    for index in 1..ctx.arg_count() {
        let ty = ctx.arg_type(index)?;
        if ty.dtype != first.dtype {
            return Err(ctx.type_error(format!(
                "argument {index} has dtype {}, expected {}",
                ty.dtype, first.dtype
            )));
        }
        shape = broadcast_shape(&shape, &ty.shape).ok_or_else(|| {
            ctx.type_error(format!(
                "shapes {:?} and {:?} cannot be broadcast",
                shape, ty.shape
            ))
        })?;
    }
    Ok(TensorType::new(shape, first.dtype))
}

/// Fail unless argument `index` has a floating-point dtype.
pub fn require_float(ctx: &InferenceCtx, index: usize) -> Result<DataType> {
    let dtype = ctx.arg_dtype(index)?;
    if !dtype.is_float() {
        return Err(ctx.type_error(format!(
            "{} requires a floating-point argument, got {dtype}",
            ctx.op_name()
        )));
    }
    Ok(dtype)
}
