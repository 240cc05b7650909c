//! Absolute value of one slice along an axis.

use quill_core::{
    AttrKind, AttrSpec, InferenceCtx, KernelBody, LowerCtx, Operator, Result, TensorType,
};
use std::sync::LazyLock;

use crate::registry::CUSTOM_BACKEND;

static SCHEMA: LazyLock<[AttrSpec; 2]> = LazyLock::new(|| {
    [
        AttrSpec::required("axis", AttrKind::Int),
        AttrSpec::required("index", AttrKind::Int),
    ]
});

/// `axis_abs(x, axis=a, index=i)`: replaces the slice `i` along axis `a` with
/// its absolute value and leaves every other element unchanged.
///
/// A negative `axis` counts from the last dimension.
pub struct AxisAbsOp;

impl AxisAbsOp {
    fn normalize_axis(axis: i64, rank: usize) -> Option<usize> {
        let rank = rank as i64;
        let axis = if axis < 0 { axis + rank } else { axis };
        (0..rank).contains(&axis).then_some(axis as usize)
    }
}

impl Operator for AxisAbsOp {
    fn name(&self) -> &str {
        "axis_abs"
    }

    fn arity(&self) -> usize {
        1
    }

    fn attr_schema(&self) -> &[AttrSpec] {
        SCHEMA.as_slice()
    }

    fn supports_backend(&self, backend: &str) -> bool {
        backend == CUSTOM_BACKEND
    }

    fn infer(&self, ctx: &InferenceCtx) -> Result<TensorType> {
        let ty = ctx.arg_type(0)?;
        let axis = ctx.attr_int("axis")?;
        let index = ctx.attr_int("index")?;

        let axis = Self::normalize_axis(axis, ty.rank()).ok_or_else(|| {
            ctx.type_error(format!("axis {axis} is out of range for rank {}", ty.rank()))
        })?;
        let dim = ty.shape[axis];
        if index < 0 || index as usize >= dim {
            return Err(ctx.type_error(format!(
                "index {index} is out of range for axis {axis} of size {dim}"
            )));
        }
        Ok(ty.clone())
    }

    fn lower(&self, ctx: &LowerCtx) -> Result<KernelBody> {
        let rank = ctx.arg_type(0)?.rank();
        let axis = ctx.attr_int("axis")?;
        let axis = Self::normalize_axis(axis, rank)
            .ok_or_else(|| ctx.lowering_error(format!("axis {axis} is out of range")))?;
        let index = usize::try_from(ctx.attr_int("index")?)
            .map_err(|_| ctx.lowering_error("index must be non-negative"))?;
        Ok(KernelBody::AxisAbs { axis, index })
    }
}
