//! Standard operator implementations for Quill.
//!
//! Operators are grouped into families where they share inference and
//! lowering logic and differ only in the scalar function they apply.
//!
//! # Operator Families
//!
//! - **Binary elementwise**: add, subtract, multiply, divide, maximum, minimum
//! - **Unary elementwise**: negative, abs, relu, exp, sqrt
//!
//! # Individual Operators
//!
//! - `multiply_add` (fused `a * b + c`)
//! - `mean_window` (trailing windowed mean over the last axis)
//! - `axis_abs` (absolute value of one slice along an axis)
//! - `ExternOp` (calls a host function registered with the runtime)

pub mod families;
pub mod operators;

mod helpers;
mod registry;

pub use families::{BinaryElementwiseOp, UnaryElementwiseOp};
pub use operators::{AxisAbsOp, ExternOp, MeanWindowOp, MultiplyAddOp};
pub use registry::{CUSTOM_BACKEND, standard_registry};
