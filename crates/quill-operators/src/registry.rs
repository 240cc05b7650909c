//! Standard operator registry.

use quill_core::{Operator, OperatorRegistry};
use std::sync::Arc;

use crate::families::{BinaryElementwiseOp, UnaryElementwiseOp};
use crate::operators::{AxisAbsOp, MeanWindowOp, MultiplyAddOp};

/// Name of the custom backend some standard operators implement.
pub const CUSTOM_BACKEND: &str = "custom";

/// Returns an operator registry pre-populated with the standard operators.
///
/// The registry includes:
/// - 6 binary elementwise operators (add, subtract, multiply, divide, maximum, minimum)
/// - 5 unary elementwise operators (negative, abs, relu, exp, sqrt)
/// - multiply_add, mean_window, axis_abs
///
/// Custom operators can be added to the returned registry via
/// `registry.register(operator)`.
///
/// # Panics
///
/// Panics if two standard operators share a name.
pub fn standard_registry() -> OperatorRegistry {
    let operators: Vec<Arc<dyn Operator>> = vec![
        // Binary elementwise operators
        Arc::new(BinaryElementwiseOp::add()),
        Arc::new(BinaryElementwiseOp::subtract()),
        Arc::new(BinaryElementwiseOp::multiply()),
        Arc::new(BinaryElementwiseOp::divide()),
        Arc::new(BinaryElementwiseOp::maximum()),
        Arc::new(BinaryElementwiseOp::minimum()),
        // Unary elementwise operators
        Arc::new(UnaryElementwiseOp::negative()),
        Arc::new(UnaryElementwiseOp::abs()),
        Arc::new(UnaryElementwiseOp::relu()),
        Arc::new(UnaryElementwiseOp::exp()),
        Arc::new(UnaryElementwiseOp::sqrt()),
        Arc::new(MultiplyAddOp),
        Arc::new(MeanWindowOp),
        Arc::new(AxisAbsOp),
    ];

    let mut registry = OperatorRegistry::new();
    for operator in operators {
        let name = operator.name().to_string();
        if let Err(e) = registry.register_arc(operator) {
            panic!("standard operator '{name}' cannot be registered: {e}");
        }
    }

    tracing::debug!(operators = registry.len(), "built standard registry");
    registry
}
