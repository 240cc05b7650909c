//! Context types handed to operator inference and lowering rules.

use crate::attrs::Attrs;
use crate::expr::Expr;
use crate::target::Target;
use crate::types::{DataType, TensorType};
use crate::{Error, Result};

/// Context for type and shape inference of one call.
///
/// Provides read-only access to:
/// - Argument types (already inferred)
/// - Resolved attributes (schema defaults filled in)
/// - The call node itself, for diagnostics
pub struct InferenceCtx<'a> {
    call: &'a Expr,
    op: &'a str,
    arg_types: &'a [TensorType],
    attrs: &'a Attrs,
}

impl<'a> InferenceCtx<'a> {
    pub fn new(call: &'a Expr, op: &'a str, arg_types: &'a [TensorType], attrs: &'a Attrs) -> Self {
        Self {
            call,
            op,
            arg_types,
            attrs,
        }
    }

    pub fn op_name(&self) -> &str {
        self.op
    }

    /// Get the number of arguments.
    pub fn arg_count(&self) -> usize {
        self.arg_types.len()
    }

    /// Get the type of an argument.
    pub fn arg_type(&self, index: usize) -> Result<&TensorType> {
        self.arg_types
            .get(index)
            .ok_or_else(|| self.type_error(format!("argument {index} not found")))
    }

    pub fn arg_shape(&self, index: usize) -> Result<&[usize]> {
        Ok(&self.arg_type(index)?.shape)
    }

    pub fn arg_dtype(&self, index: usize) -> Result<DataType> {
        Ok(self.arg_type(index)?.dtype)
    }

    pub fn arg_types(&self) -> &[TensorType] {
        self.arg_types
    }

    pub fn attrs(&self) -> &Attrs {
        self.attrs
    }

    /// Get an integer attribute.
    pub fn attr_int(&self, key: &str) -> Result<i64> {
        self.attrs.int(key)
    }

    pub fn attr_float(&self, key: &str) -> Result<f64> {
        self.attrs.float(key)
    }

    /// Create a type inference error with details about the call and its arguments.
    ///
    /// Includes the operator name, the call rendering, and every argument type,
    /// so a failure deep inside a large graph can be located.
    pub fn type_error(&self, message: impl Into<String>) -> Error {
        let mut message = message.into();
        let args: Vec<String> = self.arg_types.iter().map(|t| t.to_string()).collect();
        if !args.is_empty() {
            message.push_str(&format!(" (argument types: {})", args.join(", ")));
        }
        Error::TypeInference {
            node: self.call.summary(),
            message,
        }
    }
}

/// Context for lowering one call to a kernel body.
pub struct LowerCtx<'a> {
    op: &'a str,
    arg_types: &'a [TensorType],
    output: &'a TensorType,
    attrs: &'a Attrs,
    target: &'a Target,
}

impl<'a> LowerCtx<'a> {
    pub fn new(
        op: &'a str,
        arg_types: &'a [TensorType],
        output: &'a TensorType,
        attrs: &'a Attrs,
        target: &'a Target,
    ) -> Self {
        Self {
            op,
            arg_types,
            output,
            attrs,
            target,
        }
    }

    pub fn op_name(&self) -> &str {
        self.op
    }

    pub fn arg_count(&self) -> usize {
        self.arg_types.len()
    }

    pub fn arg_type(&self, index: usize) -> Result<&TensorType> {
        self.arg_types
            .get(index)
            .ok_or_else(|| self.lowering_error(format!("argument {index} not found")))
    }

    pub fn output_type(&self) -> &TensorType {
        self.output
    }

    pub fn attrs(&self) -> &Attrs {
        self.attrs
    }

    pub fn attr_int(&self, key: &str) -> Result<i64> {
        self.attrs.int(key)
    }

    pub fn target(&self) -> &Target {
        self.target
    }

    /// Create a lowering error naming the operator and target.
    pub fn lowering_error(&self, message: impl Into<String>) -> Error {
        Error::Lowering {
            operator: self.op.to_string(),
            target: self.target.to_string(),
            message: message.into(),
        }
    }
}
