//! Kernel IR produced by lowering.
//!
//! A kernel is a target-independent description of one executable unit.
//! Elementwise kernels carry a scalar expression tree evaluated once per
//! output element, which is what fusion composes.

use crate::broadcast::broadcast_shape;
use crate::types::TensorType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Abs,
    Relu,
    Exp,
    Sqrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
}

/// Per-element expression over the kernel's inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarExpr {
    /// Element of the i-th input, broadcast to the output shape.
    Input(usize),
    Unary(UnaryOp, Box<ScalarExpr>),
    Binary(BinaryOp, Box<ScalarExpr>, Box<ScalarExpr>),
}

impl ScalarExpr {
    pub fn input(index: usize) -> Self {
        ScalarExpr::Input(index)
    }

    pub fn unary(op: UnaryOp, x: ScalarExpr) -> Self {
        ScalarExpr::Unary(op, Box::new(x))
    }

    pub fn binary(op: BinaryOp, lhs: ScalarExpr, rhs: ScalarExpr) -> Self {
        ScalarExpr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Replace every `Input(i)` with `args[i]`.
    ///
    /// Returns `None` if an input index is out of range.
    pub fn substitute(&self, args: &[ScalarExpr]) -> Option<ScalarExpr> {
        Some(match self {
            ScalarExpr::Input(i) => args.get(*i)?.clone(),
            ScalarExpr::Unary(op, x) => ScalarExpr::unary(*op, x.substitute(args)?),
            ScalarExpr::Binary(op, lhs, rhs) => {
                ScalarExpr::binary(*op, lhs.substitute(args)?, rhs.substitute(args)?)
            }
        })
    }

    /// Largest input index referenced, if any.
    pub fn max_input(&self) -> Option<usize> {
        match self {
            ScalarExpr::Input(i) => Some(*i),
            ScalarExpr::Unary(_, x) => x.max_input(),
            ScalarExpr::Binary(_, lhs, rhs) => lhs.max_input().max(rhs.max_input()),
        }
    }
}

impl fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarExpr::Input(i) => write!(f, "in{i}"),
            ScalarExpr::Unary(op, x) => write!(f, "{op:?}({x})"),
            ScalarExpr::Binary(op, lhs, rhs) => write!(f, "{op:?}({lhs}, {rhs})"),
        }
    }
}

/// What a kernel computes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelBody {
    /// `out[i] = expr(inputs broadcast at i)`.
    Elementwise(ScalarExpr),
    /// Trailing windowed mean over the last axis of input 0; input 1 holds the window.
    WindowedMean,
    /// Absolute value of slice `index` along `axis`; other elements pass through.
    AxisAbs { axis: usize, index: usize },
    /// Host function registered with the runtime under `symbol`.
    Extern { symbol: String },
}

/// One compiled kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kernel {
    pub name: String,
    pub body: KernelBody,
    pub inputs: Vec<TensorType>,
    pub output: TensorType,
    /// Names of the operators this kernel covers, in evaluation order.
    pub ops: Vec<String>,
    /// Generated C source, for targets that emit it.
    pub source: Option<String>,
}

impl Kernel {
    pub fn is_fused(&self) -> bool {
        self.ops.len() > 1
    }

    pub fn extern_symbol(&self) -> Option<&str> {
        match &self.body {
            KernelBody::Extern { symbol } => Some(symbol),
            _ => None,
        }
    }

    /// Check the body against the declared input and output types.
    ///
    /// Elementwise inputs must share the output dtype and broadcast to the
    /// output shape. Windowed-mean and axis-abs kernels pass their data
    /// input through unchanged in type, and their parameters must lie
    /// within its shape.
    ///
    /// # Errors
    ///
    /// Returns `Format` describing the first inconsistency.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| -> Result<()> {
            Err(Error::Format(format!("kernel '{}' {message}", self.name)))
        };
        let output = &self.output;

        match &self.body {
            KernelBody::Elementwise(expr) => {
                if let Some(max) = expr.max_input()
                    && max >= self.inputs.len()
                {
                    return fail(format!(
                        "reads input {max} but declares {}",
                        self.inputs.len()
                    ));
                }
                for (i, input) in self.inputs.iter().enumerate() {
                    if input.dtype != output.dtype {
                        return fail(format!("input {i} is {input}, output is {output}"));
                    }
                    if broadcast_shape(&input.shape, &output.shape).as_deref()
                        != Some(output.shape.as_slice())
                    {
                        return fail(format!("input {i} {input} does not broadcast to {output}"));
                    }
                }
            }
            KernelBody::WindowedMean => {
                let [data, window] = self.inputs.as_slice() else {
                    return fail(format!("takes 2 inputs, declares {}", self.inputs.len()));
                };
                if data != output || !output.dtype.is_float() || output.rank() == 0 {
                    return fail(format!("cannot average {data} into {output}"));
                }
                if window.numel() != 1 {
                    return fail(format!("window {window} must hold one element"));
                }
            }
            KernelBody::AxisAbs { axis, index } => {
                let [data] = self.inputs.as_slice() else {
                    return fail(format!("takes 1 input, declares {}", self.inputs.len()));
                };
                if data != output {
                    return fail(format!("maps {data} to {output}"));
                }
                match output.shape.get(*axis) {
                    Some(&dim) if *index < dim => {}
                    _ => return fail(format!("slice {index} of axis {axis} is outside {output}")),
                }
            }
            KernelBody::Extern { symbol } => {
                if symbol.is_empty() {
                    return fail("has an empty extern symbol".to_string());
                }
            }
        }
        Ok(())
    }
}
