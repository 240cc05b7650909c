//! Operator trait for the extensible operation system.

use crate::attrs::AttrSpec;
use crate::context::{InferenceCtx, LowerCtx};
use crate::kernel::KernelBody;
use crate::target::{Target, TargetKind};
use crate::types::TensorType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Scheduling pattern of an operator, used by fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpPattern {
    /// One output element depends only on the same element of each input.
    /// Must lower to `KernelBody::Elementwise`. Eligible for fusion.
    ElemWise,
    /// Anything else. Always gets its own kernel.
    Opaque,
}

/// Trait for implementing operators.
///
/// An operator describes how to type-check a call (`infer`) and how to turn
/// it into a kernel (`lower`). Operators are immutable once registered and
/// shared between threads.
///
/// # Example
///
/// ```ignore
/// struct Negative;
///
/// impl Operator for Negative {
///     fn name(&self) -> &str {
///         "negative"
///     }
///
///     fn arity(&self) -> usize {
///         1
///     }
///
///     fn pattern(&self) -> OpPattern {
///         OpPattern::ElemWise
///     }
///
///     fn infer(&self, ctx: &InferenceCtx) -> Result<TensorType> {
///         Ok(ctx.arg_type(0)?.clone())
///     }
///
///     fn lower(&self, _ctx: &LowerCtx) -> Result<KernelBody> {
///         Ok(KernelBody::Elementwise(ScalarExpr::unary(UnaryOp::Neg, ScalarExpr::input(0))))
///     }
/// }
/// ```
pub trait Operator: Send + Sync {
    /// Unique registry key (e.g., "add", "mean_window").
    fn name(&self) -> &str;

    /// Exact number of arguments a call must supply.
    fn arity(&self) -> usize;

    /// Attribute schema. Calls are checked against it before inference.
    fn attr_schema(&self) -> &[AttrSpec] {
        &[]
    }

    fn pattern(&self) -> OpPattern {
        OpPattern::Opaque
    }

    /// Whether this operator has an implementation for the named custom backend.
    fn supports_backend(&self, _backend: &str) -> bool {
        false
    }

    /// Whether this operator can be lowered for `target`.
    ///
    /// Built-in targets are supported by every operator; custom targets only
    /// by operators that declare the backend.
    fn supports(&self, target: &Target) -> bool {
        match target.kind() {
            TargetKind::Host | TargetKind::C => true,
            TargetKind::Custom(backend) => self.supports_backend(backend),
        }
    }

    /// Compute the output type from the argument types and attributes.
    fn infer(&self, ctx: &InferenceCtx) -> Result<TensorType>;

    /// Produce the kernel body for one call.
    fn lower(&self, ctx: &LowerCtx) -> Result<KernelBody>;
}

type InferFn = dyn Fn(&InferenceCtx) -> Result<TensorType> + Send + Sync;
type LowerFn = dyn Fn(&LowerCtx) -> Result<KernelBody> + Send + Sync;

/// Operator defined from closures instead of a dedicated type.
///
/// ```ignore
/// let add2 = OpDef::new("add2", 2)
///     .with_pattern(OpPattern::ElemWise)
///     .with_infer(|ctx| Ok(ctx.arg_type(0)?.clone()))
///     .with_lower(|_| Ok(KernelBody::Elementwise(ScalarExpr::binary(
///         BinaryOp::Add, ScalarExpr::input(0), ScalarExpr::input(1)))));
/// registry.register(add2)?;
/// ```
pub struct OpDef {
    name: String,
    arity: usize,
    schema: Vec<AttrSpec>,
    pattern: OpPattern,
    backends: Vec<String>,
    infer: Option<Box<InferFn>>,
    lower: Option<Box<LowerFn>>,
}

impl OpDef {
    pub fn new(name: &str, arity: usize) -> Self {
        Self {
            name: name.to_string(),
            arity,
            schema: Vec::new(),
            pattern: OpPattern::Opaque,
            backends: Vec::new(),
            infer: None,
            lower: None,
        }
    }

    pub fn with_attr(mut self, spec: AttrSpec) -> Self {
        self.schema.push(spec);
        self
    }

    pub fn with_pattern(mut self, pattern: OpPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Declare support for a custom backend.
    pub fn with_backend(mut self, name: &str) -> Self {
        self.backends.push(name.to_string());
        self
    }

    pub fn with_infer<F>(mut self, rule: F) -> Self
    where
        F: Fn(&InferenceCtx) -> Result<TensorType> + Send + Sync + 'static,
    {
        self.infer = Some(Box::new(rule));
        self
    }

    pub fn with_lower<F>(mut self, rule: F) -> Self
    where
        F: Fn(&LowerCtx) -> Result<KernelBody> + Send + Sync + 'static,
    {
        self.lower = Some(Box::new(rule));
        self
    }
}

impl Operator for OpDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.arity
    }

    fn attr_schema(&self) -> &[AttrSpec] {
        &self.schema
    }

    fn pattern(&self) -> OpPattern {
        self.pattern
    }

    fn supports_backend(&self, backend: &str) -> bool {
        self.backends.iter().any(|b| b == backend)
    }

    fn infer(&self, ctx: &InferenceCtx) -> Result<TensorType> {
        match &self.infer {
            Some(rule) => rule(ctx),
            None => Err(ctx.type_error("operator has no inference rule")),
        }
    }

    fn lower(&self, ctx: &LowerCtx) -> Result<KernelBody> {
        match &self.lower {
            Some(rule) => rule(ctx),
            None => Err(Error::Lowering {
                operator: self.name.clone(),
                target: ctx.target().to_string(),
                message: "operator has no lowering rule".to_string(),
            }),
        }
    }
}
