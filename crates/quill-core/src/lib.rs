//! Core intermediate representation, operator traits, and compiled-module types for Quill.
//!
//! This crate provides the foundational abstractions that all other Quill crates depend on:
//! - Expression IR (`Var`, `Expr`, `Function`, `IrModule`)
//! - Operator trait, closure-based `OpDef`, and the `OperatorRegistry`
//! - Dataflow graph used by compiler passes (`IrGraph`, `IrNode`, `IrEdge`)
//! - Kernel IR and the serializable `CompiledModule` artifact
//! - Target descriptions

pub mod attrs;
pub mod broadcast;
pub mod context;
pub mod expr;
pub mod ir;
pub mod kernel;
pub mod module;
pub mod operator;
pub mod pass;
pub mod registry;
pub mod target;
pub mod types;

// Re-export commonly used types
pub use attrs::{AttrKind, AttrSpec, AttrValue, Attrs};
pub use broadcast::{broadcast_offset, broadcast_shape, broadcast_strides};
pub use context::{InferenceCtx, LowerCtx};
pub use expr::{Call, Expr, ExprId, ExprKind, Function, IrModule, Var, post_order};
pub use ir::{EdgeData, IrEdge, IrEdgeId, IrGraph, IrNode, IrNodeId};
pub use kernel::{BinaryOp, Kernel, KernelBody, ScalarExpr, UnaryOp};
pub use module::{CompiledModule, ConstantSlot, FunctionPlan, KernelStep, OutputSlot, ParamSlot};
pub use operator::{OpDef, OpPattern, Operator};
pub use pass::{Pass, PassContext, Stage};
pub use registry::OperatorRegistry;
pub use target::{Target, TargetKind};
pub use types::{DataType, Element, Tensor, TensorData, TensorType};

/// Result type using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for quill-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Operator '{0}' is already registered")]
    DuplicateOperator(String),

    #[error("Operator '{operator}' expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        operator: String,
        expected: usize,
        actual: usize,
    },

    #[error("Type inference failed at {node}: {message}")]
    TypeInference { node: String, message: String },

    #[error("Variable '%{name}' is not bound by the function parameters")]
    UnboundVariable { name: String },

    #[error("Attribute error: {0}")]
    InvalidAttribute(String),

    #[error("Cannot lower operator '{operator}' for target '{target}': {message}")]
    Lowering {
        operator: String,
        target: String,
        message: String,
    },

    #[error("Invalid graph structure: {0}")]
    InvalidGraph(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Tensor error: {0}")]
    Tensor(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed compiled module: {0}")]
    Format(String),
}
