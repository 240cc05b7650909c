//! Error types for the runtime crate.

use quill_core::DataType;
use thiserror::Error;

/// Runtime loading and execution errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No parameter with this name.
    #[error("Unknown input: '{0}'")]
    UnknownInput(String),

    /// Bound tensor has the wrong shape.
    #[error("Input '{name}' expects shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Bound tensor has the wrong element type.
    #[error("Input '{name}' expects dtype {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: DataType,
        actual: DataType,
    },

    /// A parameter was never bound before `run`.
    #[error("Input '{name}' has not been set")]
    MissingInput { name: String },

    #[error("Output index {index} is out of range ({count} output(s))")]
    OutputIndexOutOfRange { index: usize, count: usize },

    /// Outputs were requested before a successful run.
    #[error("Function has not been executed")]
    NotExecuted,

    /// Positional invocation with the wrong number of arguments.
    #[error("Function takes {expected} argument(s), got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("Unknown function: '{0}'")]
    UnknownFunction(String),

    /// The module was compiled for a target the device cannot execute.
    #[error("Target '{0}' cannot run on this device")]
    UnsupportedTarget(String),

    /// A kernel calls a host function that was never registered.
    #[error("Extern function '{0}' is not registered")]
    UnresolvedExtern(String),

    #[error("Extern function '{0}' is already registered")]
    DuplicateExtern(String),

    /// Kernel execution failed.
    #[error("Kernel '{kernel}' failed: {message}")]
    Kernel { kernel: String, message: String },

    #[error(transparent)]
    Core(#[from] quill_core::Error),
}

/// Specialized Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
