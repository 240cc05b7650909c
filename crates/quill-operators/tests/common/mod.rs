//! Common test utilities for operator tests.
//!
//! This module provides module builders and a compile-and-run helper shared
//! by the end-to-end operator tests.

#![allow(dead_code)]

use quill_core::{Attrs, DataType, Expr, Function, IrModule, TensorType, Var};
use quill_operators::standard_registry;

// Re-export types commonly used in tests
pub use quill_compiler::{CompileOptions, CompilerPipeline};
pub use quill_core::Target;
pub use quill_runtime::{Runtime, Tensor};

/// Initialize a tracing subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_test_writer()
        .try_init();
}

/// Create a module computing `op(a, b)`.
///
/// Function structure:
/// - Params: a:[dtype;a_shape], b:[dtype;b_shape]
/// - Body: op(a, b)
pub fn make_binary_module(
    op: &str,
    dtype: DataType,
    a_shape: &[usize],
    b_shape: &[usize],
) -> IrModule {
    let a = Var::new("a", TensorType::new(a_shape, dtype));
    let b = Var::new("b", TensorType::new(b_shape, dtype));
    let body = Expr::call(op, vec![a.expr(), b.expr()]);
    IrModule::from_function(Function::new(vec![a, b], body))
}

/// Create a module computing `op(input)`, with optional attributes.
pub fn make_unary_module(op: &str, dtype: DataType, shape: &[usize], attrs: Attrs) -> IrModule {
    let input = Var::new("input", TensorType::new(shape, dtype));
    let body = Expr::call_with_attrs(op, vec![input.expr()], attrs);
    IrModule::from_function(Function::new(vec![input], body))
}

/// Compile `module` for the host with the standard registry, bind `inputs`
/// by name, run, and return every output.
pub fn compile_and_run(
    module: &IrModule,
    inputs: &[(&str, Tensor)],
) -> anyhow::Result<Vec<Tensor>> {
    let registry = standard_registry();
    let compiled = CompilerPipeline::new(CompileOptions::default()).compile(
        module,
        &Target::host(),
        &registry,
    )?;

    let runtime = Runtime::cpu();
    let mut executor = runtime.load(std::sync::Arc::new(compiled))?;
    for (name, tensor) in inputs {
        executor.set_input(name, tensor.clone())?;
    }
    executor.run()?;

    (0..executor.num_outputs())
        .map(|i| Ok(executor.get_output(i)?.clone()))
        .collect()
}

/// Assert two f32 slices are equal element-wise within `epsilon`.
pub fn assert_vec_approx_eq(actual: &[f32], expected: &[f32], epsilon: f32) {
    assert_eq!(actual.len(), expected.len(), "Vector lengths differ");
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        let diff = (a - e).abs();
        assert!(
            diff < epsilon,
            "Element {} differs: {} vs {} (diff: {})",
            i,
            a,
            e,
            diff
        );
    }
}
