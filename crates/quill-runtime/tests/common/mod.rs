//! Common test utilities for runtime tests.

#![allow(dead_code)]

use quill_core::{
    BinaryOp, CompiledModule, DataType, Expr, Function, IrModule, KernelBody, OpDef, OpPattern,
    OperatorRegistry, ScalarExpr, Target, TensorType, Var,
};
use quill_operators::standard_registry;
use std::sync::Arc;

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

/// Standard registry plus a user-defined `add2` operator built from closures.
pub fn registry_with_add2() -> OperatorRegistry {
    let mut registry = standard_registry();
    registry
        .register(
            OpDef::new("add2", 2)
                .with_pattern(OpPattern::ElemWise)
                .with_infer(|ctx| {
                    let (a, b) = (ctx.arg_type(0)?, ctx.arg_type(1)?);
                    if a != b {
                        return Err(ctx.type_error("add2 requires identical argument types"));
                    }
                    Ok(a.clone())
                })
                .with_lower(|_| {
                    Ok(KernelBody::Elementwise(ScalarExpr::binary(
                        BinaryOp::Add,
                        ScalarExpr::input(0),
                        ScalarExpr::input(1),
                    )))
                }),
        )
        .expect("add2 is not a standard operator");
    registry
}

/// `main(a, b) = add2(a, b)` over `[2, 2]` f32 tensors.
pub fn add2_module() -> IrModule {
    let ty = TensorType::new([2, 2], DataType::F32);
    let (a, b) = (Var::new("a", ty.clone()), Var::new("b", ty));
    let body = Expr::call("add2", vec![a.expr(), b.expr()]);
    IrModule::from_function(Function::new(vec![a, b], body))
}

pub fn compile_add2(target: &Target) -> Arc<CompiledModule> {
    let compiled = quill_compiler::compile(&add2_module(), target, 2, &registry_with_add2())
        .expect("add2 module compiles");
    Arc::new(compiled)
}
