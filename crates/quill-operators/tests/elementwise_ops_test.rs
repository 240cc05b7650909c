//! End-to-end tests for the elementwise operator families and multiply_add.

mod common;

use common::{
    Tensor, assert_vec_approx_eq, compile_and_run, init_tracing, make_binary_module,
    make_unary_module,
};
use quill_core::{Attrs, DataType, Expr, Function, IrModule, TensorType, Var};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ================================================================================
// Binary operators
// ================================================================================

#[test]
fn test_add_2x2() -> anyhow::Result<()> {
    init_tracing();
    let module = make_binary_module("add", DataType::F32, &[2, 2], &[2, 2]);
    let a = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], &[2, 2]);
    let b = Tensor::from_vec(vec![5.0f32, 6.0, 7.0, 8.0], &[2, 2]);

    let outputs = compile_and_run(&module, &[("a", a), ("b", b)])?;
    assert_eq!(outputs[0].shape(), &[2, 2]);
    assert_eq!(outputs[0].to_vec::<f32>()?, vec![6.0, 8.0, 10.0, 12.0]);
    Ok(())
}

#[test]
fn test_subtract_broadcast_row() -> anyhow::Result<()> {
    let module = make_binary_module("subtract", DataType::I64, &[2, 3], &[3]);
    let a = Tensor::from_vec(vec![10i64, 20, 30, 40, 50, 60], &[2, 3]);
    let b = Tensor::from_vec(vec![1i64, 2, 3], &[3]);

    let outputs = compile_and_run(&module, &[("a", a), ("b", b)])?;
    assert_eq!(outputs[0].to_vec::<i64>()?, vec![9, 18, 27, 39, 48, 57]);
    Ok(())
}

#[test]
fn test_multiply_broadcast_both_sides() -> anyhow::Result<()> {
    let module = make_binary_module("multiply", DataType::I32, &[2, 1], &[1, 3]);
    let a = Tensor::from_vec(vec![2i32, 3], &[2, 1]);
    let b = Tensor::from_vec(vec![1i32, 10, 100], &[1, 3]);

    let outputs = compile_and_run(&module, &[("a", a), ("b", b)])?;
    assert_eq!(outputs[0].shape(), &[2, 3]);
    assert_eq!(outputs[0].to_vec::<i32>()?, vec![2, 20, 200, 3, 30, 300]);
    Ok(())
}

#[test]
fn test_divide_integer_by_zero() -> anyhow::Result<()> {
    let module = make_binary_module("divide", DataType::I32, &[4], &[4]);
    let a = Tensor::from_vec(vec![9i32, -9, 5, 7], &[4]);
    let b = Tensor::from_vec(vec![2i32, 2, 0, -7], &[4]);

    let outputs = compile_and_run(&module, &[("a", a), ("b", b)])?;
    assert_eq!(outputs[0].to_vec::<i32>()?, vec![4, -4, 0, -1]);
    Ok(())
}

#[test]
fn test_maximum_minimum() -> anyhow::Result<()> {
    let a = Tensor::from_vec(vec![1.0f64, 5.0, -2.0], &[3]);
    let b = Tensor::from_vec(vec![3.0f64, 4.0, -1.0], &[3]);

    let max = make_binary_module("maximum", DataType::F64, &[3], &[3]);
    let outputs = compile_and_run(&max, &[("a", a.clone()), ("b", b.clone())])?;
    assert_eq!(outputs[0].to_vec::<f64>()?, vec![3.0, 5.0, -1.0]);

    let min = make_binary_module("minimum", DataType::F64, &[3], &[3]);
    let outputs = compile_and_run(&min, &[("a", a), ("b", b)])?;
    assert_eq!(outputs[0].to_vec::<f64>()?, vec![1.0, 4.0, -2.0]);
    Ok(())
}

#[test]
fn test_mixed_dtypes_rejected() {
    let a = Var::new("a", TensorType::new([2], DataType::F32));
    let b = Var::new("b", TensorType::new([2], DataType::I32));
    let body = Expr::call("add", vec![a.expr(), b.expr()]);
    let module = IrModule::from_function(Function::new(vec![a, b], body));

    let result = compile_and_run(&module, &[]);
    assert!(result.is_err());
}

// ================================================================================
// Unary operators
// ================================================================================

#[test]
fn test_negative_abs_relu() -> anyhow::Result<()> {
    let input = Tensor::from_vec(vec![-1.5f32, 0.0, 2.5], &[3]);
    let cases: [(&str, Vec<f32>); 3] = [
        ("negative", vec![1.5, 0.0, -2.5]),
        ("abs", vec![1.5, 0.0, 2.5]),
        ("relu", vec![0.0, 0.0, 2.5]),
    ];

    for (op, expected) in cases {
        let module = make_unary_module(op, DataType::F32, &[3], Attrs::new());
        let outputs = compile_and_run(&module, &[("input", input.clone())])?;
        assert_eq!(outputs[0].to_vec::<f32>()?, expected, "operator {op}");
    }
    Ok(())
}

#[test]
fn test_exp_sqrt() -> anyhow::Result<()> {
    let module = make_unary_module("exp", DataType::F32, &[3], Attrs::new());
    let input = Tensor::from_vec(vec![0.0f32, 1.0, -1.0], &[3]);
    let outputs = compile_and_run(&module, &[("input", input)])?;
    assert_vec_approx_eq(
        &outputs[0].to_vec::<f32>()?,
        &[1.0, std::f32::consts::E, 1.0 / std::f32::consts::E],
        1e-6,
    );

    let module = make_unary_module("sqrt", DataType::F32, &[4], Attrs::new());
    let input = Tensor::from_vec(vec![0.0f32, 1.0, 4.0, 2.0], &[4]);
    let outputs = compile_and_run(&module, &[("input", input)])?;
    assert_vec_approx_eq(
        &outputs[0].to_vec::<f32>()?,
        &[0.0, 1.0, 2.0, std::f32::consts::SQRT_2],
        1e-6,
    );
    Ok(())
}

#[test]
fn test_sqrt_rejects_integers() {
    let module = make_unary_module("sqrt", DataType::I32, &[2], Attrs::new());
    assert!(compile_and_run(&module, &[]).is_err());
}

// ================================================================================
// multiply_add
// ================================================================================

fn multiply_add_module(shape: &[usize]) -> IrModule {
    let ty = TensorType::new(shape, DataType::F32);
    let a = Var::new("a", ty.clone());
    let b = Var::new("b", ty.clone());
    let c = Var::new("c", ty);
    let body = Expr::call("multiply_add", vec![a.expr(), b.expr(), c.expr()]);
    IrModule::from_function(Function::new(vec![a, b, c], body))
}

#[test]
fn test_multiply_add_random_inputs() -> anyhow::Result<()> {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(42);
    let n = 64;
    let mut random = || -> Vec<f32> { (0..n).map(|_| rng.gen_range(-10.0..10.0)).collect() };
    let (a, b, c) = (random(), random(), random());
    let expected: Vec<f32> = (0..n).map(|i| a[i] * b[i] + c[i]).collect();

    let outputs = compile_and_run(
        &multiply_add_module(&[n]),
        &[
            ("a", Tensor::from_vec(a, &[n])),
            ("b", Tensor::from_vec(b, &[n])),
            ("c", Tensor::from_vec(c, &[n])),
        ],
    )?;
    assert_vec_approx_eq(&outputs[0].to_vec::<f32>()?, &expected, 1e-4);
    Ok(())
}

#[test]
fn test_multiply_add_rejects_broadcast() {
    let a = Var::new("a", TensorType::new([4], DataType::F32));
    let b = Var::new("b", TensorType::new([4], DataType::F32));
    let c = Var::new("c", TensorType::new([1], DataType::F32));
    let body = Expr::call("multiply_add", vec![a.expr(), b.expr(), c.expr()]);
    let module = IrModule::from_function(Function::new(vec![a, b, c], body));
    assert!(compile_and_run(&module, &[]).is_err());
}
