//! End-to-end tests: compile with `quill-compiler`, execute with the runtime.

mod common;

use common::{add2_module, compile_add2, init_tracing, registry_with_add2};
use quill_core::{
    Attrs, CompiledModule, DataType, Error, Expr, Function, IrModule, Kernel, KernelBody,
    OperatorRegistry, ScalarExpr, Target, TensorType, Var,
};
use quill_operators::{ExternOp, standard_registry};
use quill_runtime::{ExecutorState, Runtime, RuntimeError, Tensor};
use std::sync::Arc;

fn a() -> Tensor {
    Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], &[2, 2])
}

fn b() -> Tensor {
    Tensor::from_vec(vec![5.0f32, 6.0, 7.0, 8.0], &[2, 2])
}

#[test]
fn test_add2_end_to_end() -> anyhow::Result<()> {
    init_tracing();
    let runtime = Runtime::cpu();
    let mut executor = runtime.load(compile_add2(&Target::host()))?;

    executor.set_input("a", a())?;
    executor.set_input("b", b())?;
    executor.run()?;

    let out = executor.get_output(0)?;
    assert_eq!(out.shape(), &[2, 2]);
    assert_eq!(out.to_vec::<f32>()?, vec![6.0, 8.0, 10.0, 12.0]);
    assert_eq!(executor.state(), ExecutorState::Completed);
    Ok(())
}

#[test]
fn test_missing_input_then_rebind_without_recompiling() -> anyhow::Result<()> {
    let runtime = Runtime::cpu();
    let mut executor = runtime.load(compile_add2(&Target::host()))?;

    executor.set_input("a", a())?;
    match executor.run() {
        Err(RuntimeError::MissingInput { name }) => assert_eq!(name, "b"),
        other => panic!("expected MissingInput, got {other:?}"),
    }

    executor.set_input("b", b())?;
    executor.run()?;
    assert_eq!(executor.get_output(0)?.to_vec::<f32>()?, vec![6.0, 8.0, 10.0, 12.0]);
    Ok(())
}

#[test]
fn test_output_index_out_of_range() -> anyhow::Result<()> {
    let runtime = Runtime::cpu();
    let mut executor = runtime.load(compile_add2(&Target::host()))?;
    assert!(matches!(
        executor.get_output(0),
        Err(RuntimeError::NotExecuted)
    ));

    executor.invoke(&[a(), b()])?;
    assert!(matches!(
        executor.get_output(5),
        Err(RuntimeError::OutputIndexOutOfRange { index: 5, count: 1 })
    ));
    Ok(())
}

#[test]
fn test_invoke_positional() -> anyhow::Result<()> {
    let runtime = Runtime::cpu();
    let mut executor = runtime.load(compile_add2(&Target::host()))?;
    let outputs = executor.invoke(&[a(), b()])?;
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].to_vec::<f32>()?, vec![6.0, 8.0, 10.0, 12.0]);
    Ok(())
}

#[test]
fn test_export_import_round_trip() -> anyhow::Result<()> {
    init_tracing();
    let compiled = compile_add2(&Target::host());
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("add2.quill");

    compiled.export(&path)?;
    let loaded = Arc::new(CompiledModule::load(&path)?);
    assert_eq!(*loaded, *compiled);

    let runtime = Runtime::cpu();
    let mut executor = runtime.load(loaded)?;
    let outputs = executor.invoke(&[a(), b()])?;
    assert_eq!(outputs[0].to_vec::<f32>()?, vec![6.0, 8.0, 10.0, 12.0]);
    Ok(())
}

#[test]
fn test_corrupt_artifact_detected() -> anyhow::Result<()> {
    let compiled = compile_add2(&Target::host());
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("corrupt.quill");

    let mut bytes = compiled.to_bytes()?;
    bytes.truncate(bytes.len() / 2);
    std::fs::write(&path, &bytes)?;
    assert!(matches!(CompiledModule::load(&path), Err(Error::Format(_))));

    assert!(matches!(
        CompiledModule::load(dir.path().join("missing.quill")),
        Err(Error::Io(_))
    ));
    Ok(())
}

/// Encode `module`, then check that decoding and loading both reject it.
fn assert_rejected(module: CompiledModule) -> anyhow::Result<()> {
    let bytes = module.to_bytes()?;
    assert!(matches!(
        CompiledModule::from_bytes(&bytes),
        Err(Error::Format(_))
    ));
    assert!(matches!(
        Runtime::cpu().load(Arc::new(module)),
        Err(RuntimeError::Core(Error::Format(_)))
    ));
    Ok(())
}

/// Apply `mutate` to every kernel of `compiled` whose body satisfies `select`.
fn mutate_kernels(
    compiled: &CompiledModule,
    select: impl Fn(&KernelBody) -> bool,
    mutate: impl Fn(&mut Kernel),
) -> CompiledModule {
    let mut module = compiled.clone();
    let mut touched = 0;
    for kernel in module.kernels.values_mut().filter(|k| select(&k.body)) {
        mutate(kernel);
        touched += 1;
    }
    assert!(touched > 0, "no kernel matched");
    module
}

fn compile_call(
    op: &str,
    params: Vec<Var>,
    attrs: Attrs,
    registry: &OperatorRegistry,
) -> CompiledModule {
    let args = params.iter().map(Var::expr).collect();
    let body = Expr::call_with_attrs(op, args, attrs);
    let module = IrModule::from_function(Function::new(params, body));
    quill_compiler::compile(&module, &Target::host(), 2, registry).expect("module compiles")
}

#[test]
fn test_kernel_with_wrong_output_type_is_rejected() -> anyhow::Result<()> {
    let compiled = compile_add2(&Target::host());
    let corrupt = mutate_kernels(&compiled, |_| true, |kernel| {
        kernel.output = TensorType::new([4, 4], DataType::F32);
    });

    let bytes = corrupt.to_bytes()?;
    assert!(matches!(
        CompiledModule::from_bytes(&bytes),
        Err(Error::Format(_))
    ));

    // a module built in memory is checked again at load time
    match Runtime::cpu().load(Arc::new(corrupt)) {
        Err(RuntimeError::Core(Error::Format(_))) => {}
        Err(other) => panic!("expected a format error, got {other}"),
        Ok(_) => panic!("corrupt module loaded"),
    }
    Ok(())
}

#[test]
fn test_corrupt_elementwise_kernel_is_rejected() -> anyhow::Result<()> {
    let compiled = compile_add2(&Target::host());
    let elementwise = |body: &KernelBody| matches!(body, KernelBody::Elementwise(_));

    assert_rejected(mutate_kernels(&compiled, elementwise, |kernel| {
        kernel.body = KernelBody::Elementwise(ScalarExpr::input(5));
    }))?;
    assert_rejected(mutate_kernels(&compiled, elementwise, |kernel| {
        kernel.inputs[1] = TensorType::new([3], DataType::F32);
    }))?;
    Ok(())
}

#[test]
fn test_corrupt_windowed_mean_kernel_is_rejected() -> anyhow::Result<()> {
    let x = Var::new("x", TensorType::new([10], DataType::F32));
    let w = Var::new("w", TensorType::new([1], DataType::I64));
    let compiled = compile_call("mean_window", vec![x, w], Attrs::new(), &standard_registry());
    let windowed = |body: &KernelBody| matches!(body, KernelBody::WindowedMean);

    assert_rejected(mutate_kernels(&compiled, windowed, |kernel| {
        kernel.output = TensorType::new([10], DataType::I32);
    }))?;
    // a windowed mean without its window input
    assert_rejected(mutate_kernels(&compiled, windowed, |kernel| {
        kernel.inputs.truncate(1);
    }))?;
    Ok(())
}

#[test]
fn test_corrupt_axis_abs_kernel_is_rejected() -> anyhow::Result<()> {
    let x = Var::new("x", TensorType::new([2, 3], DataType::F32));
    let attrs = Attrs::new().with("axis", 1i64).with("index", 2i64);
    let compiled = compile_call("axis_abs", vec![x], attrs, &standard_registry());
    let axis_abs = |body: &KernelBody| matches!(body, KernelBody::AxisAbs { .. });

    assert_rejected(mutate_kernels(&compiled, axis_abs, |kernel| {
        kernel.body = KernelBody::AxisAbs { axis: 1, index: 3 };
    }))?;
    assert_rejected(mutate_kernels(&compiled, axis_abs, |kernel| {
        kernel.body = KernelBody::AxisAbs { axis: 2, index: 0 };
    }))?;

    // the unmodified module still runs
    let mut executor = Runtime::cpu().load(Arc::new(compiled))?;
    let input = Tensor::from_vec(vec![-1.0f32, -2.0, -3.0, -4.0, -5.0, -6.0], &[2, 3]);
    let out = executor.invoke(&[input])?;
    assert_eq!(out[0].to_vec::<f32>()?, vec![-1.0, -2.0, 3.0, -4.0, -5.0, 6.0]);
    Ok(())
}

#[test]
fn test_corrupt_extern_kernel_is_rejected() -> anyhow::Result<()> {
    let mut registry = standard_registry();
    let compiled = extern_module(&mut registry)?;
    let external = |body: &KernelBody| matches!(body, KernelBody::Extern { .. });

    assert_rejected(mutate_kernels(&compiled, external, |kernel| {
        kernel.body = KernelBody::Extern {
            symbol: String::new(),
        };
    }))?;
    assert_rejected(mutate_kernels(&compiled, external, |kernel| {
        kernel.inputs[0] = TensorType::new([3], DataType::F32);
    }))?;
    Ok(())
}

#[test]
fn test_load_function_by_name() -> anyhow::Result<()> {
    let ty = TensorType::new([3], DataType::I64);
    let x = Var::new("x", ty.clone());
    let double = Function::new(vec![x.clone()], Expr::call("add", vec![x.expr(), x.expr()]));
    let y = Var::new("y", ty);
    let negate = Function::new(vec![y.clone()], Expr::call("negative", vec![y.expr()]));

    let mut module = IrModule::new("lib");
    module.add_function("double", double)?;
    module.add_function("negate", negate)?;
    let compiled = Arc::new(quill_compiler::compile(
        &module,
        &Target::host(),
        2,
        &standard_registry(),
    )?);

    let runtime = Runtime::cpu();
    // no "main" and more than one function: there is no entry
    assert!(matches!(
        runtime.load(Arc::clone(&compiled)),
        Err(RuntimeError::UnknownFunction(_))
    ));
    assert!(matches!(
        runtime.load_function(Arc::clone(&compiled), "missing"),
        Err(RuntimeError::UnknownFunction(name)) if name == "missing"
    ));

    let mut executor = runtime.load_function(Arc::clone(&compiled), "negate")?;
    let out = executor.invoke(&[Tensor::from_vec(vec![1i64, -2, 3], &[3])])?;
    assert_eq!(out[0].to_vec::<i64>()?, vec![-1, 2, -3]);

    let mut executor = runtime.load_function(compiled, "double")?;
    assert_eq!(executor.input_names(), vec!["x"]);
    let out = executor.invoke(&[Tensor::from_vec(vec![1i64, -2, 3], &[3])])?;
    assert_eq!(out[0].to_vec::<i64>()?, vec![2, -4, 6]);
    Ok(())
}

#[test]
fn test_parameter_passthrough_output() -> anyhow::Result<()> {
    let ty = TensorType::new([2], DataType::F32);
    let x = Var::new("x", ty);
    let function = Function::with_outputs(
        vec![x.clone()],
        vec![x.expr(), Expr::call("relu", vec![x.expr()])],
    );
    let compiled = quill_compiler::compile(
        &IrModule::from_function(function),
        &Target::host(),
        2,
        &standard_registry(),
    )?;

    let runtime = Runtime::cpu();
    let mut executor = runtime.load(Arc::new(compiled))?;
    let input = Tensor::from_vec(vec![-1.0f32, 2.0], &[2]);
    let outputs = executor.invoke(std::slice::from_ref(&input))?;
    assert_eq!(outputs[0], input);
    assert_eq!(outputs[1].to_vec::<f32>()?, vec![0.0, 2.0]);
    Ok(())
}

fn extern_module(registry: &mut OperatorRegistry) -> anyhow::Result<Arc<CompiledModule>> {
    registry.register(ExternOp::new("host_scale", "scale_by_ten", 1))?;
    let x = Var::new("x", TensorType::new([3], DataType::F64));
    let body = Expr::call("abs", vec![Expr::call("host_scale", vec![x.expr()])]);
    let module = IrModule::from_function(Function::new(vec![x], body));
    Ok(Arc::new(quill_compiler::compile(
        &module,
        &Target::host(),
        2,
        registry,
    )?))
}

#[test]
fn test_extern_function() -> anyhow::Result<()> {
    let mut registry = standard_registry();
    let compiled = extern_module(&mut registry)?;

    let mut runtime = Runtime::cpu();
    assert!(matches!(
        runtime.load(Arc::clone(&compiled)),
        Err(RuntimeError::UnresolvedExtern(symbol)) if symbol == "scale_by_ten"
    ));

    runtime.register_extern(
        "scale_by_ten",
        |args| {
            let values = args[0].to_vec::<f64>().map_err(|e| e.to_string())?;
            let scaled: Vec<f64> = values.iter().map(|v| v * 10.0).collect();
            Ok(Tensor::from_vec(scaled, args[0].shape()))
        },
        false,
    )?;

    let mut executor = runtime.load(compiled)?;
    let outputs = executor.invoke(&[Tensor::from_vec(vec![1.0f64, -2.0, 0.5], &[3])])?;
    assert_eq!(outputs[0].to_vec::<f64>()?, vec![10.0, 20.0, 5.0]);
    Ok(())
}

#[test]
fn test_extern_failure_is_kernel_error() -> anyhow::Result<()> {
    let mut registry = standard_registry();
    let compiled = extern_module(&mut registry)?;

    let mut runtime = Runtime::cpu();
    runtime.register_extern("scale_by_ten", |_| Err("device unavailable".to_string()), false)?;

    let mut executor = runtime.load(compiled)?;
    let err = executor
        .invoke(&[Tensor::from_vec(vec![1.0f64, 2.0, 3.0], &[3])])
        .unwrap_err();
    assert!(matches!(
        &err,
        RuntimeError::Kernel { message, .. } if message == "device unavailable"
    ));
    assert_eq!(executor.state(), ExecutorState::Ready);
    Ok(())
}

#[test]
fn test_custom_target_without_host_is_unsupported() -> anyhow::Result<()> {
    let x = Var::new("x", TensorType::new([2], DataType::F32));
    let body = Expr::call("multiply", vec![x.expr(), x.expr()]);
    let module = IrModule::from_function(Function::new(vec![x], body));
    let compiled = quill_compiler::compile(
        &module,
        &Target::custom("custom"),
        2,
        &standard_registry(),
    )?;

    let runtime = Runtime::cpu();
    assert!(matches!(
        runtime.load(Arc::new(compiled)),
        Err(RuntimeError::UnsupportedTarget(_))
    ));
    Ok(())
}

#[test]
fn test_custom_target_with_host_runs() -> anyhow::Result<()> {
    let x = Var::new("x", TensorType::new([2], DataType::F32));
    let body = Expr::call("multiply", vec![x.expr(), x.expr()]);
    let module = IrModule::from_function(Function::new(vec![x], body));
    let target = Target::custom("custom").with_host(quill_core::TargetKind::Host)?;
    let compiled = quill_compiler::compile(&module, &target, 2, &standard_registry())?;

    let mut executor = Runtime::cpu().load(Arc::new(compiled))?;
    let out = executor.invoke(&[Tensor::from_vec(vec![3.0f32, -4.0], &[2])])?;
    assert_eq!(out[0].to_vec::<f32>()?, vec![9.0, 16.0]);
    Ok(())
}

#[test]
fn test_executors_run_concurrently() -> anyhow::Result<()> {
    let compiled = compile_add2(&Target::host());
    let runtime = Runtime::cpu();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mut executor = runtime.load(Arc::clone(&compiled))?;
            Ok(std::thread::spawn(move || -> quill_runtime::Result<Vec<f32>> {
                let offset = i as f32;
                let lhs = Tensor::from_vec(vec![offset; 4], &[2, 2]);
                let rhs = Tensor::from_vec(vec![1.0f32; 4], &[2, 2]);
                let outputs = executor.invoke(&[lhs, rhs])?;
                Ok(outputs[0].to_vec::<f32>()?)
            }))
        })
        .collect::<anyhow::Result<_>>()?;

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.join().expect("worker thread panicked")?;
        assert_eq!(result, vec![i as f32 + 1.0; 4]);
    }
    Ok(())
}

#[test]
fn test_wrong_input_type_is_rejected() -> anyhow::Result<()> {
    let runtime = Runtime::cpu();
    let mut executor = runtime.load(compile_add2(&Target::host()))?;

    let err = executor
        .set_input("a", Tensor::from_vec(vec![1i32, 2, 3, 4], &[2, 2]))
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::TypeMismatch {
            expected: DataType::F32,
            actual: DataType::I32,
            ..
        }
    ));

    let err = executor
        .set_input("a", Tensor::from_vec(vec![1.0f32, 2.0], &[2]))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ShapeMismatch { .. }));

    assert!(matches!(
        executor.set_input("z", a()),
        Err(RuntimeError::UnknownInput(_))
    ));
    Ok(())
}

#[test]
fn test_add2_rejects_mismatched_types_at_compile_time() {
    let ty = TensorType::new([2, 2], DataType::F32);
    let other = TensorType::new([2], DataType::F32);
    let (x, y) = (Var::new("x", ty), Var::new("y", other));
    let body = Expr::call("add2", vec![x.expr(), y.expr()]);
    let module = IrModule::from_function(Function::new(vec![x, y], body));

    let registry = registry_with_add2();
    let err = quill_compiler::compile(&module, &Target::host(), 2, &registry).unwrap_err();
    match err {
        Error::TypeInference { node, message } => {
            assert_eq!(node, "add2(%x, %y)");
            assert!(message.contains("Tensor[(2, 2), f32]"));
            assert!(message.contains("Tensor[(2,), f32]"));
        }
        other => panic!("expected a type inference error, got {other}"),
    }

    // the unmodified module still compiles
    assert!(quill_compiler::compile(&add2_module(), &Target::host(), 2, &registry).is_ok());
}
