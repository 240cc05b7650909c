//! Kernel interpreter for the CPU device.

use crate::error::{Result, RuntimeError};
use crate::runtime::ExternFn;
use quill_core::{
    BinaryOp, DataType, Element, Kernel, KernelBody, ScalarExpr, Tensor, TensorType, UnaryOp,
    broadcast_offset, broadcast_strides,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Scalar arithmetic for each element type. Integer arithmetic wraps.
trait Arith: Element + Copy {
    fn binary(op: BinaryOp, a: Self, b: Self) -> Self;
    fn unary(op: UnaryOp, x: Self) -> Self;
}

macro_rules! impl_arith_float {
    ($ty:ty) => {
        impl Arith for $ty {
            fn binary(op: BinaryOp, a: Self, b: Self) -> Self {
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Max => a.max(b),
                    BinaryOp::Min => a.min(b),
                }
            }

            fn unary(op: UnaryOp, x: Self) -> Self {
                match op {
                    UnaryOp::Neg => -x,
                    UnaryOp::Abs => x.abs(),
                    UnaryOp::Relu => x.max(0.0),
                    UnaryOp::Exp => x.exp(),
                    UnaryOp::Sqrt => x.sqrt(),
                }
            }
        }
    };
}

macro_rules! impl_arith_int {
    ($ty:ty) => {
        impl Arith for $ty {
            fn binary(op: BinaryOp, a: Self, b: Self) -> Self {
                match op {
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Sub => a.wrapping_sub(b),
                    BinaryOp::Mul => a.wrapping_mul(b),
                    BinaryOp::Div => {
                        if b == 0 {
                            0
                        } else {
                            a.wrapping_div(b)
                        }
                    }
                    BinaryOp::Max => a.max(b),
                    BinaryOp::Min => a.min(b),
                }
            }

            fn unary(op: UnaryOp, x: Self) -> Self {
                match op {
                    UnaryOp::Neg => x.wrapping_neg(),
                    UnaryOp::Abs => x.wrapping_abs(),
                    UnaryOp::Relu => x.max(0),
                    UnaryOp::Exp => Self::from_f64(x.to_f64().exp()),
                    UnaryOp::Sqrt => Self::from_f64(x.to_f64().sqrt()),
                }
            }
        }
    };
}

impl_arith_float!(f32);
impl_arith_float!(f64);
impl_arith_int!(i32);
impl_arith_int!(i64);

/// Execute one kernel on host tensors.
pub(crate) fn execute(
    kernel: &Kernel,
    inputs: &[&Tensor],
    externs: &HashMap<String, Arc<ExternFn>>,
) -> Result<Tensor> {
    kernel
        .validate()
        .map_err(|e| kernel_error(kernel, e.to_string()))?;
    check_inputs(kernel, inputs)?;

    match &kernel.body {
        KernelBody::Elementwise(expr) => match kernel.output.dtype {
            DataType::F32 => elementwise::<f32>(kernel, expr, inputs),
            DataType::F64 => elementwise::<f64>(kernel, expr, inputs),
            DataType::I32 => elementwise::<i32>(kernel, expr, inputs),
            DataType::I64 => elementwise::<i64>(kernel, expr, inputs),
        },
        KernelBody::WindowedMean => match kernel.output.dtype {
            DataType::F32 => windowed_mean::<f32>(kernel, inputs),
            DataType::F64 => windowed_mean::<f64>(kernel, inputs),
            dtype => Err(kernel_error(
                kernel,
                format!("windowed mean needs floating-point data, got {dtype}"),
            )),
        },
        KernelBody::AxisAbs { axis, index } => match kernel.output.dtype {
            DataType::F32 => axis_abs::<f32>(kernel, inputs, *axis, *index),
            DataType::F64 => axis_abs::<f64>(kernel, inputs, *axis, *index),
            DataType::I32 => axis_abs::<i32>(kernel, inputs, *axis, *index),
            DataType::I64 => axis_abs::<i64>(kernel, inputs, *axis, *index),
        },
        KernelBody::Extern { symbol } => {
            let function = externs
                .get(symbol)
                .ok_or_else(|| RuntimeError::UnresolvedExtern(symbol.clone()))?;
            let args: Vec<Tensor> = inputs.iter().map(|&t| t.clone()).collect();
            let output = function(&args).map_err(|message| kernel_error(kernel, message))?;
            if output.tensor_type() != kernel.output {
                return Err(kernel_error(
                    kernel,
                    format!(
                        "extern '{symbol}' returned {}, expected {}",
                        output.tensor_type(),
                        kernel.output
                    ),
                ));
            }
            Ok(output)
        }
    }
}

fn kernel_error(kernel: &Kernel, message: impl Into<String>) -> RuntimeError {
    RuntimeError::Kernel {
        kernel: kernel.name.clone(),
        message: message.into(),
    }
}

fn check_inputs(kernel: &Kernel, inputs: &[&Tensor]) -> Result<()> {
    if inputs.len() != kernel.inputs.len() {
        return Err(kernel_error(
            kernel,
            format!(
                "expected {} input(s), got {}",
                kernel.inputs.len(),
                inputs.len()
            ),
        ));
    }
    for (index, (tensor, expected)) in inputs.iter().zip(&kernel.inputs).enumerate() {
        let actual = tensor.tensor_type();
        if &actual != expected {
            return Err(kernel_error(
                kernel,
                format!("input {index} is {actual}, expected {expected}"),
            ));
        }
    }
    Ok(())
}

fn typed<'a, T: Element>(kernel: &Kernel, tensor: &'a Tensor) -> Result<&'a [T]> {
    tensor
        .as_slice::<T>()
        .map_err(|e| kernel_error(kernel, e.to_string()))
}

fn finish<T: Element>(kernel: &Kernel, values: Vec<T>, ty: &TensorType) -> Result<Tensor> {
    Tensor::try_from_vec(values, &ty.shape).map_err(|e| kernel_error(kernel, e.to_string()))
}

/// Evaluate `expr` for one element. `None` if it reads a missing input.
fn eval<T: Arith>(expr: &ScalarExpr, values: &[T]) -> Option<T> {
    Some(match expr {
        ScalarExpr::Input(i) => *values.get(*i)?,
        ScalarExpr::Unary(op, x) => T::unary(*op, eval(x, values)?),
        ScalarExpr::Binary(op, a, b) => T::binary(*op, eval(a, values)?, eval(b, values)?),
    })
}

fn elementwise<T: Arith>(
    kernel: &Kernel,
    expr: &ScalarExpr,
    inputs: &[&Tensor],
) -> Result<Tensor> {
    let out_shape = &kernel.output.shape;
    let data: Vec<&[T]> = inputs
        .iter()
        .map(|t| typed::<T>(kernel, t))
        .collect::<Result<_>>()?;
    // `None` marks an input that already has the output shape.
    let strides: Vec<Option<Vec<usize>>> = inputs
        .iter()
        .map(|t| {
            (t.shape() != out_shape.as_slice()).then(|| broadcast_strides(t.shape(), out_shape))
        })
        .collect();

    let numel = kernel.output.numel();
    let mut values = Vec::with_capacity(inputs.len());
    let mut out = Vec::with_capacity(numel);
    for i in 0..numel {
        values.clear();
        for (input, stride) in data.iter().zip(&strides) {
            let offset = match stride {
                Some(stride) => broadcast_offset(i, out_shape, stride),
                None => i,
            };
            let value = input.get(offset).copied().ok_or_else(|| {
                kernel_error(kernel, format!("element {i} reads past an input of {}", input.len()))
            })?;
            values.push(value);
        }
        let value = eval(expr, &values)
            .ok_or_else(|| kernel_error(kernel, "expression reads a missing input"))?;
        out.push(value);
    }
    finish(kernel, out, &kernel.output)
}

/// Trailing mean along the last axis. Positions before a full window average
/// over the available prefix.
fn windowed_mean<T: Element>(kernel: &Kernel, inputs: &[&Tensor]) -> Result<Tensor> {
    let &[data, window] = inputs else {
        return Err(kernel_error(kernel, "windowed mean takes data and window inputs"));
    };
    let x = typed::<T>(kernel, data)?;
    let window = window
        .to_f64_vec()
        .first()
        .copied()
        .ok_or_else(|| kernel_error(kernel, "window tensor is empty"))?;
    if !window.is_finite() || window.fract() != 0.0 || window < 1.0 {
        return Err(kernel_error(
            kernel,
            format!("window must be a whole number of at least 1, got {window}"),
        ));
    }
    let window = window as usize;

    let len = kernel.output.shape.last().copied().unwrap_or(1);
    let mut out = Vec::with_capacity(x.len());
    let mut prefix = vec![0.0f64; len + 1];
    for row in x.chunks(len.max(1)) {
        for (i, &v) in row.iter().enumerate() {
            prefix[i + 1] = prefix[i] + v.to_f64();
        }
        for i in 0..row.len() {
            let start = (i + 1).saturating_sub(window);
            let count = (i + 1 - start) as f64;
            out.push(T::from_f64((prefix[i + 1] - prefix[start]) / count));
        }
    }
    finish(kernel, out, &kernel.output)
}

fn axis_abs<T: Arith>(
    kernel: &Kernel,
    inputs: &[&Tensor],
    axis: usize,
    index: usize,
) -> Result<Tensor> {
    let &[data] = inputs else {
        return Err(kernel_error(kernel, "axis abs takes one input"));
    };
    let shape = &kernel.output.shape;
    if axis >= shape.len() || index >= shape[axis] {
        return Err(kernel_error(
            kernel,
            format!("slice {index} of axis {axis} is out of range for shape {shape:?}"),
        ));
    }
    let outer: usize = shape[..axis].iter().product();
    let dim = shape[axis];
    let inner: usize = shape[axis + 1..].iter().product();

    let mut out = typed::<T>(kernel, data)?.to_vec();
    for o in 0..outer {
        let base = (o * dim + index) * inner;
        let slice = out
            .get_mut(base..base + inner)
            .ok_or_else(|| kernel_error(kernel, format!("slice at {base} is past the data")))?;
        for v in slice {
            *v = T::unary(UnaryOp::Abs, *v);
        }
    }
    finish(kernel, out, &kernel.output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel(body: KernelBody, inputs: Vec<TensorType>, output: TensorType) -> Kernel {
        Kernel {
            name: "test_kernel".to_string(),
            body,
            inputs,
            output,
            ops: vec![],
            source: None,
        }
    }

    fn run(kernel: &Kernel, inputs: &[&Tensor]) -> Result<Tensor> {
        execute(kernel, inputs, &HashMap::new())
    }

    #[test]
    fn test_broadcast_add() {
        let out = TensorType::new([2, 3], DataType::F32);
        let row = TensorType::new([3], DataType::F32);
        let k = kernel(
            KernelBody::Elementwise(ScalarExpr::binary(
                BinaryOp::Add,
                ScalarExpr::input(0),
                ScalarExpr::input(1),
            )),
            vec![out.clone(), row],
            out,
        );
        let a = Tensor::from_vec(vec![0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0], &[2, 3]);
        let b = Tensor::from_vec(vec![10.0f32, 20.0, 30.0], &[3]);
        let result = run(&k, &[&a, &b]).unwrap();
        assert_eq!(
            result.to_vec::<f32>().unwrap(),
            vec![10.0, 21.0, 32.0, 13.0, 24.0, 35.0]
        );
    }

    #[test]
    fn test_integer_division_by_zero_is_zero() {
        let ty = TensorType::new([3], DataType::I32);
        let k = kernel(
            KernelBody::Elementwise(ScalarExpr::binary(
                BinaryOp::Div,
                ScalarExpr::input(0),
                ScalarExpr::input(1),
            )),
            vec![ty.clone(), ty.clone()],
            ty,
        );
        let a = Tensor::from_vec(vec![7i32, i32::MIN, 9], &[3]);
        let b = Tensor::from_vec(vec![2i32, -1, 0], &[3]);
        let result = run(&k, &[&a, &b]).unwrap();
        assert_eq!(result.to_vec::<i32>().unwrap(), vec![3, i32::MIN, 0]);
    }

    #[test]
    fn test_fused_expression() {
        let ty = TensorType::new([2], DataType::F64);
        let expr = ScalarExpr::unary(
            UnaryOp::Relu,
            ScalarExpr::binary(
                BinaryOp::Sub,
                ScalarExpr::input(0),
                ScalarExpr::unary(UnaryOp::Neg, ScalarExpr::input(1)),
            ),
        );
        let k = kernel(KernelBody::Elementwise(expr), vec![ty.clone(), ty.clone()], ty);
        let a = Tensor::from_vec(vec![1.0f64, -5.0], &[2]);
        let b = Tensor::from_vec(vec![2.0f64, 1.0], &[2]);
        assert_eq!(run(&k, &[&a, &b]).unwrap().to_vec::<f64>().unwrap(), vec![3.0, 0.0]);
    }

    #[test]
    fn test_windowed_mean_rows() {
        let x_ty = TensorType::new([2, 4], DataType::F64);
        let w_ty = TensorType::new([1], DataType::I32);
        let k = kernel(KernelBody::WindowedMean, vec![x_ty.clone(), w_ty], x_ty);
        let x = Tensor::from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0], &[2, 4]);
        let w = Tensor::from_vec(vec![2i32], &[1]);
        let result = run(&k, &[&x, &w]).unwrap();
        assert_eq!(
            result.to_vec::<f64>().unwrap(),
            vec![1.0, 1.5, 2.5, 3.5, 10.0, 15.0, 25.0, 35.0]
        );
    }

    #[test]
    fn test_windowed_mean_rejects_bad_window() {
        let x_ty = TensorType::new([3], DataType::F32);
        let w_ty = TensorType::new([1], DataType::F32);
        let k = kernel(KernelBody::WindowedMean, vec![x_ty.clone(), w_ty], x_ty);
        let x = Tensor::from_vec(vec![1.0f32, 2.0, 3.0], &[3]);

        for bad in [0.0f32, -2.0, 1.5] {
            let w = Tensor::from_vec(vec![bad], &[1]);
            let err = run(&k, &[&x, &w]).unwrap_err();
            assert!(matches!(err, RuntimeError::Kernel { .. }), "window {bad}");
        }
    }

    #[test]
    fn test_axis_abs_middle_axis() {
        let ty = TensorType::new([2, 2, 2], DataType::I64);
        let k = kernel(KernelBody::AxisAbs { axis: 1, index: 1 }, vec![ty.clone()], ty);
        let x = Tensor::from_vec(vec![-1i64, -2, -3, -4, -5, -6, -7, -8], &[2, 2, 2]);
        let result = run(&k, &[&x]).unwrap();
        assert_eq!(result.to_vec::<i64>().unwrap(), vec![-1, -2, 3, 4, -5, -6, 7, 8]);
    }

    #[test]
    fn test_inconsistent_kernels_are_errors() {
        let ty = TensorType::new([2], DataType::F32);
        let x = Tensor::from_vec(vec![1.0f32, -2.0], &[2]);

        let reads_missing = kernel(
            KernelBody::Elementwise(ScalarExpr::binary(
                BinaryOp::Add,
                ScalarExpr::input(0),
                ScalarExpr::input(3),
            )),
            vec![ty.clone()],
            ty.clone(),
        );
        let outside = kernel(
            KernelBody::AxisAbs { axis: 0, index: 2 },
            vec![ty.clone()],
            ty.clone(),
        );
        let no_window = kernel(KernelBody::WindowedMean, vec![ty.clone()], ty.clone());
        let too_large = kernel(
            KernelBody::Elementwise(ScalarExpr::input(0)),
            vec![ty],
            TensorType::new([4, 4], DataType::F32),
        );

        for k in [reads_missing, outside, no_window, too_large] {
            assert!(matches!(run(&k, &[&x]), Err(RuntimeError::Kernel { .. })), "{:?}", k.body);
        }
    }

    #[test]
    fn test_input_type_checked() {
        let ty = TensorType::new([2], DataType::F32);
        let k = kernel(
            KernelBody::Elementwise(ScalarExpr::unary(UnaryOp::Neg, ScalarExpr::input(0))),
            vec![ty.clone()],
            ty,
        );
        let wrong = Tensor::from_vec(vec![1i32, 2], &[2]);
        assert!(matches!(run(&k, &[&wrong]), Err(RuntimeError::Kernel { .. })));
    }

    #[test]
    fn test_extern_output_checked() {
        let ty = TensorType::new([2], DataType::F32);
        let k = kernel(
            KernelBody::Extern {
                symbol: "shrink".to_string(),
            },
            vec![ty.clone()],
            ty,
        );
        let mut externs: HashMap<String, Arc<ExternFn>> = HashMap::new();
        externs.insert(
            "shrink".to_string(),
            Arc::new(|_args: &[Tensor]| Ok::<_, String>(Tensor::from_vec(vec![1.0f32], &[1]))),
        );
        let x = Tensor::from_vec(vec![1.0f32, 2.0], &[2]);
        let err = execute(&k, &[&x], &externs).unwrap_err();
        assert!(err.to_string().contains("returned"));
    }
}
