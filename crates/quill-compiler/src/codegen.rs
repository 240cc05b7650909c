//! C source emission for kernels.
//!
//! Each kernel becomes one `void` function taking its inputs as `const`
//! pointers followed by the output pointer. Shapes are static, so loop
//! bounds and broadcast strides are baked in as constants.

use quill_core::{
    BinaryOp, DataType, Kernel, KernelBody, ScalarExpr, TensorType, UnaryOp, broadcast_strides,
};
use std::fmt::Write;

fn c_type(dtype: DataType) -> &'static str {
    match dtype {
        DataType::F32 => "float",
        DataType::F64 => "double",
        DataType::I32 => "int32_t",
        DataType::I64 => "int64_t",
    }
}

/// Emit a self-contained C translation unit for `kernel`.
pub fn emit_c(kernel: &Kernel) -> String {
    let mut src = String::new();
    src.push_str("#include <math.h>\n#include <stdint.h>\n\n");

    if let KernelBody::Extern { symbol } = &kernel.body {
        let _ = writeln!(src, "extern void {symbol}({});\n", signature(kernel));
    }

    let _ = writeln!(src, "void {}({}) {{", kernel.name, signature(kernel));
    match &kernel.body {
        KernelBody::Elementwise(expr) => emit_elementwise(&mut src, kernel, expr),
        KernelBody::WindowedMean => emit_windowed_mean(&mut src, kernel),
        KernelBody::AxisAbs { axis, index } => emit_axis_abs(&mut src, kernel, *axis, *index),
        KernelBody::Extern { symbol } => {
            let args: Vec<String> = (0..kernel.inputs.len())
                .map(|i| format!("in{i}"))
                .chain(std::iter::once("out".to_string()))
                .collect();
            let _ = writeln!(src, "  {symbol}({});", args.join(", "));
        }
    }
    src.push_str("}\n");
    src
}

fn signature(kernel: &Kernel) -> String {
    let mut params: Vec<String> = kernel
        .inputs
        .iter()
        .enumerate()
        .map(|(i, ty)| format!("const {}* in{i}", c_type(ty.dtype)))
        .collect();
    params.push(format!("{}* out", c_type(kernel.output.dtype)));
    params.join(", ")
}

fn emit_elementwise(src: &mut String, kernel: &Kernel, expr: &ScalarExpr) {
    let out = &kernel.output;
    let _ = writeln!(src, "  for (int64_t i = 0; i < {}; ++i) {{", out.numel());
    for (k, input) in kernel.inputs.iter().enumerate() {
        if input.shape == out.shape {
            continue;
        }
        let strides = broadcast_strides(&input.shape, &out.shape);
        let _ = writeln!(src, "    int64_t rem{k} = i, off{k} = 0;");
        for d in (0..out.shape.len()).rev() {
            let dim = out.shape[d];
            if strides[d] == 0 {
                let _ = writeln!(src, "    rem{k} /= {dim};");
            } else {
                let _ = writeln!(
                    src,
                    "    off{k} += (rem{k} % {dim}) * {}; rem{k} /= {dim};",
                    strides[d]
                );
            }
        }
    }
    let _ = writeln!(src, "    out[i] = {};", scalar(expr, kernel, out));
    src.push_str("  }\n");
}

fn scalar(expr: &ScalarExpr, kernel: &Kernel, out: &TensorType) -> String {
    let float = out.dtype.is_float();
    let f32_suffix = if out.dtype == DataType::F32 { "f" } else { "" };
    match expr {
        ScalarExpr::Input(k) => match kernel.inputs.get(*k) {
            Some(input) if input.shape != out.shape => format!("in{k}[off{k}]"),
            _ => format!("in{k}[i]"),
        },
        ScalarExpr::Unary(op, x) => {
            let x = scalar(x, kernel, out);
            match op {
                UnaryOp::Neg => format!("(-{x})"),
                UnaryOp::Abs if float => format!("fabs{f32_suffix}({x})"),
                UnaryOp::Abs => format!("({x} < 0 ? -{x} : {x})"),
                UnaryOp::Relu => format!("({x} > 0 ? {x} : 0)"),
                UnaryOp::Exp => format!("exp{f32_suffix}({x})"),
                UnaryOp::Sqrt => format!("sqrt{f32_suffix}({x})"),
            }
        }
        ScalarExpr::Binary(op, lhs, rhs) => {
            let a = scalar(lhs, kernel, out);
            let b = scalar(rhs, kernel, out);
            match op {
                BinaryOp::Add => format!("({a} + {b})"),
                BinaryOp::Sub => format!("({a} - {b})"),
                BinaryOp::Mul => format!("({a} * {b})"),
                BinaryOp::Div if float => format!("({a} / {b})"),
                BinaryOp::Div => format!("({b} == 0 ? 0 : {a} / {b})"),
                BinaryOp::Max => format!("({a} > {b} ? {a} : {b})"),
                BinaryOp::Min => format!("({a} < {b} ? {a} : {b})"),
            }
        }
    }
}

fn emit_windowed_mean(src: &mut String, kernel: &Kernel) {
    let out = &kernel.output;
    let len = out.shape.last().copied().unwrap_or(1);
    let rows = if len == 0 { 0 } else { out.numel() / len };
    let t = c_type(out.dtype);
    let _ = writeln!(src, "  const int64_t rows = {rows}, len = {len};");
    src.push_str("  const int64_t window = (int64_t)in1[0];\n");
    src.push_str("  for (int64_t r = 0; r < rows; ++r) {\n");
    src.push_str("    double acc = 0.0;\n");
    src.push_str("    for (int64_t i = 0; i < len; ++i) {\n");
    src.push_str("      acc += in0[r * len + i];\n");
    src.push_str("      if (i >= window) acc -= in0[r * len + i - window];\n");
    src.push_str("      const int64_t count = i + 1 < window ? i + 1 : window;\n");
    let _ = writeln!(src, "      out[r * len + i] = ({t})(acc / (double)count);");
    src.push_str("    }\n  }\n");
}

fn emit_axis_abs(src: &mut String, kernel: &Kernel, axis: usize, index: usize) {
    let shape = &kernel.output.shape;
    let outer: usize = shape[..axis.min(shape.len())].iter().product();
    let dim = shape.get(axis).copied().unwrap_or(1);
    let inner: usize = shape.get(axis + 1..).map_or(1, |s| s.iter().product());
    let float = kernel.output.dtype.is_float();

    let numel = kernel.output.numel();
    let _ = writeln!(src, "  for (int64_t i = 0; i < {numel}; ++i) out[i] = in0[i];");
    let _ = writeln!(src, "  for (int64_t o = 0; o < {outer}; ++o) {{");
    let _ = writeln!(src, "    for (int64_t k = 0; k < {inner}; ++k) {{");
    let _ = writeln!(src, "      const int64_t p = (o * {dim} + {index}) * {inner} + k;");
    if float {
        src.push_str("      out[p] = out[p] < 0 ? -out[p] : out[p];\n");
    } else {
        src.push_str("      if (out[p] < 0) out[p] = -out[p];\n");
    }
    src.push_str("    }\n  }\n");
}
