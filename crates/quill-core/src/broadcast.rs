//! NumPy-style broadcasting helpers shared by inference and execution.

/// Compute NumPy-style broadcast output shape from two input shapes.
///
/// Implements NumPy broadcasting rules:
/// - Shapes are aligned from the rightmost dimension
/// - Dimensions match if they are equal or one of them is 1
/// - Missing dimensions in shorter shapes are treated as 1
///
/// Returns `None` when the shapes are incompatible.
///
/// # Example
///
/// ```text
/// broadcast_shape(&[2, 3, 4], &[3, 4])    -> [2, 3, 4]
/// broadcast_shape(&[2, 3, 4], &[2, 1, 4]) -> [2, 3, 4]
/// broadcast_shape(&[8, 1, 6, 1], &[7, 1, 5]) -> [8, 7, 6, 5]
/// ```
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let max_rank = a.len().max(b.len());
    let mut result = Vec::with_capacity(max_rank);

    for i in 0..max_rank {
        let da = dim_or_one(a, max_rank, i);
        let db = dim_or_one(b, max_rank, i);

        if da == db || db == 1 {
            result.push(da);
        } else if da == 1 {
            result.push(db);
        } else {
            return None;
        }
    }

    Some(result)
}

fn dim_or_one(shape: &[usize], max_rank: usize, i: usize) -> usize {
    let offset = max_rank - shape.len();
    if i < offset { 1 } else { shape[i - offset] }
}

/// Per-output-dimension element strides for reading `input` broadcast to `output`.
///
/// The returned vector has one entry per output dimension. Broadcast
/// dimensions get stride 0, so the flat input offset for an output
/// coordinate `c` is `sum(c[d] * strides[d])`.
pub fn broadcast_strides(input: &[usize], output: &[usize]) -> Vec<usize> {
    let offset = output.len() - input.len().min(output.len());
    let mut strides = vec![0; output.len()];
    let mut stride = 1;
    for d in (offset..output.len()).rev() {
        let dim = input[d - offset];
        strides[d] = if dim == 1 && output[d] != 1 { 0 } else { stride };
        stride *= dim;
    }
    strides
}

/// Flat input offset of output element `index` under the given strides.
pub fn broadcast_offset(index: usize, output: &[usize], strides: &[usize]) -> usize {
    let mut rem = index;
    let mut offset = 0;
    for d in (0..output.len()).rev() {
        let dim = output[d];
        if dim == 0 {
            return 0;
        }
        offset += (rem % dim) * strides[d];
        rem /= dim;
    }
    offset
}
