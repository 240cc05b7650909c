//! Core types for tensor element types, static tensor types, and tensor values.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element data type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    F32,
    F64,
    I32,
    I64,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DataType::F32 | DataType::I32 => 4,
            DataType::F64 | DataType::I64 => 8,
        }
    }

    /// Whether this is a floating-point type.
    pub fn is_float(self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }

    /// Short lowercase name (`"f32"`, `"i64"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fully static tensor type: shape plus element type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorType {
    pub shape: Vec<usize>,
    pub dtype: DataType,
}

impl TensorType {
    pub fn new(shape: impl Into<Vec<usize>>, dtype: DataType) -> Self {
        Self {
            shape: shape.into(),
            dtype,
        }
    }

    /// Rank-0 type holding one element.
    pub fn scalar(dtype: DataType) -> Self {
        Self {
            shape: Vec::new(),
            dtype,
        }
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor[(")?;
        for (i, dim) in self.shape.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        if self.shape.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, "), {}]", self.dtype)
    }
}

/// Typed element storage for a tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl TensorData {
    /// Get the number of elements in this tensor data.
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the data type of this storage.
    pub fn dtype(&self) -> DataType {
        match self {
            TensorData::F32(_) => DataType::F32,
            TensorData::F64(_) => DataType::F64,
            TensorData::I32(_) => DataType::I32,
            TensorData::I64(_) => DataType::I64,
        }
    }

    /// Zero-filled storage of the given type.
    pub fn zeros(dtype: DataType, len: usize) -> Self {
        match dtype {
            DataType::F32 => TensorData::F32(vec![0.0; len]),
            DataType::F64 => TensorData::F64(vec![0.0; len]),
            DataType::I32 => TensorData::I32(vec![0; len]),
            DataType::I64 => TensorData::I64(vec![0; len]),
        }
    }

    /// Raw little-endian bytes of the elements.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TensorData::F32(v) => bytemuck::cast_slice(v),
            TensorData::F64(v) => bytemuck::cast_slice(v),
            TensorData::I32(v) => bytemuck::cast_slice(v),
            TensorData::I64(v) => bytemuck::cast_slice(v),
        }
    }

    /// Decode storage from raw bytes.
    ///
    /// The byte buffer does not need to be aligned for the element type.
    pub fn from_bytes(dtype: DataType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % dtype.size() != 0 {
            return Err(Error::Tensor(format!(
                "{} bytes is not a whole number of {dtype} elements",
                bytes.len()
            )));
        }
        Ok(match dtype {
            DataType::F32 => TensorData::F32(bytemuck::pod_collect_to_vec(bytes)),
            DataType::F64 => TensorData::F64(bytemuck::pod_collect_to_vec(bytes)),
            DataType::I32 => TensorData::I32(bytemuck::pod_collect_to_vec(bytes)),
            DataType::I64 => TensorData::I64(bytemuck::pod_collect_to_vec(bytes)),
        })
    }
}

/// Rust scalar types that can back a [`Tensor`].
pub trait Element: bytemuck::Pod + PartialOrd + fmt::Debug + Send + Sync + 'static {
    const DTYPE: DataType;

    fn slice(data: &TensorData) -> Option<&[Self]>;
    fn wrap(values: Vec<Self>) -> TensorData;
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DataType = DataType::$variant;

            fn slice(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                value as $ty
            }
        }
    };
}

impl_element!(f32, F32);
impl_element!(f64, F64);
impl_element!(i32, I32);
impl_element!(i64, I64);

/// A host tensor: typed element buffer plus static shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TensorPayload", try_from = "TensorPayload")]
pub struct Tensor {
    data: TensorData,
    shape: Vec<usize>,
}

impl Tensor {
    /// Create a tensor from a vector with a given shape.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` does not match the number of elements in `shape`.
    /// Use [`Tensor::try_from_vec`] for a fallible version.
    ///
    /// # Example
    /// ```
    /// # use quill_core::Tensor;
    /// let tensor = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], &[2, 2]);
    /// assert_eq!(tensor.shape(), &[2, 2]);
    /// ```
    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> Self {
        let expected_len: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_len,
            "Data length {} doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_len
        );
        Self {
            data: T::wrap(data),
            shape: shape.to_vec(),
        }
    }

    /// Create a tensor from a vector, checking the element count.
    pub fn try_from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        Self::from_data(T::wrap(data), shape)
    }

    /// Create a tensor from existing storage, checking the element count.
    pub fn from_data(data: TensorData, shape: &[usize]) -> Result<Self> {
        let expected_len: usize = shape.iter().product();
        if data.len() != expected_len {
            return Err(Error::Tensor(format!(
                "data length {} doesn't match shape {:?} (expected {})",
                data.len(),
                shape,
                expected_len
            )));
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
        })
    }

    /// Rank-0 tensor holding one value.
    pub fn scalar<T: Element>(value: T) -> Self {
        Self::from_vec(vec![value], &[])
    }

    /// Tensor of the given shape with every element set to `value`.
    pub fn full<T: Element>(shape: &[usize], value: T) -> Self {
        let len = shape.iter().product();
        Self::from_vec(vec![value; len], shape)
    }

    /// Zero-filled tensor of the given type.
    pub fn zeros(ty: &TensorType) -> Self {
        Self {
            data: TensorData::zeros(ty.dtype, ty.numel()),
            shape: ty.shape.clone(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    /// The static type of this tensor.
    pub fn tensor_type(&self) -> TensorType {
        TensorType::new(self.shape.clone(), self.dtype())
    }

    /// Get the total number of elements in the tensor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Get a typed slice view of the tensor data.
    ///
    /// # Errors
    /// Returns an error if `T` doesn't match the tensor's data type.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        T::slice(&self.data).ok_or_else(|| {
            Error::Tensor(format!(
                "tensor holds {} elements, requested {}",
                self.dtype(),
                T::DTYPE
            ))
        })
    }

    /// Convert tensor to a Vec.
    ///
    /// # Errors
    /// Returns an error if `T` doesn't match the tensor's data type.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        Ok(self.as_slice::<T>()?.to_vec())
    }

    /// Read every element as `f64`, whatever the element type.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.data {
            TensorData::F32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::F64(v) => v.clone(),
            TensorData::I32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::I64(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }
}

/// Byte-level form of a tensor used by the artifact format.
#[derive(Serialize, Deserialize)]
struct TensorPayload {
    dtype: DataType,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

impl From<Tensor> for TensorPayload {
    fn from(tensor: Tensor) -> Self {
        Self {
            dtype: tensor.dtype(),
            bytes: tensor.data.as_bytes().to_vec(),
            shape: tensor.shape,
        }
    }
}

impl TryFrom<TensorPayload> for Tensor {
    type Error = Error;

    fn try_from(payload: TensorPayload) -> Result<Self> {
        let numel: usize = payload.shape.iter().product();
        let expected = numel * payload.dtype.size();
        if payload.bytes.len() != expected {
            return Err(Error::Format(format!(
                "tensor payload of shape {:?} ({}) has {} bytes, expected {expected}",
                payload.shape,
                payload.dtype,
                payload.bytes.len()
            )));
        }
        let data = TensorData::from_bytes(payload.dtype, &payload.bytes)?;
        Tensor::from_data(data, &payload.shape)
    }
}
