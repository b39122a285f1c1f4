// rust/datasets-core/src/tensor.rs

//! Host-side array values, dtypes and shape checks.
//!
//! `Array` is the plain numeric-array form records are converted into when
//! they leave the library through `numpy_iterator`, and the value type the
//! graph runner feeds through compiled sessions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};

/// Element type of an [`Array`] or a declared feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
    F64,
    I64,
    U8,
    Bool,
    String,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::Bool => "bool",
            DType::String => "string",
        };
        f.write_str(s)
    }
}

/// Concrete N-dimensional shape. A scalar has rank 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements. A scalar has one element.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product()
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_dims(f, self.0.iter().map(|d| d.to_string()))
    }
}

fn write_dims(f: &mut fmt::Formatter<'_>, dims: impl Iterator<Item = String>) -> fmt::Result {
    let dims: Vec<String> = dims.collect();
    if dims.len() == 1 {
        write!(f, "({},)", dims[0])
    } else {
        write!(f, "({})", dims.join(", "))
    }
}

/// Formats a shape pattern, printing wildcard dimensions as `None`.
pub fn format_pattern(pattern: &[Option<usize>]) -> String {
    struct Pattern<'a>(&'a [Option<usize>]);

    impl fmt::Display for Pattern<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write_dims(
                f,
                self.0.iter().map(|d| match d {
                    Some(d) => d.to_string(),
                    None => "None".to_string(),
                }),
            )
        }
    }

    Pattern(pattern).to_string()
}

/// Ensures `actual` matches `pattern`, where `None` matches any size.
///
/// ```
/// use datasets_core::tensor::assert_shape_match;
///
/// assert!(assert_shape_match(&[64, 64, 3], &[None, None, Some(3)]).is_ok());
/// assert!(assert_shape_match(&[64, 64, 3], &[Some(64), Some(64), Some(4)]).is_err());
/// ```
///
/// # Errors
///
/// `RankMismatch` when the ranks differ, `ShapeMismatch` naming both shapes
/// when a fixed dimension differs.
pub fn assert_shape_match(actual: &[usize], pattern: &[Option<usize>]) -> Result<()> {
    if actual.len() != pattern.len() {
        return Err(DatasetError::RankMismatch {
            actual: actual.len(),
            expected: pattern.len(),
        });
    }

    let matches = actual
        .iter()
        .zip(pattern)
        .all(|(a, p)| p.map_or(true, |p| p == *a));

    if !matches {
        return Err(DatasetError::ShapeMismatch {
            actual: Shape::from(actual).to_string(),
            expected: format_pattern(pattern),
        });
    }
    Ok(())
}

/// Flat element storage of an [`Array`], row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    Bool(Vec<bool>),
    String(Vec<String>),
}

impl ArrayData {
    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::F32(_) => DType::F32,
            ArrayData::F64(_) => DType::F64,
            ArrayData::I64(_) => DType::I64,
            ArrayData::U8(_) => DType::U8,
            ArrayData::Bool(_) => DType::Bool,
            ArrayData::String(_) => DType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::F32(v) => v.len(),
            ArrayData::F64(v) => v.len(),
            ArrayData::I64(v) => v.len(),
            ArrayData::U8(v) => v.len(),
            ArrayData::Bool(v) => v.len(),
            ArrayData::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-filled storage of the given dtype and length.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F32 => ArrayData::F32(vec![0.0; len]),
            DType::F64 => ArrayData::F64(vec![0.0; len]),
            DType::I64 => ArrayData::I64(vec![0; len]),
            DType::U8 => ArrayData::U8(vec![0; len]),
            DType::Bool => ArrayData::Bool(vec![false; len]),
            DType::String => ArrayData::String(vec![String::new(); len]),
        }
    }
}

/// A dense host array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawArray")]
pub struct Array {
    shape: Shape,
    data: ArrayData,
}

/// Wire form of [`Array`], validated on the way in.
#[derive(Deserialize)]
struct RawArray {
    shape: Shape,
    data: ArrayData,
}

impl TryFrom<RawArray> for Array {
    type Error = DatasetError;

    fn try_from(raw: RawArray) -> Result<Self> {
        Self::new(raw.shape, raw.data)
    }
}

impl Array {
    /// Builds an array, checking the element count against the shape.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `data` holds a different number of elements than
    /// `shape` describes.
    pub fn new(shape: impl Into<Shape>, data: ArrayData) -> Result<Self> {
        let shape = shape.into();
        if shape.elem_count() != data.len() {
            return Err(DatasetError::invalid_argument(format!(
                "shape {} holds {} elements, got {}",
                shape,
                shape.elem_count(),
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Caller guarantees `data.len() == shape.elem_count()`.
    pub(crate) fn from_parts(shape: Shape, data: ArrayData) -> Self {
        debug_assert_eq!(shape.elem_count(), data.len());
        Self { shape, data }
    }

    /// Rank-0 array.
    pub fn scalar(data: ArrayData) -> Result<Self> {
        Self::new(Shape::scalar(), data)
    }

    /// Rank-1 array over all of `data`.
    pub fn vector(data: ArrayData) -> Self {
        Self {
            shape: Shape::new(vec![data.len()]),
            data,
        }
    }

    pub fn zeros(dtype: DType, shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let data = ArrayData::zeros(dtype, shape.elem_count());
        Self { shape, data }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn into_data(self) -> ArrayData {
        self.data
    }

    /// Dtype and shape of this array.
    pub fn spec(&self) -> TensorSpec {
        TensorSpec {
            dtype: self.dtype(),
            shape: self.shape.clone(),
        }
    }
}

/// Static signature of an array: dtype plus concrete shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorSpec {
    pub dtype: DType,
    pub shape: Shape,
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_match_with_wildcards() {
        assert!(assert_shape_match(&[64, 64, 3], &[None, None, Some(3)]).is_ok());
        assert!(assert_shape_match(&[], &[]).is_ok());
    }

    #[test]
    fn test_shape_mismatch_names_both_shapes() {
        let err = assert_shape_match(&[64, 64, 3], &[Some(64), Some(64), Some(4)]).unwrap_err();
        match &err {
            DatasetError::ShapeMismatch { actual, expected } => {
                assert_eq!(actual, "(64, 64, 3)");
                assert_eq!(expected, "(64, 64, 4)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "Shape (64, 64, 3) does not match (64, 64, 4)");
    }

    #[test]
    fn test_rank_mismatch() {
        let err = assert_shape_match(&[3, 3], &[None]).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::RankMismatch {
                actual: 2,
                expected: 1
            }
        ));
    }

    #[test]
    fn test_pattern_formatting() {
        assert_eq!(format_pattern(&[None, Some(3)]), "(None, 3)");
        assert_eq!(format_pattern(&[Some(5)]), "(5,)");
        assert_eq!(Shape::scalar().to_string(), "()");
    }

    #[test]
    fn test_array_checks_element_count() {
        assert!(Array::new(vec![2, 2], ArrayData::F32(vec![1.0, 2.0, 3.0, 4.0])).is_ok());
        assert!(Array::new(vec![2, 3], ArrayData::F32(vec![1.0])).is_err());

        let scalar = Array::scalar(ArrayData::I64(vec![7])).unwrap();
        assert_eq!(scalar.shape().rank(), 0);
        assert_eq!(scalar.dtype(), DType::I64);
    }

    #[test]
    fn test_decoding_checks_element_count() {
        let ok: Array = serde_json::from_str(r#"{"shape":[2,2],"data":{"F32":[1.0,2.0,3.0,4.0]}}"#).unwrap();
        assert_eq!(ok.data().len(), 4);

        let err = serde_json::from_str::<Array>(r#"{"shape":[2,2],"data":{"F32":[1.0]}}"#).unwrap_err();
        assert!(err.to_string().contains("holds 4 elements, got 1"));
    }

    #[test]
    fn test_zeros_and_spec() {
        let zeros = Array::zeros(DType::U8, vec![2, 3]);
        assert_eq!(zeros.data(), &ArrayData::U8(vec![0; 6]));
        assert_eq!(zeros.spec().to_string(), "u8(2, 3)");
    }
}
