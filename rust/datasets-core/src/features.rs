// rust/datasets-core/src/features.rs

//! Example records and their declared feature schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};
use crate::tensor::{assert_shape_match, Array, ArrayData, DType, Shape};

/// A single feature value inside an [`Example`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    Tensor(Array),
}

impl FeatureValue {
    pub fn dtype(&self) -> DType {
        match self {
            FeatureValue::Int(_) | FeatureValue::IntList(_) => DType::I64,
            FeatureValue::Float(_) | FeatureValue::FloatList(_) => DType::F64,
            FeatureValue::Bool(_) => DType::Bool,
            FeatureValue::Bytes(_) => DType::U8,
            FeatureValue::Str(_) => DType::String,
            FeatureValue::Tensor(a) => a.dtype(),
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            FeatureValue::Int(_)
            | FeatureValue::Float(_)
            | FeatureValue::Bool(_)
            | FeatureValue::Str(_) => Vec::new(),
            FeatureValue::Bytes(b) => vec![b.len()],
            FeatureValue::IntList(v) => vec![v.len()],
            FeatureValue::FloatList(v) => vec![v.len()],
            FeatureValue::Tensor(a) => a.shape().dims().to_vec(),
        }
    }

    /// Converts the value into a plain host array.
    pub fn to_array(&self) -> Array {
        match self {
            FeatureValue::Int(v) => scalar(ArrayData::I64(vec![*v])),
            FeatureValue::Float(v) => scalar(ArrayData::F64(vec![*v])),
            FeatureValue::Bool(v) => scalar(ArrayData::Bool(vec![*v])),
            FeatureValue::Str(s) => scalar(ArrayData::String(vec![s.clone()])),
            FeatureValue::Bytes(b) => Array::vector(ArrayData::U8(b.clone())),
            FeatureValue::IntList(v) => Array::vector(ArrayData::I64(v.clone())),
            FeatureValue::FloatList(v) => Array::vector(ArrayData::F64(v.clone())),
            FeatureValue::Tensor(a) => a.clone(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FeatureValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeatureValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

fn scalar(data: ArrayData) -> Array {
    Array::from_parts(Shape::scalar(), data)
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Str(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Str(v)
    }
}

impl From<Vec<u8>> for FeatureValue {
    fn from(v: Vec<u8>) -> Self {
        FeatureValue::Bytes(v)
    }
}

impl From<Array> for FeatureValue {
    fn from(v: Array) -> Self {
        FeatureValue::Tensor(v)
    }
}

/// One record: feature name to value. Ordered so serialization is stable.
pub type Example = BTreeMap<String, FeatureValue>;

/// Lazy, fallible stream of examples.
pub type ExampleStream = Box<dyn Iterator<Item = Result<Example>> + Send>;

/// Builds an [`Example`] from `(name, value)` pairs.
///
/// ```
/// use datasets_core::features::{example, FeatureValue};
///
/// let ex = example([("label", FeatureValue::Int(3)), ("text", "hi".into())]);
/// assert_eq!(ex["label"], FeatureValue::Int(3));
/// ```
pub fn example<K, I>(pairs: I) -> Example
where
    K: Into<String>,
    I: IntoIterator<Item = (K, FeatureValue)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Declared dtype and shape of one feature. `None` dimensions accept any size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub dtype: DType,
    #[serde(default)]
    pub shape: Vec<Option<usize>>,
}

impl FeatureSpec {
    pub fn scalar(dtype: DType) -> Self {
        Self {
            dtype,
            shape: Vec::new(),
        }
    }

    pub fn new(dtype: DType, shape: Vec<Option<usize>>) -> Self {
        Self { dtype, shape }
    }
}

/// Feature name to spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    features: BTreeMap<String, FeatureSpec>,
}

impl FeatureSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, name: impl Into<String>, spec: FeatureSpec) -> Self {
        self.features.insert(name.into(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Checks that `example` carries exactly the declared features with
    /// matching dtypes and shapes.
    pub fn validate(&self, example: &Example) -> Result<()> {
        for (name, spec) in &self.features {
            let value = example
                .get(name)
                .ok_or_else(|| DatasetError::schema(name, "missing from example"))?;

            if value.dtype() != spec.dtype {
                return Err(DatasetError::schema(
                    name,
                    format!("expected dtype {}, got {}", spec.dtype, value.dtype()),
                ));
            }

            assert_shape_match(&value.shape(), &spec.shape)
                .map_err(|e| DatasetError::schema(name, e.to_string()))?;
        }

        if let Some(extra) = example.keys().find(|k| !self.features.contains_key(*k)) {
            return Err(DatasetError::schema(extra, "not declared in schema"));
        }
        Ok(())
    }
}
