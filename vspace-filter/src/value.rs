//! Literal values shared by predicates, statistics, and primary keys.

use std::cmp::Ordering;
use std::fmt;

use arrow::array::{Array, AsArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, UInt8Type,
    UInt16Type, UInt32Type, UInt64Type,
};
use serde::{Deserialize, Serialize};
use vspace_result::{Error, Result};

/// A single typed value, independent of the Arrow array it came from.
///
/// Integer widths collapse into `Int64`/`UInt64` and floats into `Float64`;
/// comparisons across the numeric variants are defined, anything else across
/// variants is incomparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub enum ScalarValue {
    Boolean(bool),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
}

impl ScalarValue {
    /// Order two values. `None` means incomparable (different kinds, or NaN).
    pub fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        use ScalarValue::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Int64(a), Int64(b)) => Some(a.cmp(b)),
            (UInt64(a), UInt64(b)) => Some(a.cmp(b)),
            (Int64(a), UInt64(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (UInt64(a), Int64(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Float64(a), Float64(b)) => a.partial_cmp(b),
            // Integer-to-float widening is monotone, which keeps statistics
            // checks and row evaluation consistent with each other.
            (Float64(a), Int64(b)) => a.partial_cmp(&(*b as f64)),
            (Float64(a), UInt64(b)) => a.partial_cmp(&(*b as f64)),
            (Int64(a), Float64(b)) => (*a as f64).partial_cmp(b),
            (UInt64(a), Float64(b)) => (*a as f64).partial_cmp(b),
            (Utf8(a), Utf8(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Binary(a), Binary(b)) => Some(a.cmp(b)),
            (Utf8(a), Binary(b)) => Some(a.as_bytes().cmp(b.as_slice())),
            (Binary(a), Utf8(b)) => Some(a.as_slice().cmp(b.as_bytes())),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Boolean(v) => write!(f, "{v}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::UInt64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{v}"),
            ScalarValue::Utf8(v) => write!(f, "'{v}'"),
            ScalarValue::Binary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

macro_rules! impl_from_for_scalar {
    ($variant:ident, $target:ty, $($t:ty),*) => {
        $(
            impl From<$t> for ScalarValue {
                fn from(v: $t) -> Self {
                    ScalarValue::$variant(<$target>::from(v))
                }
            }
        )*
    };
}

impl_from_for_scalar!(Int64, i64, i8, i16, i32, i64);
impl_from_for_scalar!(UInt64, u64, u8, u16, u32, u64);
impl_from_for_scalar!(Float64, f64, f32, f64);
impl_from_for_scalar!(Boolean, bool, bool);

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Utf8(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Utf8(v)
    }
}

impl From<Vec<u8>> for ScalarValue {
    fn from(v: Vec<u8>) -> Self {
        ScalarValue::Binary(v)
    }
}

impl From<&[u8]> for ScalarValue {
    fn from(v: &[u8]) -> Self {
        ScalarValue::Binary(v.to_vec())
    }
}

/// Whether [`scalar_at`] can read values out of arrays of this type.
pub fn is_supported_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Boolean
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Utf8
            | DataType::LargeUtf8
            | DataType::Binary
            | DataType::LargeBinary
            | DataType::FixedSizeBinary(_)
    )
}

/// Read row `row` of `array` as a [`ScalarValue`]. Nulls read as `None`.
pub fn scalar_at(array: &dyn Array, row: usize) -> Result<Option<ScalarValue>> {
    if row >= array.len() {
        return Err(Error::InvalidArgumentError(format!(
            "row {row} out of bounds for array of length {}",
            array.len()
        )));
    }
    if array.is_null(row) {
        return Ok(None);
    }

    let value = match array.data_type() {
        DataType::Boolean => ScalarValue::Boolean(array.as_boolean().value(row)),
        DataType::Int8 => array.as_primitive::<Int8Type>().value(row).into(),
        DataType::Int16 => array.as_primitive::<Int16Type>().value(row).into(),
        DataType::Int32 => array.as_primitive::<Int32Type>().value(row).into(),
        DataType::Int64 => array.as_primitive::<Int64Type>().value(row).into(),
        DataType::UInt8 => array.as_primitive::<UInt8Type>().value(row).into(),
        DataType::UInt16 => array.as_primitive::<UInt16Type>().value(row).into(),
        DataType::UInt32 => array.as_primitive::<UInt32Type>().value(row).into(),
        DataType::UInt64 => array.as_primitive::<UInt64Type>().value(row).into(),
        DataType::Float32 => array.as_primitive::<Float32Type>().value(row).into(),
        DataType::Float64 => array.as_primitive::<Float64Type>().value(row).into(),
        DataType::Utf8 => array.as_string::<i32>().value(row).into(),
        DataType::LargeUtf8 => array.as_string::<i64>().value(row).into(),
        DataType::Binary => array.as_binary::<i32>().value(row).into(),
        DataType::LargeBinary => array.as_binary::<i64>().value(row).into(),
        DataType::FixedSizeBinary(_) => array.as_fixed_size_binary().value(row).into(),
        other => {
            return Err(Error::InvalidArgumentError(format!(
                "unsupported column type {other:?} for filtering"
            )));
        }
    };
    Ok(Some(value))
}
