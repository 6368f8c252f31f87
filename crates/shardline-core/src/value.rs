// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed values and dtype coercion of raw text.

use serde::{Deserialize, Serialize};
use shardline_schema::Dtype;

/// Canonical numeric identifier of a vertex.
///
/// Unsigned identifiers keep their value, signed identifiers are stored as
/// their two's complement bit pattern, and string identifiers are replaced by
/// the id the [`IdAllocator`](crate::IdAllocator) bound to them.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Raw numeric value.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Same bits viewed as a signed 64-bit integer (the serving layer's
    /// `Long` element type).
    pub const fn as_long(self) -> i64 {
        self.0.cast_signed()
    }
}

/// One typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// Any unsigned integer dtype.
    Unsigned(u64),
    /// Any signed integer dtype.
    Signed(i64),
    /// `float32` (widened exactly) or `float64`.
    Float(f64),
    /// `string`.
    Text(String),
}

impl Scalar {
    /// Numeric value as `f64`, or `None` for text.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Unsigned(v) => Some(*v as f64),
            Scalar::Signed(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Text(_) => None,
        }
    }
}

/// Value of one attribute column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Single-valued attribute.
    One(Scalar),
    /// List attribute (possibly empty).
    Many(Vec<Scalar>),
}

/// A raw value could not be read as its declared dtype.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{value}` is not a valid {dtype}")]
pub struct CoercionError {
    /// Declared dtype.
    pub dtype: Dtype,
    /// Offending raw text.
    pub value: String,
}

impl CoercionError {
    fn new(dtype: Dtype, value: &str) -> Self {
        Self {
            dtype,
            value: value.to_owned(),
        }
    }
}

/// Parse an unsigned integer of the declared width.
pub(crate) fn parse_unsigned(raw: &str, dtype: Dtype) -> Result<u64, CoercionError> {
    let v: u64 = raw
        .trim_ascii()
        .parse()
        .map_err(|_| CoercionError::new(dtype, raw))?;
    match dtype.int_bits() {
        Some(bits) if dtype.is_unsigned() && (bits == 64 || v >> bits == 0) => Ok(v),
        _ => Err(CoercionError::new(dtype, raw)),
    }
}

/// Parse a signed integer of the declared width.
pub(crate) fn parse_signed(raw: &str, dtype: Dtype) -> Result<i64, CoercionError> {
    let v: i64 = raw
        .trim_ascii()
        .parse()
        .map_err(|_| CoercionError::new(dtype, raw))?;
    let in_range = match dtype.int_bits() {
        Some(64) => true,
        Some(bits) if dtype.is_signed() => {
            let max = (1i64 << (bits - 1)) - 1;
            (-max - 1..=max).contains(&v)
        }
        _ => false,
    };
    if in_range {
        Ok(v)
    } else {
        Err(CoercionError::new(dtype, raw))
    }
}

/// Parse a finite float of the declared precision.
fn parse_float(raw: &str, dtype: Dtype) -> Result<f64, CoercionError> {
    let text = raw.trim_ascii();
    let v = match dtype {
        Dtype::Float32 => text.parse::<f32>().map(f64::from),
        Dtype::Float64 => text.parse::<f64>(),
        _ => return Err(CoercionError::new(dtype, raw)),
    }
    .map_err(|_| CoercionError::new(dtype, raw))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoercionError::new(dtype, raw))
    }
}

/// Coerce raw text to a typed value.
pub(crate) fn coerce(raw: &str, dtype: Dtype) -> Result<Scalar, CoercionError> {
    if dtype.is_unsigned() {
        parse_unsigned(raw, dtype).map(Scalar::Unsigned)
    } else if dtype.is_signed() {
        parse_signed(raw, dtype).map(Scalar::Signed)
    } else if dtype.is_float() {
        parse_float(raw, dtype).map(Scalar::Float)
    } else {
        Ok(Scalar::Text(raw.to_owned()))
    }
}
