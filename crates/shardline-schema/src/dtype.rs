// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Declared data types of raw field values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a raw field value is parsed and hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// Unsigned 8-bit integer.
    Uint8,
    /// Signed 8-bit integer.
    Int8,
    /// Unsigned 16-bit integer.
    Uint16,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 32-bit integer.
    Uint32,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 64-bit integer.
    Uint64,
    /// Signed 64-bit integer.
    Int64,
    /// IEEE-754 single precision.
    Float32,
    /// IEEE-754 double precision.
    Float64,
    /// Opaque UTF-8 text, hashed as raw bytes.
    String,
}

impl Dtype {
    /// Every dtype, in declaration order.
    pub const ALL: [Dtype; 11] = [
        Dtype::Uint8,
        Dtype::Int8,
        Dtype::Uint16,
        Dtype::Int16,
        Dtype::Uint32,
        Dtype::Int32,
        Dtype::Uint64,
        Dtype::Int64,
        Dtype::Float32,
        Dtype::Float64,
        Dtype::String,
    ];

    /// Config spelling of the dtype.
    pub const fn name(self) -> &'static str {
        match self {
            Dtype::Uint8 => "uint8",
            Dtype::Int8 => "int8",
            Dtype::Uint16 => "uint16",
            Dtype::Int16 => "int16",
            Dtype::Uint32 => "uint32",
            Dtype::Int32 => "int32",
            Dtype::Uint64 => "uint64",
            Dtype::Int64 => "int64",
            Dtype::Float32 => "float32",
            Dtype::Float64 => "float64",
            Dtype::String => "string",
        }
    }

    /// `true` for the unsigned integer dtypes.
    pub const fn is_unsigned(self) -> bool {
        matches!(
            self,
            Dtype::Uint8 | Dtype::Uint16 | Dtype::Uint32 | Dtype::Uint64
        )
    }

    /// `true` for the signed integer dtypes.
    pub const fn is_signed(self) -> bool {
        matches!(self, Dtype::Int8 | Dtype::Int16 | Dtype::Int32 | Dtype::Int64)
    }

    /// `true` for any integer dtype.
    pub const fn is_integer(self) -> bool {
        self.is_unsigned() || self.is_signed()
    }

    /// `true` for the floating point dtypes.
    pub const fn is_float(self) -> bool {
        matches!(self, Dtype::Float32 | Dtype::Float64)
    }

    /// `true` for dtypes that carry a number.
    pub const fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Bit width of integer dtypes; `None` for floats and strings.
    pub const fn int_bits(self) -> Option<u32> {
        match self {
            Dtype::Uint8 | Dtype::Int8 => Some(8),
            Dtype::Uint16 | Dtype::Int16 => Some(16),
            Dtype::Uint32 | Dtype::Int32 => Some(32),
            Dtype::Uint64 | Dtype::Int64 => Some(64),
            Dtype::Float32 | Dtype::Float64 | Dtype::String => None,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a dtype name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dtype `{0}`")]
pub struct UnknownDtype(pub String);

impl FromStr for Dtype {
    type Err = UnknownDtype;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dtype::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| UnknownDtype(s.to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for dtype in Dtype::ALL {
            assert_eq!(dtype.name().parse::<Dtype>().unwrap(), dtype);
        }
    }

    #[test]
    fn serde_uses_config_spelling() {
        let json = serde_json::to_string(&Dtype::Uint64).unwrap();
        assert_eq!(json, "\"uint64\"");
        let back: Dtype = serde_json::from_str("\"float32\"").unwrap();
        assert_eq!(back, Dtype::Float32);
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(
            "varchar".parse::<Dtype>(),
            Err(UnknownDtype("varchar".into()))
        );
    }

    #[test]
    fn classification_is_exclusive() {
        for dtype in Dtype::ALL {
            let classes = [dtype.is_unsigned(), dtype.is_signed(), dtype.is_float()]
                .into_iter()
                .filter(|c| *c)
                .count();
            if dtype == Dtype::String {
                assert_eq!(classes, 0);
            } else {
                assert_eq!(classes, 1, "{dtype}");
            }
        }
    }
}
