// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Slice routing: which partition a record belongs to.
//!
//! # Routing formula (FROZEN)
//!
//! ```text
//! key    = integer dtypes: "i" || LE_u64(value)   (signed: two's complement)
//!          string:         "s" || raw bytes
//! digest = BLAKE3("slice:" || key)
//! slice  = LE_u64(digest[0..8]) % partition_count
//! ```
//!
//! The serving layer recomputes this at query time to find the partition
//! holding a vertex and its out-edges, so the formula is frozen once a dataset
//! has been written. Any change requires converting every dataset again.
//!
//! Integer identifiers are normalized before hashing: `"7"`, `" 007"` and the
//! same value declared as `uint32` or `int64` all land in the same slice.
//! Float dtypes are not valid slice keys.

use shardline_schema::Dtype;
use thiserror::Error;

use crate::value::{parse_signed, parse_unsigned, CoercionError};

const SLICE_DOMAIN: &[u8] = b"slice:";
const TAG_INT: u8 = b'i';
const TAG_STR: u8 = b's';

/// Why a slice could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SliceError {
    /// The dtype cannot key a slice (floats).
    #[error("dtype {0} cannot be used as a slice key")]
    UnsupportedDtype(Dtype),
    /// A job with zero partitions has nowhere to route to.
    #[error("partition count must be positive")]
    ZeroPartitions,
    /// The identifier is not valid UTF-8 text for a numeric dtype.
    #[error("identifier is not valid text for dtype {0}")]
    NotText(Dtype),
    /// The identifier does not parse as its declared integer dtype.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] CoercionError),
}

/// BLAKE3 routing digest of an identifier.
///
/// Exposed for tooling (`shardline slice`); routing only uses the first
/// eight bytes.
pub fn slice_key_digest(identifier: &[u8], dtype: Dtype) -> Result<[u8; 32], SliceError> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SLICE_DOMAIN);
    if dtype.is_integer() {
        let text = std::str::from_utf8(identifier).map_err(|_| SliceError::NotText(dtype))?;
        let canonical = if dtype.is_unsigned() {
            parse_unsigned(text, dtype)?
        } else {
            parse_signed(text, dtype)?.cast_unsigned()
        };
        hasher.update(&[TAG_INT]);
        hasher.update(&canonical.to_le_bytes());
    } else if dtype == Dtype::String {
        hasher.update(&[TAG_STR]);
        hasher.update(identifier);
    } else {
        return Err(SliceError::UnsupportedDtype(dtype));
    }
    Ok(hasher.finalize().into())
}

/// Compute the slice of an identifier.
///
/// Pure and deterministic: the same `(identifier, dtype, partition_count)`
/// yields the same slice on every call, in every process, on every platform.
/// The result is always `< partition_count`.
pub fn compute_slice(
    identifier: &[u8],
    dtype: Dtype,
    partition_count: u32,
) -> Result<u32, SliceError> {
    if partition_count == 0 {
        return Err(SliceError::ZeroPartitions);
    }
    let digest = slice_key_digest(identifier, dtype)?;
    let first_8: [u8; 8] = [
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ];
    let val = u64::from_le_bytes(first_8);
    // remainder < partition_count, which fits u32
    #[allow(clippy::cast_possible_truncation)]
    let slice = (val % u64::from(partition_count)) as u32;
    Ok(slice)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // =========================================================================
    // TEST VECTORS - regression tests. Do NOT change expected values.
    // If these fail, slice routing changed and every dataset is invalid.
    // =========================================================================

    #[test]
    fn vector_uint_zero() {
        let d = slice_key_digest(b"0", Dtype::Uint64).unwrap();
        assert_eq!(d[..8], [0x1d, 0x29, 0xf4, 0xa1, 0x55, 0x00, 0x33, 0x2a]);
        assert_eq!(compute_slice(b"0", Dtype::Uint64, 16), Ok(13));
        assert_eq!(compute_slice(b"0", Dtype::Uint64, 7), Ok(1));
    }

    #[test]
    fn vector_uint_42() {
        assert_eq!(compute_slice(b"42", Dtype::Uint64, 16), Ok(7));
        assert_eq!(compute_slice(b"42", Dtype::Uint64, 7), Ok(3));
    }

    #[test]
    fn vector_string_alice() {
        let d = slice_key_digest(b"alice", Dtype::String).unwrap();
        assert_eq!(d[..8], [0x53, 0x40, 0xd2, 0x69, 0xba, 0x99, 0xc7, 0xa9]);
        assert_eq!(compute_slice(b"alice", Dtype::String, 16), Ok(3));
        assert_eq!(compute_slice(b"alice", Dtype::String, 7), Ok(3));
    }

    #[test]
    fn vector_string_empty_and_digits() {
        assert_eq!(compute_slice(b"", Dtype::String, 16), Ok(7));
        assert_eq!(compute_slice(b"42", Dtype::String, 16), Ok(14));
        assert_eq!(compute_slice(b"42", Dtype::String, 7), Ok(5));
    }

    #[test]
    fn vector_negative_one_matches_u64_max() {
        assert_eq!(compute_slice(b"-1", Dtype::Int64, 16), Ok(14));
        assert_eq!(
            compute_slice(b"18446744073709551615", Dtype::Uint64, 16),
            Ok(14)
        );
    }

    // =========================================================================
    // Normalization and failures
    // =========================================================================

    #[test]
    fn integer_keys_are_normalized_across_width_and_spelling() {
        let base = compute_slice(b"42", Dtype::Uint64, 1000).unwrap();
        assert_eq!(compute_slice(b"0042", Dtype::Uint64, 1000), Ok(base));
        assert_eq!(compute_slice(b" 42\n", Dtype::Uint32, 1000), Ok(base));
        assert_eq!(compute_slice(b"42", Dtype::Int16, 1000), Ok(base));
    }

    #[test]
    fn string_and_integer_keys_are_domain_separated() {
        let a = slice_key_digest(b"42", Dtype::String).unwrap();
        let b = slice_key_digest(b"42", Dtype::Uint64).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn float_dtypes_are_rejected() {
        assert_eq!(
            compute_slice(b"1.5", Dtype::Float32, 4),
            Err(SliceError::UnsupportedDtype(Dtype::Float32))
        );
        assert_eq!(
            compute_slice(b"1", Dtype::Float64, 4),
            Err(SliceError::UnsupportedDtype(Dtype::Float64))
        );
    }

    #[test]
    fn zero_partitions_is_rejected() {
        assert_eq!(
            compute_slice(b"a", Dtype::String, 0),
            Err(SliceError::ZeroPartitions)
        );
    }

    #[test]
    fn malformed_integer_is_rejected() {
        assert!(matches!(
            compute_slice(b"12x", Dtype::Uint64, 4),
            Err(SliceError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            compute_slice(b"300", Dtype::Uint8, 4),
            Err(SliceError::InvalidIdentifier(_))
        ));
        assert_eq!(
            compute_slice(&[0xff, 0xfe], Dtype::Uint64, 4),
            Err(SliceError::NotText(Dtype::Uint64))
        );
    }

    #[test]
    fn single_partition_always_routes_to_zero() {
        for i in 0..100 {
            assert_eq!(compute_slice(format!("{i}").as_bytes(), Dtype::Int64, 1), Ok(0));
        }
    }
}
