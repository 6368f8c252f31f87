// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Query-time slice lookup.

use shardline_core::{compute_slice, SliceError};
use shardline_schema::Dtype;

/// Partition layout of a converted dataset.
///
/// Recomputes slices with the same routing function the converter used, so
/// a vertex and its out-edges are found in the slice that wrote them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionLayout {
    partition_count: u32,
}

impl PartitionLayout {
    /// Layout of a dataset converted into `partition_count` slices.
    pub fn new(partition_count: u32) -> Result<Self, SliceError> {
        if partition_count == 0 {
            return Err(SliceError::ZeroPartitions);
        }
        Ok(Self { partition_count })
    }

    /// Number of slices.
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Slice holding the entity keyed by `identifier` of `dtype`.
    pub fn locate(&self, identifier: &str, dtype: Dtype) -> Result<u32, SliceError> {
        compute_slice(identifier.as_bytes(), dtype, self.partition_count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_conversion_routing() {
        let layout = PartitionLayout::new(16).unwrap();
        assert_eq!(layout.locate("alice", Dtype::String), Ok(3));
        assert_eq!(layout.locate("0", Dtype::Uint64), Ok(13));
        assert_eq!(
            layout.locate("1.5", Dtype::Float32),
            Err(SliceError::UnsupportedDtype(Dtype::Float32))
        );
        assert_eq!(PartitionLayout::new(0), Err(SliceError::ZeroPartitions));
    }
}
