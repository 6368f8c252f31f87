// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs, clippy::unwrap_used)]
//! Properties of slice routing and the shared identifier allocator.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use shardline_core::{compute_slice, Dtype, IdAllocator, SliceError};

#[test]
fn hundred_thousand_ids_balance_within_twenty_percent() {
    const PARTITIONS: u32 = 16;
    const IDS: u64 = 100_000;
    let mut counts = vec![0u64; PARTITIONS as usize];
    for id in 0..IDS {
        let slice = compute_slice(id.to_string().as_bytes(), Dtype::Uint64, PARTITIONS).unwrap();
        counts[slice as usize] += 1;
    }
    let expected = IDS / u64::from(PARTITIONS);
    let (lo, hi) = (expected * 8 / 10, expected * 12 / 10);
    for (slice, n) in counts.iter().enumerate() {
        assert!(
            (lo..=hi).contains(n),
            "slice {slice} holds {n} ids, expected {lo}..={hi}"
        );
    }
}

#[test]
fn float_dtypes_never_route() {
    for dtype in [Dtype::Float32, Dtype::Float64] {
        assert_eq!(
            compute_slice(b"1.0", dtype, 8),
            Err(SliceError::UnsupportedDtype(dtype))
        );
    }
}

#[test]
fn integer_widths_agree_on_the_same_value() {
    let reference = compute_slice(b"200", Dtype::Uint64, 97).unwrap();
    for dtype in [Dtype::Uint8, Dtype::Uint16, Dtype::Uint32, Dtype::Int16, Dtype::Int32, Dtype::Int64] {
        assert_eq!(compute_slice(b"200", dtype, 97).unwrap(), reference, "{dtype}");
    }
}

proptest! {
    #[test]
    fn integer_slice_is_deterministic_and_in_range(id in any::<u64>(), n in 1u32..=4096) {
        let text = id.to_string();
        let a = compute_slice(text.as_bytes(), Dtype::Uint64, n).unwrap();
        let b = compute_slice(text.as_bytes(), Dtype::Uint64, n).unwrap();
        prop_assert_eq!(a, b);
        prop_assert!(a < n);
    }

    #[test]
    fn string_slice_is_deterministic_and_in_range(id in ".{0,32}", n in 1u32..=4096) {
        let a = compute_slice(id.as_bytes(), Dtype::String, n).unwrap();
        prop_assert_eq!(a, compute_slice(id.as_bytes(), Dtype::String, n).unwrap());
        prop_assert!(a < n);
    }

    #[test]
    fn signed_ids_route_by_bit_pattern(id in any::<i64>(), n in 1u32..=512) {
        let signed = compute_slice(id.to_string().as_bytes(), Dtype::Int64, n).unwrap();
        let unsigned = compute_slice(id.cast_unsigned().to_string().as_bytes(), Dtype::Uint64, n).unwrap();
        prop_assert_eq!(signed, unsigned);
    }
}

#[test]
fn allocator_binds_each_identifier_once_under_contention() {
    const THREADS: usize = 8;
    let alloc = Arc::new(IdAllocator::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let alloc = Arc::clone(&alloc);
            thread::spawn(move || {
                // every thread shares "shared-*" and owns "own-{t}-*"
                let mut seen = BTreeMap::new();
                for i in 0..500 {
                    let shared = format!("shared-{i}");
                    let own = format!("own-{t}-{i}");
                    seen.insert(shared.clone(), alloc.resolve(&shared).unwrap());
                    seen.insert(own.clone(), alloc.resolve(&own).unwrap());
                }
                seen
            })
        })
        .collect();

    let mut bindings: BTreeMap<String, u64> = BTreeMap::new();
    for handle in handles {
        for (raw, id) in handle.join().unwrap() {
            let prev = bindings.insert(raw.clone(), id);
            assert!(prev.is_none_or(|p| p == id), "{raw} bound twice");
        }
    }

    assert_eq!(bindings.len(), 500 + THREADS * 500);
    assert_eq!(alloc.len(), bindings.len());
    let ids: BTreeSet<u64> = bindings.values().copied().collect();
    assert_eq!(ids.len(), bindings.len(), "two identifiers share an id");
    assert_eq!(ids.iter().copied().max(), Some(bindings.len() as u64 - 1));
}
