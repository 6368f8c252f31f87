// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs, clippy::unwrap_used)]
//! Request and response validation at the sampling boundary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use shardline_query::{
    ArrayDtype, EntityCategory, EntityStore, QueryError, SamplingClient, StoreError, TypedArray,
};

/// Store fake that replays a canned response and counts calls.
struct CountingStore {
    calls: AtomicUsize,
    last: Mutex<Option<(EntityCategory, Vec<u8>, u32)>>,
    response: Result<Vec<TypedArray>, StoreError>,
}

impl CountingStore {
    fn new(response: Result<Vec<TypedArray>, StoreError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
            response,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EntityStore for CountingStore {
    fn collect_entity(
        &self,
        category: EntityCategory,
        types: &[u8],
        count: u32,
    ) -> Result<Vec<TypedArray>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some((category, types.to_vec(), count));
        self.response.clone()
    }
}

fn edge_response() -> Vec<TypedArray> {
    vec![
        TypedArray::Long(vec![1, 2]),
        TypedArray::Long(vec![3, 4]),
        TypedArray::Byte(vec![0, 0]),
    ]
}

fn client(store: &Arc<CountingStore>) -> SamplingClient {
    let mut client = SamplingClient::new();
    client.connect(Arc::clone(store) as Arc<dyn EntityStore>);
    client
}

#[test]
fn valid_edge_request_passes_through() {
    let store = CountingStore::new(Ok(edge_response()));
    let client = client(&store);
    assert_eq!(client.collect_entity(&[0, 2], 2, "edge"), edge_response());
    assert_eq!(store.calls(), 1);
    assert_eq!(
        *store.last.lock().unwrap(),
        Some((EntityCategory::Edge, vec![0, 2], 2))
    );
}

#[test]
fn disconnected_client_returns_empty() {
    let store = CountingStore::new(Ok(edge_response()));
    let mut client = client(&store);
    assert!(client.disconnect().is_some());
    assert!(!client.is_connected());
    assert!(client.collect_entity(&[0], 2, "edge").is_empty());
    assert_eq!(
        client.try_collect_entity(&[0], 2, "edge"),
        Err(QueryError::StoreUnavailable)
    );
    assert_eq!(store.calls(), 0);
}

#[test]
fn invalid_arguments_never_reach_the_store() {
    let store = CountingStore::new(Ok(edge_response()));
    let client = client(&store);
    assert!(client.collect_entity(&[0], 2, "node").is_empty());
    assert!(client.collect_entity(&[0], 0, "edge").is_empty());
    assert!(client.collect_entity(&[0], -5, "edge").is_empty());
    assert!(client.collect_entity(&[0], i64::from(u32::MAX) + 1, "edge").is_empty());
    assert!(client.collect_entity(&[], 2, "edge").is_empty());
    assert_eq!(
        client.try_collect_entity(&[0], -5, "edge"),
        Err(QueryError::NonPositiveCount(-5))
    );
    assert_eq!(
        client.try_collect_entity(&[], 1, "vertex"),
        Err(QueryError::NoTypes)
    );
    assert_eq!(store.calls(), 0);
}

#[test]
fn mismatched_responses_are_total_failures() {
    let cases: Vec<(Vec<TypedArray>, QueryError)> = vec![
        (
            vec![TypedArray::Long(vec![1]), TypedArray::Long(vec![2])],
            QueryError::FieldCount {
                category: EntityCategory::Edge,
                expected: 3,
                found: 2,
            },
        ),
        (
            vec![
                TypedArray::Long(vec![1]),
                TypedArray::Byte(vec![2]),
                TypedArray::Byte(vec![0]),
            ],
            QueryError::FieldDtype {
                index: 1,
                expected: ArrayDtype::Long,
                found: ArrayDtype::Byte,
            },
        ),
        (
            vec![
                TypedArray::Long(vec![1, 2]),
                TypedArray::Long(vec![3]),
                TypedArray::Byte(vec![0, 0]),
            ],
            QueryError::RaggedArrays,
        ),
    ];
    for (response, expected) in cases {
        let store = CountingStore::new(Ok(response));
        let client = client(&store);
        assert_eq!(client.try_collect_entity(&[0], 2, "edge"), Err(expected));
        assert!(client.collect_entity(&[0], 2, "edge").is_empty());
        assert_eq!(store.calls(), 2);
    }
}

#[test]
fn store_failure_yields_empty() {
    let store = CountingStore::new(Err(StoreError::Backend("shard offline".into())));
    let client = client(&store);
    assert!(client.collect_entity(&[1], 10, "vertex").is_empty());
    assert_eq!(
        client.try_collect_entity(&[1], 10, "vertex"),
        Err(QueryError::Store(StoreError::Backend("shard offline".into())))
    );
}

proptest! {
    #[test]
    fn unknown_categories_are_rejected_without_store_access(tag in "[a-zA-Z ]{0,12}") {
        prop_assume!(tag != "vertex" && tag != "edge");
        let store = CountingStore::new(Ok(edge_response()));
        let client = client(&store);
        prop_assert!(client.collect_entity(&[0], 1, &tag).is_empty());
        prop_assert_eq!(store.calls(), 0);
    }
}
