// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Entity-sampling port and its guarded client.

use std::sync::Arc;

use thiserror::Error;

use crate::entity::{ArrayDtype, EntityCategory, TypedArray, UnknownCategory};

/// Failure reported by a store implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store lost its session.
    #[error("store session closed")]
    Closed,
    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Port implemented by the serving engine.
///
/// Called only with validated arguments: a known category, at least one
/// entity type and a positive count.
pub trait EntityStore: Send + Sync {
    /// Sample up to `count` entities of each of `types`, one array per
    /// output field of `category`.
    fn collect_entity(
        &self,
        category: EntityCategory,
        types: &[u8],
        count: u32,
    ) -> Result<Vec<TypedArray>, StoreError>;
}

/// Why a sampling request produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// No store is connected.
    #[error("store unavailable")]
    StoreUnavailable,
    /// Category tag not recognized.
    #[error(transparent)]
    Category(#[from] UnknownCategory),
    /// Count is zero or negative.
    #[error("count must be positive, got {0}")]
    NonPositiveCount(i64),
    /// Count does not fit the store's range.
    #[error("count {0} is too large")]
    CountTooLarge(i64),
    /// No entity type requested.
    #[error("no entity types requested")]
    NoTypes,
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Wrong number of arrays returned.
    #[error("{category} response has {found} arrays, expected {expected}")]
    FieldCount {
        /// Requested category.
        category: EntityCategory,
        /// Arrays expected.
        expected: usize,
        /// Arrays returned.
        found: usize,
    },
    /// An array has the wrong element type.
    #[error("array {index} has dtype {found:?}, expected {expected:?}")]
    FieldDtype {
        /// Position of the array.
        index: usize,
        /// Expected dtype.
        expected: ArrayDtype,
        /// Returned dtype.
        found: ArrayDtype,
    },
    /// Arrays of one response differ in length.
    #[error("response arrays differ in length")]
    RaggedArrays,
}

/// Client for an [`EntityStore`] with explicit connect and disconnect.
///
/// There is no process-wide instance; callers own the client.
#[derive(Default, Clone)]
pub struct SamplingClient {
    store: Option<Arc<dyn EntityStore>>,
}

impl std::fmt::Debug for SamplingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingClient")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl SamplingClient {
    /// Disconnected client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a store, replacing any previous one.
    pub fn connect(&mut self, store: Arc<dyn EntityStore>) {
        self.store = Some(store);
    }

    /// Detach the store, returning it.
    pub fn disconnect(&mut self) -> Option<Arc<dyn EntityStore>> {
        self.store.take()
    }

    /// `true` while a store is attached.
    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    /// Sample entities, or an empty vector when the request or the response
    /// is invalid. Rejections are logged.
    pub fn collect_entity(&self, types: &[u8], count: i64, category: &str) -> Vec<TypedArray> {
        match self.try_collect_entity(types, count, category) {
            Ok(arrays) => arrays,
            Err(err) => {
                tracing::error!(%category, count, types = types.len(), error = %err, "entity sampling rejected");
                Vec::new()
            }
        }
    }

    /// Sample entities, reporting why a request was rejected.
    ///
    /// Every argument check happens before the store is touched.
    pub fn try_collect_entity(
        &self,
        types: &[u8],
        count: i64,
        category: &str,
    ) -> Result<Vec<TypedArray>, QueryError> {
        let store = self.store.as_ref().ok_or(QueryError::StoreUnavailable)?;
        let category: EntityCategory = category.parse()?;
        if count <= 0 {
            return Err(QueryError::NonPositiveCount(count));
        }
        let count = u32::try_from(count).map_err(|_| QueryError::CountTooLarge(count))?;
        if types.is_empty() {
            return Err(QueryError::NoTypes);
        }

        let arrays = store.collect_entity(category, types, count)?;
        check_layout(category, &arrays)?;
        Ok(arrays)
    }
}

fn check_layout(category: EntityCategory, arrays: &[TypedArray]) -> Result<(), QueryError> {
    let expected = category.fields();
    if arrays.len() != expected.len() {
        return Err(QueryError::FieldCount {
            category,
            expected: expected.len(),
            found: arrays.len(),
        });
    }
    for (index, (array, &want)) in arrays.iter().zip(expected).enumerate() {
        if array.dtype() != want {
            return Err(QueryError::FieldDtype {
                index,
                expected: want,
                found: array.dtype(),
            });
        }
    }
    let len = arrays.first().map_or(0, TypedArray::len);
    if arrays.iter().any(|a| a.len() != len) {
        return Err(QueryError::RaggedArrays);
    }
    Ok(())
}
