// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Raw identifier → numeric id allocation shared by all workers of a run.
//!
//! # Invariants
//!
//! - Once a raw identifier is bound to an id, every later `resolve` of that
//!   identifier returns the same id for the lifetime of the allocator.
//! - Ids are dense: a fresh allocator hands out `0, 1, 2, …` in first-seen
//!   order; one seeded from an [`IdMapping`] continues after its largest id.
//! - `u64::MAX` is never handed out. Once the next id would be `u64::MAX`
//!   the allocator refuses new identifiers instead of reusing an id.
//! - The lookup and the insertion happen under one lock acquisition, so two
//!   workers racing on the same identifier always observe one binding.
//!
//! Ids are only stable across runs when the caller explicitly exports the
//! mapping and seeds the next run with it.

use std::path::Path;
use std::sync::Mutex;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure while seeding or persisting an allocator.
#[derive(Debug, Error)]
pub enum AllocError {
    /// The same raw identifier appears twice in a mapping.
    #[error("raw identifier `{0}` is mapped more than once")]
    DuplicateRaw(String),
    /// Two raw identifiers share one numeric id.
    #[error("id {0} is bound to more than one raw identifier")]
    DuplicateId(u64),
    /// A mapping binds the reserved id `u64::MAX`.
    #[error("id {0} is reserved and cannot be bound")]
    ReservedId(u64),
    /// Every allocatable id is taken.
    #[error("identifier space exhausted")]
    Exhausted,
    /// Mapping (de)serialization failure.
    #[error("id mapping json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Mapping file I/O failure.
    #[error("id mapping io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One persisted binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdEntry {
    /// Raw identifier text.
    pub raw: String,
    /// Bound id.
    pub id: u64,
}

/// Exported allocator state, sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping {
    /// Bindings in ascending id order.
    pub entries: Vec<IdEntry>,
}

impl IdMapping {
    /// Read a JSON mapping file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AllocError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Write the mapping as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AllocError> {
        std::fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }
}

#[derive(Default)]
struct Inner {
    ids: FxHashMap<Box<str>, u64>,
    next: u64,
}

impl Inner {
    fn bind(&mut self, raw: &str) -> Result<u64, AllocError> {
        if let Some(&id) = self.ids.get(raw) {
            return Ok(id);
        }
        let id = self.next;
        self.next = id.checked_add(1).ok_or(AllocError::Exhausted)?;
        self.ids.insert(raw.into(), id);
        Ok(id)
    }
}

/// Concurrency-safe identifier allocator.
///
/// Construct one per conversion job and pass it by reference to every
/// worker; there is no process-wide instance.
#[derive(Default)]
pub struct IdAllocator {
    inner: Mutex<Inner>,
}

impl IdAllocator {
    /// Empty allocator; the first id handed out is 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator seeded with a previously exported mapping.
    pub fn from_mapping(mapping: IdMapping) -> Result<Self, AllocError> {
        let mut ids = FxHashMap::default();
        let mut used = rustc_hash::FxHashSet::default();
        let mut next = 0u64;
        for IdEntry { raw, id } in mapping.entries {
            if !used.insert(id) {
                return Err(AllocError::DuplicateId(id));
            }
            if ids.contains_key(raw.as_str()) {
                return Err(AllocError::DuplicateRaw(raw));
            }
            let after = id.checked_add(1).ok_or(AllocError::ReservedId(id))?;
            next = next.max(after);
            ids.insert(raw.into_boxed_str(), id);
        }
        Ok(Self {
            inner: Mutex::new(Inner { ids, next }),
        })
    }

    /// Id bound to `raw`, allocating the next free id on first sight.
    pub fn resolve(&self, raw: &str) -> Result<u64, AllocError> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).bind(raw)
    }

    /// Ids of every identifier in `raws`, bound under one lock.
    ///
    /// Either all of them are bound or, when the id space cannot hold the
    /// new ones, none are.
    pub fn resolve_all(&self, raws: &[&str]) -> Result<Vec<u64>, AllocError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = raws
            .iter()
            .enumerate()
            .filter(|&(i, raw)| !inner.ids.contains_key(*raw) && !raws[..i].contains(raw))
            .count();
        let fresh = u64::try_from(fresh).map_err(|_| AllocError::Exhausted)?;
        inner.next.checked_add(fresh).ok_or(AllocError::Exhausted)?;
        raws.iter().map(|raw| inner.bind(raw)).collect()
    }

    /// Id bound to `raw`, without allocating.
    pub fn get(&self, raw: &str) -> Option<u64> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .ids
            .get(raw)
            .copied()
    }

    /// Number of bound identifiers.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).ids.len()
    }

    /// `true` when nothing has been bound yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every binding, sorted by id.
    pub fn export(&self) -> IdMapping {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<IdEntry> = inner
            .ids
            .iter()
            .map(|(raw, &id)| IdEntry {
                raw: raw.to_string(),
                id,
            })
            .collect();
        drop(inner);
        entries.sort_unstable_by_key(|e| e.id);
        IdMapping { entries }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn first_sight_allocates_dense_ids() {
        let alloc = IdAllocator::new();
        assert!(alloc.is_empty());
        assert_eq!(alloc.resolve("alice").unwrap(), 0);
        assert_eq!(alloc.resolve("bob").unwrap(), 1);
        assert_eq!(alloc.resolve("alice").unwrap(), 0);
        assert_eq!(alloc.len(), 2);
        assert_eq!(alloc.get("bob"), Some(1));
        assert_eq!(alloc.get("carol"), None);
        assert_eq!(alloc.len(), 2);
    }

    #[test]
    fn export_is_sorted_and_reseeds_identically() {
        let alloc = IdAllocator::new();
        for name in ["z", "y", "x", "y"] {
            alloc.resolve(name).unwrap();
        }
        let mapping = alloc.export();
        let ids: Vec<u64> = mapping.entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);

        let again = IdAllocator::from_mapping(mapping).unwrap();
        assert_eq!(again.resolve("x").unwrap(), 2);
        assert_eq!(again.resolve("w").unwrap(), 3);
    }

    #[test]
    fn seeding_rejects_conflicting_bindings() {
        let dup_id = IdMapping {
            entries: vec![
                IdEntry {
                    raw: "a".into(),
                    id: 4,
                },
                IdEntry {
                    raw: "b".into(),
                    id: 4,
                },
            ],
        };
        assert!(matches!(
            IdAllocator::from_mapping(dup_id),
            Err(AllocError::DuplicateId(4))
        ));

        let dup_raw = IdMapping {
            entries: vec![
                IdEntry {
                    raw: "a".into(),
                    id: 0,
                },
                IdEntry {
                    raw: "a".into(),
                    id: 1,
                },
            ],
        };
        assert!(matches!(
            IdAllocator::from_mapping(dup_raw),
            Err(AllocError::DuplicateRaw(_))
        ));
    }

    fn seeded(entries: &[(&str, u64)]) -> Result<IdAllocator, AllocError> {
        IdAllocator::from_mapping(IdMapping {
            entries: entries
                .iter()
                .map(|&(raw, id)| IdEntry {
                    raw: raw.into(),
                    id,
                })
                .collect(),
        })
    }

    #[test]
    fn seeding_rejects_the_reserved_id() {
        assert!(matches!(
            seeded(&[("a", u64::MAX)]),
            Err(AllocError::ReservedId(u64::MAX))
        ));
    }

    #[test]
    fn exhausted_space_refuses_new_identifiers() {
        let alloc = seeded(&[("a", u64::MAX - 2)]).unwrap();
        assert_eq!(alloc.resolve("b").unwrap(), u64::MAX - 1);
        assert!(matches!(alloc.resolve("c"), Err(AllocError::Exhausted)));
        // known identifiers still resolve
        assert_eq!(alloc.resolve("a").unwrap(), u64::MAX - 2);
        assert_eq!(alloc.len(), 2);
        assert_eq!(alloc.get("c"), None);
    }

    #[test]
    fn resolve_all_binds_all_or_nothing() {
        let alloc = seeded(&[("a", u64::MAX - 2)]).unwrap();
        assert!(matches!(
            alloc.resolve_all(&["b", "c"]),
            Err(AllocError::Exhausted)
        ));
        assert_eq!(alloc.len(), 1);
        let ids = alloc.resolve_all(&["b", "a", "b"]).unwrap();
        assert_eq!(ids, [u64::MAX - 1, u64::MAX - 2, u64::MAX - 1]);
    }

    #[test]
    fn mapping_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.json");
        let alloc = IdAllocator::new();
        alloc.resolve("n1").unwrap();
        alloc.export().save(&path).unwrap();
        let loaded = IdMapping::load(&path).unwrap();
        assert_eq!(loaded, alloc.export());
    }
}
