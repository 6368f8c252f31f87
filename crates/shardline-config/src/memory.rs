// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Settings held in memory.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};

use crate::ConfigStore;

#[derive(Default)]
struct Slots {
    bytes: BTreeMap<String, Vec<u8>>,
    fail_reads: bool,
}

/// [`ConfigStore`] backed by a shared map. Clones see the same slots.
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    slots: Arc<Mutex<Slots>>,
}

impl InMemoryConfigStore {
    /// Store with no slots filled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `read` fail with an I/O error.
    pub fn fail_reads(&self, fail: bool) {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).fail_reads = fail;
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.fail_reads {
            return Err(io::Error::other("read failure"));
        }
        Ok(slots.bytes.get(name).cloned())
    }

    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .bytes
            .insert(name.to_owned(), bytes.to_vec());
        Ok(())
    }
}
