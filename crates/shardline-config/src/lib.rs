// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed, JSON-backed settings for shardline tools.
//!
//! Each setting lives under a named slot. A [`ConfigKey<T>`] pairs the slot
//! name with the Rust type stored there, so the schema declaration and the
//! conversion options cannot be read back as each other:
//!
//! ```text
//! ConfigKey<SchemaConfig>("schema")    ─┐
//! ConfigKey<ConvertOptions>("convert") ─┴─► ConfigService ─► ConfigStore (bytes)
//! ```
//!
//! Stores only move bytes; [`ConfigService`] owns the JSON encoding.

mod fs;
mod memory;

pub use fs::FsConfigStore;
pub use memory::InMemoryConfigStore;

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Failure reading or writing a setting.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The slot name cannot address a stored setting.
    #[error("invalid config key `{0}`: expected [A-Za-z0-9_-]+")]
    InvalidKey(String),
    /// No per-user config directory exists on this platform.
    #[error("no config directory available for this user")]
    NoConfigDir,
    /// The backing store failed.
    #[error("config `{key}`: {source}")]
    Io {
        /// Slot being accessed.
        key: String,
        /// Underlying failure.
        source: std::io::Error,
    },
    /// The stored bytes are not valid JSON for the slot's type.
    #[error("config `{key}` is malformed: {source}")]
    Malformed {
        /// Slot being accessed.
        key: String,
        /// Decode or encode failure.
        source: serde_json::Error,
    },
}

/// Checks that `name` is usable as a slot name.
///
/// Slot names become file stems in [`FsConfigStore`], so they are limited to
/// ASCII alphanumerics, `-` and `_`.
pub fn validate_key(name: &str) -> Result<(), ConfigError> {
    let ok = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidKey(name.to_owned()))
    }
}

/// Slot name tagged with the type stored under it.
pub struct ConfigKey<T> {
    name: Cow<'static, str>,
    _value: PhantomData<fn() -> T>,
}

impl<T> ConfigKey<T> {
    /// Key with a fixed name.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _value: PhantomData,
        }
    }

    /// Key with a name chosen at runtime (e.g. from the command line).
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            _value: PhantomData,
        }
    }

    /// Slot name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for ConfigKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ConfigKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConfigKey").field(&self.name).finish()
    }
}

/// Byte storage behind a [`ConfigService`].
pub trait ConfigStore {
    /// Bytes stored under `name`, or `None` when the slot is empty.
    fn read(&self, name: &str) -> std::io::Result<Option<Vec<u8>>>;
    /// Replace the bytes stored under `name`.
    fn write(&self, name: &str, bytes: &[u8]) -> std::io::Result<()>;
}

/// Reads and writes typed settings through a [`ConfigStore`].
#[derive(Debug, Clone)]
pub struct ConfigService<S> {
    store: S,
}

impl<S: ConfigStore> ConfigService<S> {
    /// Service over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Setting stored under `key`, or `None` when the slot is empty.
    ///
    /// A zero-length blob counts as empty.
    pub fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Result<Option<T>, ConfigError> {
        let name = key.name();
        validate_key(name)?;
        let bytes = self.store.read(name).map_err(|source| ConfigError::Io {
            key: name.to_owned(),
            source,
        })?;
        match bytes {
            Some(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| ConfigError::Malformed {
                    key: name.to_owned(),
                    source,
                }),
            _ => Ok(None),
        }
    }

    /// Setting stored under `key`, or `T::default()` when the slot is empty.
    pub fn get_or_default<T>(&self, key: &ConfigKey<T>) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        Ok(self.get(key)?.unwrap_or_default())
    }

    /// Store `value` under `key` as pretty-printed JSON.
    pub fn put<T: Serialize>(&self, key: &ConfigKey<T>, value: &T) -> Result<(), ConfigError> {
        let name = key.name();
        validate_key(name)?;
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| ConfigError::Malformed {
            key: name.to_owned(),
            source,
        })?;
        self.store.write(name, &bytes).map_err(|source| ConfigError::Io {
            key: name.to_owned(),
            source,
        })
    }
}
