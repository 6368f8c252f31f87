// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Settings as `{name}.json` files in one directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::{ConfigError, ConfigStore};

/// [`ConfigStore`] over a directory of JSON files.
#[derive(Debug, Clone)]
pub struct FsConfigStore {
    dir: PathBuf,
}

impl FsConfigStore {
    /// Store in the per-user config directory (`~/.config/shardline` on Linux).
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from("dev", "flyingrobots", "shardline")
            .ok_or(ConfigError::NoConfigDir)?;
        Self::at(dirs.config_dir())
    }

    /// Store in `dir`, which is created if missing.
    pub fn at(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name).with_extension("json")
    }
}

impl ConfigStore for FsConfigStore {
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.file(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        // write-then-rename keeps a concurrent reader from seeing half a file
        let target = self.file(name);
        let staging = target.with_extension("json.tmp");
        fs::write(&staging, bytes)?;
        fs::rename(staging, target)
    }
}
