//! Recursive directory listings and their diff.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{WatchError, WatchResult};

/// Metadata recorded for each listed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    /// Size in bytes at enumeration time.
    pub size: u64,
}

/// Every non-directory entry beneath a directory at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    entries: HashMap<PathBuf, EntryMeta>,
}

impl DirectorySnapshot {
    /// Enumerate `dir` recursively. Blocking.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Enumerate`] on the first entry that cannot be read;
    /// no partial snapshot is produced.
    pub fn capture(dir: &Path) -> WatchResult<Self> {
        let mut entries = HashMap::new();
        for entry in WalkDir::new(dir).min_depth(1) {
            let entry = entry.map_err(|source| WatchError::Enumerate {
                path: dir.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let size = entry
                .metadata()
                .map_err(|source| WatchError::Enumerate {
                    path: dir.to_path_buf(),
                    source,
                })?
                .len();
            entries.insert(entry.into_path(), EntryMeta { size });
        }
        Ok(Self { entries })
    }

    /// Paths present here and absent from `previous`, sorted.
    #[must_use]
    pub fn new_paths(&self, previous: &Self) -> Vec<PathBuf> {
        let mut added: Vec<PathBuf> = self
            .entries
            .keys()
            .filter(|path| !previous.entries.contains_key(*path))
            .cloned()
            .collect();
        added.sort();
        added
    }

    /// Metadata recorded for `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&EntryMeta> {
        self.entries.get(path)
    }

    /// Number of files listed.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl FromIterator<(PathBuf, EntryMeta)> for DirectorySnapshot {
    fn from_iter<I: IntoIterator<Item = (PathBuf, EntryMeta)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
