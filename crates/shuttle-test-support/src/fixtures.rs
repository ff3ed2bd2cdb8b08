//! Scratch directories and files for filesystem-heavy tests.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

const SCRATCH_DIR_NAME: &str = ".scratch";

fn repo_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    for ancestor in manifest_dir.ancestors() {
        if ancestor.join("Cargo.lock").is_file() {
            return ancestor.to_path_buf();
        }
    }
    manifest_dir
}

/// Root under which every test scratch directory is created.
///
/// # Errors
///
/// Returns an error if the scratch root cannot be created.
pub fn scratch_root() -> Result<PathBuf> {
    let root = repo_root().join(SCRATCH_DIR_NAME);
    fs::create_dir_all(&root)?;
    Ok(root)
}

/// Fresh scratch directory removed on drop.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn temp_dir() -> Result<TempDir> {
    Ok(tempfile::Builder::new()
        .prefix("shuttle-")
        .tempdir_in(scratch_root()?)?)
}

/// Source and destination directory pair inside one scratch directory.
pub struct DropZone {
    temp: TempDir,
    inbox: PathBuf,
    outbox: PathBuf,
}

impl DropZone {
    /// Create `in/` and `out/` under a fresh scratch directory.
    ///
    /// # Errors
    ///
    /// Returns an error if either directory cannot be created.
    pub fn new() -> Result<Self> {
        let temp = temp_dir()?;
        let inbox = temp.path().join("in");
        let outbox = temp.path().join("out");
        fs::create_dir_all(&inbox)?;
        fs::create_dir_all(&outbox)?;
        Ok(Self {
            temp,
            inbox,
            outbox,
        })
    }

    /// Scratch root holding both directories.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Directory files are dropped into.
    #[must_use]
    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    /// Directory files should end up in.
    #[must_use]
    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    /// Write `contents` to `name` inside the inbox and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn drop_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.inbox.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }
}
