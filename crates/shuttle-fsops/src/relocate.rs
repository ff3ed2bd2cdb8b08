//! Move a file with an atomic rename, falling back to copy-then-delete.
//!
//! The fallback covers cross-device and cross-share moves where rename is not
//! available. A failure after the copy but before the source is removed leaves
//! both files in place; nothing is rolled back, and the error names the stage.
//! Running the relocation again on the same pair converges: the destination is
//! truncated before every copy.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{FsOpsError, FsOpsResult};

/// Stage of the copy fallback that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocateStage {
    /// Opening the source for reading.
    OpenSource,
    /// Creating or truncating the destination.
    CreateDestination,
    /// Streaming bytes from source to destination.
    Copy,
    /// Deleting the source after a successful copy.
    RemoveSource,
}

impl RelocateStage {
    /// Stable identifier used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenSource => "open_source",
            Self::CreateDestination => "create_destination",
            Self::Copy => "copy",
            Self::RemoveSource => "remove_source",
        }
    }
}

impl fmt::Display for RelocateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a relocation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationStrategy {
    /// Atomic rename.
    Rename,
    /// Stream copy followed by source deletion.
    CopyThenDelete,
}

impl RelocationStrategy {
    /// Stable identifier used in logs and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rename => "rename",
            Self::CopyThenDelete => "copy_then_delete",
        }
    }
}

/// Result of a successful relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Strategy that succeeded.
    pub strategy: RelocationStrategy,
    /// Bytes streamed by the copy fallback; `0` for a rename.
    pub bytes_copied: u64,
}

/// Filesystem primitives used by the relocator.
pub trait FsPrimitives: Send + Sync {
    /// Atomically rename `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the rename is not possible.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Open `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the file cannot be opened.
    fn open_source(&self, path: &Path) -> io::Result<File>;

    /// Create or truncate `path` for writing.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the file cannot be created.
    fn create_destination(&self, path: &Path) -> io::Result<File>;

    /// Delete `path`.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the file cannot be removed.
    fn remove_source(&self, path: &Path) -> io::Result<()>;
}

/// Primitives backed by the local operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FsPrimitives for LocalFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn open_source(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }

    fn create_destination(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    }

    fn remove_source(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Moves files from a source path to a destination path.
#[derive(Clone)]
pub struct Relocator {
    fs: Arc<dyn FsPrimitives>,
}

impl Default for Relocator {
    fn default() -> Self {
        Self::new(Arc::new(LocalFs))
    }
}

impl fmt::Debug for Relocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relocator").finish_non_exhaustive()
    }
}

impl Relocator {
    /// Relocator over the supplied primitives.
    #[must_use]
    pub fn new(fs: Arc<dyn FsPrimitives>) -> Self {
        Self { fs }
    }

    /// Move `from` to `to`. Blocking; run it off the async workers.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Relocate`] naming the failed stage when the rename
    /// and the copy fallback both fail.
    pub fn relocate(&self, from: &Path, to: &Path) -> FsOpsResult<Relocation> {
        match self.fs.rename(from, to) {
            Ok(()) => {
                return Ok(Relocation {
                    strategy: RelocationStrategy::Rename,
                    bytes_copied: 0,
                });
            }
            Err(error) => warn!(
                source = %from.display(),
                destination = %to.display(),
                error = %error,
                "rename failed, possibly across devices; copying and removing instead"
            ),
        }

        let bytes_copied = self.copy_contents(from, to)?;
        self.fs
            .remove_source(from)
            .map_err(|source| FsOpsError::relocate(RelocateStage::RemoveSource, from, to, source))?;
        debug!(
            source = %from.display(),
            destination = %to.display(),
            bytes = bytes_copied,
            "copy fallback complete"
        );

        Ok(Relocation {
            strategy: RelocationStrategy::CopyThenDelete,
            bytes_copied,
        })
    }

    fn copy_contents(&self, from: &Path, to: &Path) -> FsOpsResult<u64> {
        let mut source = self
            .fs
            .open_source(from)
            .map_err(|err| FsOpsError::relocate(RelocateStage::OpenSource, from, to, err))?;
        let mut destination = self
            .fs
            .create_destination(to)
            .map_err(|err| FsOpsError::relocate(RelocateStage::CreateDestination, from, to, err))?;
        let copied = io::copy(&mut source, &mut destination)
            .and_then(|copied| destination.flush().map(|()| copied))
            .map_err(|err| FsOpsError::relocate(RelocateStage::Copy, from, to, err))?;
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use shuttle_test_support::fixtures::DropZone;

    /// Local primitives whose rename always fails, as across devices.
    struct CrossDevice;

    impl FsPrimitives for CrossDevice {
        fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::CrossesDevices, "cross-device link"))
        }

        fn open_source(&self, path: &Path) -> io::Result<File> {
            LocalFs.open_source(path)
        }

        fn create_destination(&self, path: &Path) -> io::Result<File> {
            LocalFs.create_destination(path)
        }

        fn remove_source(&self, path: &Path) -> io::Result<()> {
            LocalFs.remove_source(path)
        }
    }

    /// Cross-device primitives whose source deletion always fails.
    struct StuckSource;

    impl FsPrimitives for StuckSource {
        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            CrossDevice.rename(from, to)
        }

        fn open_source(&self, path: &Path) -> io::Result<File> {
            LocalFs.open_source(path)
        }

        fn create_destination(&self, path: &Path) -> io::Result<File> {
            LocalFs.create_destination(path)
        }

        fn remove_source(&self, _path: &Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only share"))
        }
    }

    #[test]
    fn same_device_relocation_renames() -> Result<()> {
        let zone = DropZone::new()?;
        let from = zone.drop_file("report.csv", b"a,b,c\n1,2,3\n")?;
        let to = zone.outbox().join("report.csv");

        let relocation = Relocator::default().relocate(&from, &to)?;

        assert_eq!(relocation.strategy, RelocationStrategy::Rename);
        assert!(!from.exists());
        assert_eq!(fs::read(&to)?, b"a,b,c\n1,2,3\n");
        Ok(())
    }

    #[test]
    fn cross_device_relocation_copies_then_deletes() -> Result<()> {
        let zone = DropZone::new()?;
        let payload = vec![7_u8; 64 * 1024 + 3];
        let from = zone.drop_file("blob.bin", &payload)?;
        let to = zone.outbox().join("blob.bin");

        let relocation = Relocator::new(Arc::new(CrossDevice)).relocate(&from, &to)?;

        assert_eq!(relocation.strategy, RelocationStrategy::CopyThenDelete);
        assert_eq!(relocation.bytes_copied, payload.len() as u64);
        assert!(!from.exists());
        assert_eq!(fs::read(&to)?, payload);
        Ok(())
    }

    #[test]
    fn failed_source_removal_leaves_both_copies_and_retry_converges() -> Result<()> {
        let zone = DropZone::new()?;
        let from = zone.drop_file("ledger.txt", b"original bytes")?;
        let to = zone.outbox().join("ledger.txt");

        let err = Relocator::new(Arc::new(StuckSource))
            .relocate(&from, &to)
            .expect_err("source removal must fail");
        assert_eq!(err.stage(), Some(RelocateStage::RemoveSource));
        assert_eq!(fs::read(&from)?, b"original bytes");
        assert_eq!(fs::read(&to)?, b"original bytes");

        Relocator::new(Arc::new(CrossDevice)).relocate(&from, &to)?;
        assert!(!from.exists());
        assert_eq!(fs::read(&to)?, b"original bytes");
        Ok(())
    }

    #[test]
    fn missing_source_fails_at_open_stage() -> Result<()> {
        let zone = DropZone::new()?;
        let from = zone.inbox().join("ghost.txt");
        let to = zone.outbox().join("ghost.txt");

        let err = Relocator::new(Arc::new(CrossDevice))
            .relocate(&from, &to)
            .expect_err("missing source");
        assert_eq!(err.stage(), Some(RelocateStage::OpenSource));
        assert!(!to.exists());
        Ok(())
    }

    #[test]
    fn missing_destination_directory_fails_at_create_stage() -> Result<()> {
        let zone = DropZone::new()?;
        let from = zone.drop_file("orphan.txt", b"data")?;
        let to = zone.root().join("absent").join("orphan.txt");

        let err = Relocator::default()
            .relocate(&from, &to)
            .expect_err("destination directory is missing");
        assert_eq!(err.stage(), Some(RelocateStage::CreateDestination));
        assert!(from.exists());
        Ok(())
    }

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(RelocateStage::OpenSource.to_string(), "open_source");
        assert_eq!(RelocateStage::CreateDestination.as_str(), "create_destination");
        assert_eq!(RelocationStrategy::CopyThenDelete.as_str(), "copy_then_delete");
    }
}
