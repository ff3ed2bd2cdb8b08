//! # Design
//!
//! - Provide structured, constant-message errors for the dispatch pipeline.
//! - Capture operation context (paths, stage) so a failed dispatch can be diagnosed from its log line.
//! - Preserve source errors without interpolating context into error messages.
//! - A failing external command is not an error; see `CommandOutcome`.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::relocate::RelocateStage;

/// Result type for dispatch operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced while dispatching a detected file.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// No rule is configured for the file's containing directory.
    #[error("no watch rule for detected file")]
    NoRule {
        /// Detected file.
        path: PathBuf,
    },
    /// The file kept changing size past the configured bound.
    #[error("file did not settle in time")]
    StabilityTimeout {
        /// File being watched.
        path: PathBuf,
        /// Bound that elapsed.
        waited: Duration,
    },
    /// Rename and the copy fallback failed at `stage`.
    #[error("relocation failed")]
    Relocate {
        /// Stage that failed.
        stage: RelocateStage,
        /// Source path.
        from: PathBuf,
        /// Destination path.
        to: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A blocking worker panicked or was cancelled.
    #[error("blocking task failed")]
    Join {
        /// Operation that ran on the blocking pool.
        operation: &'static str,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
}

impl FsOpsError {
    pub(crate) fn relocate(
        stage: RelocateStage,
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::Relocate {
            stage,
            from: from.into(),
            to: to.into(),
            source,
        }
    }

    /// Stage name for relocation failures; `None` for every other variant.
    #[must_use]
    pub const fn stage(&self) -> Option<RelocateStage> {
        match self {
            Self::Relocate { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
