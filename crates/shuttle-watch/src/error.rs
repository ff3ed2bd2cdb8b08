//! Error types for watch sources.
//!
//! # Design
//! - Only `WatcherInit` is fatal; subscribe and enumerate failures are reported
//!   and the source carries on.
//! - Constant messages with the directory involved as context.

use std::path::PathBuf;

use thiserror::Error;

pub use notify::Error as NotifyError;

/// Result alias for watch operations.
pub type WatchResult<T> = Result<T, WatchError>;

/// Errors produced by the local and share watch sources.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The native watcher could not be constructed.
    #[error("failed to initialise filesystem watcher")]
    WatcherInit {
        /// Source notify error.
        source: NotifyError,
    },
    /// A directory could not be subscribed to.
    #[error("failed to watch directory")]
    Subscribe {
        /// Directory that was skipped.
        path: PathBuf,
        /// Source notify error.
        source: NotifyError,
    },
    /// A shared directory could not be enumerated.
    #[error("failed to enumerate directory")]
    Enumerate {
        /// Directory being enumerated.
        path: PathBuf,
        /// Source walk error.
        source: walkdir::Error,
    },
    /// The blocking enumeration worker panicked or was cancelled.
    #[error("enumeration task failed")]
    Join {
        /// Directory being enumerated.
        path: PathBuf,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
}

impl WatchError {
    /// Directory the error concerns, when there is one.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::WatcherInit { .. } => None,
            Self::Subscribe { path, .. } | Self::Enumerate { path, .. } | Self::Join { path, .. } => {
                Some(path)
            }
        }
    }
}
