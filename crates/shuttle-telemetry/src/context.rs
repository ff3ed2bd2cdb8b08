//! Process-wide span carrying the run mode and build identifier.

use tracing::span::EnteredSpan;

use crate::init::build_sha;

/// Keeps the `app` span entered until dropped.
///
/// Hold it in the task that drives the process; spans entered on one thread do
/// not follow work spawned onto other workers.
pub struct GlobalContextGuard {
    _span: EnteredSpan,
}

impl GlobalContextGuard {
    /// Enter the `app` span tagged with `mode`.
    #[must_use]
    pub fn new(mode: impl Into<String>) -> Self {
        let mode = mode.into();
        let span = tracing::info_span!("app", mode = %mode, build_sha = %build_sha());
        Self {
            _span: span.entered(),
        }
    }
}
