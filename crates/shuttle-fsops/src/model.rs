//! Domain models for the dispatch pipeline.
//!
//! # Design
//! - Requests carry an owned rule snapshot so spawned tasks need no borrows.
//! - Reports carry both endpoints plus the non-fatal command outcome.

use std::path::PathBuf;

use shuttle_config::WatchRule;
use uuid::Uuid;

use crate::command::CommandOutcome;
use crate::relocate::Relocation;

/// A file reported by a watch source together with the rule that governs it.
#[derive(Debug, Clone)]
pub struct DetectedFile {
    /// Absolute path of the new file.
    pub path: PathBuf,
    /// Rule governing the file.
    pub rule: WatchRule,
}

impl DetectedFile {
    /// Pair a path with its rule.
    #[must_use]
    pub const fn new(path: PathBuf, rule: WatchRule) -> Self {
        Self { path, rule }
    }

    /// Where this file is relocated to.
    #[must_use]
    pub fn destination(&self) -> PathBuf {
        self.rule.destination_for(&self.path)
    }
}

/// Summary of a successful dispatch.
#[derive(Debug)]
pub struct DispatchReport {
    /// Identifier carried by every log line and event of this dispatch.
    pub dispatch_id: Uuid,
    /// Original location.
    pub source: PathBuf,
    /// Final location.
    pub destination: PathBuf,
    /// Size observed when the file settled.
    pub size_bytes: u64,
    /// Command outcome, when the rule carries a command.
    pub command: Option<CommandOutcome>,
    /// How the bytes were moved.
    pub relocation: Relocation,
}
