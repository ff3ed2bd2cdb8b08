//! Polling source for shared folders where native notifications are unreliable.
//!
//! Each shared rule gets its own task that owns its snapshot. A failed
//! enumeration skips the cycle and keeps the previous snapshot, so files that
//! appeared meanwhile are reported on the next successful cycle.

use std::path::PathBuf;
use std::time::Duration;

use shuttle_config::{RuleTable, WatchRule};
use shuttle_events::{DetectionOrigin, Event};
use shuttle_fsops::{DetectedFile, DispatchService};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{WatchError, WatchResult};
use crate::snapshot::DirectorySnapshot;

/// Snapshot-diff poller for one shared folder.
#[derive(Debug)]
pub struct SharePoller {
    rule: WatchRule,
    previous: DirectorySnapshot,
}

impl SharePoller {
    /// Poller starting from an initial snapshot of the rule's source directory.
    ///
    /// An unreadable directory starts from an empty snapshot, so everything
    /// found once it becomes readable is reported as new.
    pub async fn start(rule: WatchRule) -> Self {
        let previous = match snapshot(&rule.source_dir).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(
                    source = %rule.source_dir.display(),
                    error = ?err,
                    "initial snapshot failed; starting empty"
                );
                DirectorySnapshot::default()
            }
        };
        Self::with_snapshot(rule, previous)
    }

    /// Poller starting from a known snapshot.
    #[must_use]
    pub const fn with_snapshot(rule: WatchRule, previous: DirectorySnapshot) -> Self {
        Self { rule, previous }
    }

    /// Take a fresh snapshot, return the paths that appeared since the last
    /// successful cycle, and keep the fresh snapshot for the next one.
    ///
    /// # Errors
    ///
    /// Returns the enumeration failure; the previous snapshot is kept.
    pub async fn cycle(&mut self) -> WatchResult<Vec<PathBuf>> {
        let current = snapshot(&self.rule.source_dir).await?;
        let added = current.new_paths(&self.previous);
        self.previous = current;
        Ok(added)
    }

    /// Poll every `interval`, spawning a dispatch for each new file.
    pub async fn run(mut self, interval: Duration, dispatcher: DispatchService) {
        info!(
            source = %self.rule.source_dir.display(),
            interval_ms = interval.as_millis(),
            files = self.previous.len(),
            "polling shared folder"
        );
        loop {
            tokio::time::sleep(interval).await;
            match self.cycle().await {
                Ok(added) => {
                    for path in added {
                        let size = self.previous.get(&path).map(|meta| meta.size);
                        debug!(path = %path.display(), size = ?size, "new file on share");
                        dispatcher.events().publish(Event::FileDetected {
                            path: path.clone(),
                            origin: DetectionOrigin::Poll,
                        });
                        drop(dispatcher.spawn_detected(DetectedFile::new(path, self.rule.clone())));
                    }
                }
                Err(err) => {
                    error!(
                        source = %self.rule.source_dir.display(),
                        error = ?err,
                        "share enumeration failed; skipping cycle"
                    );
                    dispatcher.events().publish(Event::WatchError {
                        path: Some(self.rule.source_dir.clone()),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

/// Spawn one polling task per shared rule.
pub fn spawn_share_sources(
    rules: &RuleTable,
    interval: Duration,
    dispatcher: &DispatchService,
) -> Vec<JoinHandle<()>> {
    rules
        .iter()
        .cloned()
        .map(|rule| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                SharePoller::start(rule).await.run(interval, dispatcher).await;
            })
        })
        .collect()
}

async fn snapshot(dir: &std::path::Path) -> WatchResult<DirectorySnapshot> {
    let dir = dir.to_path_buf();
    let path = dir.clone();
    tokio::task::spawn_blocking(move || DirectorySnapshot::capture(&dir))
        .await
        .map_err(|source| WatchError::Join { path, source })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use shuttle_test_support::fixtures::DropZone;
    use std::fs;

    fn share_rule(zone: &DropZone) -> WatchRule {
        WatchRule {
            source_dir: zone.inbox().to_path_buf(),
            destination_dir: zone.outbox().to_path_buf(),
            is_share: true,
            command: None,
        }
    }

    #[tokio::test]
    async fn new_file_is_reported_once_on_the_following_cycle() -> Result<()> {
        let zone = DropZone::new()?;
        zone.drop_file("a", b"a")?;
        zone.drop_file("b", b"b")?;
        let mut poller = SharePoller::start(share_rule(&zone)).await;

        assert!(poller.cycle().await?.is_empty());
        let c = zone.drop_file("c", b"c")?;
        assert_eq!(poller.cycle().await?, vec![c]);
        assert!(poller.cycle().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn failed_cycle_keeps_previous_snapshot() -> Result<()> {
        let zone = DropZone::new()?;
        zone.drop_file("a", b"a")?;
        let mut poller = SharePoller::start(share_rule(&zone)).await;

        let parked = zone.root().join("parked");
        fs::rename(zone.inbox(), &parked)?;
        assert!(matches!(
            poller.cycle().await,
            Err(WatchError::Enumerate { .. })
        ));

        fs::rename(&parked, zone.inbox())?;
        let late = zone.drop_file("late", b"late")?;
        assert_eq!(poller.cycle().await?, vec![late]);
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_start_treats_everything_as_new() -> Result<()> {
        let zone = DropZone::new()?;
        let parked = zone.root().join("parked");
        fs::rename(zone.inbox(), &parked)?;
        let mut poller = SharePoller::start(share_rule(&zone)).await;

        fs::rename(&parked, zone.inbox())?;
        let nested = zone.drop_file("sub/dir/deep.txt", b"deep")?;
        assert_eq!(poller.cycle().await?, vec![nested]);
        Ok(())
    }
}
