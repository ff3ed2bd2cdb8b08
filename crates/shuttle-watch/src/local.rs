//! Native notification source for local folders.
//!
//! One `notify` watcher subscribes non-recursively to every local source
//! directory and forwards raw events onto a single channel. A single loop turns
//! creations into dispatch tasks without waiting on them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event as NotifyEvent, RecommendedWatcher, RecursiveMode, Watcher};
use shuttle_config::RuleTable;
use shuttle_events::{DetectionOrigin, Event, EventBus};
use shuttle_fsops::DispatchService;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{WatchError, WatchResult};

const CHANNEL_CAPACITY: usize = 1024;

enum WatchMessage {
    Event(NotifyEvent),
    Error(notify::Error),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("path_count", &event.paths.len())
                .finish(),
            Self::Error(error) => f
                .debug_struct("WatchMessage::Error")
                .field("error", error)
                .finish(),
        }
    }
}

/// Watches every local rule's source directory and dispatches new files.
pub struct LocalWatchSource {
    watcher: RecommendedWatcher,
    rx: mpsc::Receiver<WatchMessage>,
    rules: Arc<RuleTable>,
    dispatcher: DispatchService,
    watched: Vec<PathBuf>,
}

impl fmt::Debug for LocalWatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWatchSource")
            .field("watched", &self.watched)
            .finish_non_exhaustive()
    }
}

impl LocalWatchSource {
    /// Build the watcher and subscribe to each directory in `rules`.
    ///
    /// A directory that cannot be subscribed is logged, published as a
    /// [`Event::WatchError`], and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::WatcherInit`] when the native watcher cannot be
    /// constructed at all.
    pub fn start(rules: Arc<RuleTable>, dispatcher: DispatchService) -> WatchResult<Self> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<NotifyEvent>| {
                let message = match result {
                    Ok(event) => WatchMessage::Event(event),
                    Err(error) => WatchMessage::Error(error),
                };
                if let Err(err) = tx.blocking_send(message) {
                    warn!(message = ?err.0, "watch channel closed; dropping notification");
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|source| WatchError::WatcherInit { source })?;

        let mut watched = Vec::with_capacity(rules.len());
        for rule in rules.iter() {
            match watcher.watch(&rule.source_dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    info!(source = %rule.source_dir.display(), "watching local folder");
                    watched.push(rule.source_dir.clone());
                }
                Err(source) => {
                    let err = WatchError::Subscribe {
                        path: rule.source_dir.clone(),
                        source,
                    };
                    report(dispatcher.events(), &err);
                }
            }
        }

        Ok(Self {
            watcher,
            rx,
            rules,
            dispatcher,
            watched,
        })
    }

    /// Directories that were subscribed successfully.
    #[must_use]
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Receive notifications until the channel closes.
    pub async fn run(self) {
        let Self {
            watcher,
            rx,
            rules,
            dispatcher,
            ..
        } = self;
        let _watcher = watcher;
        pump(rx, &rules, &dispatcher).await;
        info!("local watch channel closed");
    }

    /// Run the loop on its own task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

async fn pump(
    mut rx: mpsc::Receiver<WatchMessage>,
    rules: &Arc<RuleTable>,
    dispatcher: &DispatchService,
) {
    while let Some(message) = rx.recv().await {
        match message {
            WatchMessage::Event(event) => {
                for path in created_paths(&event) {
                    spawn_detection(dispatcher.clone(), Arc::clone(rules), path);
                }
            }
            WatchMessage::Error(error) => {
                let path = error.paths.first().cloned();
                error!(path = ?path, error = %error, "filesystem watcher error");
                dispatcher.events().publish(Event::WatchError {
                    path,
                    message: error.to_string(),
                });
            }
        }
    }
}

/// Skip new directories, then dispatch on a task of its own.
fn spawn_detection(dispatcher: DispatchService, rules: Arc<RuleTable>, path: PathBuf) {
    drop(tokio::spawn(async move {
        if tokio::fs::metadata(&path)
            .await
            .is_ok_and(|meta| meta.is_dir())
        {
            debug!(path = %path.display(), "ignoring new directory");
            return;
        }
        debug!(path = %path.display(), "file created");
        dispatcher.events().publish(Event::FileDetected {
            path: path.clone(),
            origin: DetectionOrigin::Notify,
        });
        dispatcher.dispatch_logged(&path, &rules).await;
    }));
}

/// Paths that appeared under their final name.
///
/// A rename within a watched folder also reports a `To` half, so the combined
/// `Both` notification is not counted again.
fn created_paths(event: &NotifyEvent) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.clone()
        }
        _ => Vec::new(),
    }
}

fn report(events: &EventBus, err: &WatchError) {
    let path = err.path().map(Path::to_path_buf);
    error!(path = ?path, error = ?err, "watch source degraded");
    events.publish(Event::WatchError {
        path,
        message: err.to_string(),
    });
}
