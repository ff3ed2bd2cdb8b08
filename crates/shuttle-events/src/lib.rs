//! In-process event bus for file arrival and dispatch lifecycle.
//!
//! Watch sources and the dispatcher publish typed events; subscribers receive
//! them in publish order over a bounded `tokio::broadcast` channel. A replay
//! ring of the same size lets a late subscriber resume after a known id.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

/// Sequence number assigned on publish.
pub type EventId = u64;

const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Which watch source noticed a file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetectionOrigin {
    /// Native filesystem notification.
    Notify,
    /// Snapshot diff on a polled share.
    Poll,
}

/// How the optional pre-relocation command ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandStatus {
    /// Exited with status zero.
    Succeeded,
    /// Exited non-zero or was killed by a signal (`code` is `None`).
    Failed {
        /// Exit code, when the platform reported one.
        code: Option<i32>,
    },
    /// Could not be started at all.
    LaunchFailed {
        /// Launch error text.
        message: String,
    },
}

/// Typed domain events surfaced across the system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A watch source reported a new file.
    FileDetected {
        /// Detected path.
        path: PathBuf,
        /// Source that noticed it.
        origin: DetectionOrigin,
    },
    /// A dispatch began for a detected file.
    DispatchStarted {
        /// Identifier shared by every event of this dispatch.
        dispatch_id: Uuid,
        /// File being dispatched.
        path: PathBuf,
    },
    /// The file stopped changing size.
    FileStable {
        /// Dispatch identifier.
        dispatch_id: Uuid,
        /// File that settled.
        path: PathBuf,
        /// Last observed size.
        size_bytes: u64,
    },
    /// The configured command finished (successfully or not).
    CommandFinished {
        /// Dispatch identifier.
        dispatch_id: Uuid,
        /// Command template as configured.
        command: String,
        /// Exit classification.
        status: CommandStatus,
    },
    /// The file reached its destination.
    FileRelocated {
        /// Dispatch identifier.
        dispatch_id: Uuid,
        /// Original path.
        source: PathBuf,
        /// Final path.
        destination: PathBuf,
        /// `rename` or `copy_then_delete`.
        strategy: String,
    },
    /// The dispatch stopped before relocation completed.
    DispatchFailed {
        /// Dispatch identifier.
        dispatch_id: Uuid,
        /// File that was being dispatched.
        path: PathBuf,
        /// Failure description.
        message: String,
    },
    /// A watch source hit an error it will keep running through.
    WatchError {
        /// Directory the source was observing, when known.
        path: Option<PathBuf>,
        /// Failure description.
        message: String,
    },
    /// The set of degraded components changed.
    HealthChanged {
        /// Components currently degraded; empty when healthy.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::FileDetected { .. } => "file_detected",
            Self::DispatchStarted { .. } => "dispatch_started",
            Self::FileStable { .. } => "file_stable",
            Self::CommandFinished { .. } => "command_finished",
            Self::FileRelocated { .. } => "file_relocated",
            Self::DispatchFailed { .. } => "dispatch_failed",
            Self::WatchError { .. } => "watch_error",
            Self::HealthChanged { .. } => "health_changed",
        }
    }

    /// Dispatch the event belongs to, if any.
    #[must_use]
    pub const fn dispatch_id(&self) -> Option<Uuid> {
        match self {
            Self::DispatchStarted { dispatch_id, .. }
            | Self::FileStable { dispatch_id, .. }
            | Self::CommandFinished { dispatch_id, .. }
            | Self::FileRelocated { dispatch_id, .. }
            | Self::DispatchFailed { dispatch_id, .. } => Some(*dispatch_id),
            Self::FileDetected { .. } | Self::WatchError { .. } | Self::HealthChanged { .. } => {
                None
            }
        }
    }
}

/// An event stamped with its sequence number and publish time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequence number, starting at 1.
    pub id: EventId,
    /// Publish time.
    pub timestamp: DateTime<Utc>,
    /// Payload.
    pub event: Event,
}

/// Most recent envelopes, oldest first.
#[derive(Debug)]
struct ReplayRing {
    entries: VecDeque<EventEnvelope>,
    capacity: usize,
}

impl ReplayRing {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, envelope: EventEnvelope) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(envelope);
    }

    fn after(&self, since: EventId) -> VecDeque<EventEnvelope> {
        self.entries
            .iter()
            .filter(|envelope| envelope.id > since)
            .cloned()
            .collect()
    }
}

/// Cloneable handle to the process event bus.
///
/// Publishing never blocks and never fails. Slow subscribers skip the events
/// they lagged behind on rather than holding publishers up.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    ring: Arc<Mutex<ReplayRing>>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Bus whose live channel and replay ring both hold `capacity` events
    /// (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            ring: Arc::new(Mutex::new(ReplayRing::new(capacity))),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Stamp and broadcast `event`, returning its sequence number.
    pub fn publish(&self, event: Event) -> EventId {
        let envelope = EventEnvelope {
            id: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: Utc::now(),
            event,
        };
        let id = envelope.id;
        self.ring().push(envelope.clone());
        // No receivers is not an error; the ring still keeps the event.
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to live events. With `since_id`, ring entries newer than it are
    /// delivered first.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let receiver = self.sender.subscribe();
        let backlog = since_id
            .map(|since| self.ring().after(since))
            .unwrap_or_default();
        EventStream { backlog, receiver }
    }

    fn ring(&self) -> MutexGuard<'_, ReplayRing> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`EventBus::subscribe`].
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: broadcast::Receiver<EventEnvelope>,
}

impl EventStream {
    /// Next event, or `None` once every bus handle is gone.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(envelope) = self.backlog.pop_front() {
            return Some(envelope);
        }
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
