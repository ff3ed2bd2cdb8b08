//! Dispatch pipeline for detected files.
//!
//! Each dispatch waits for its file to settle, runs the rule's command (whose
//! outcome never blocks the move), and relocates the file. Dispatches share no
//! state beyond the event bus and the health flag; many run at once, even for
//! the same directory, and none is retried.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shuttle_config::{RuleTable, Settings};
use shuttle_events::{Event, EventBus};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::command::run_command;
use crate::error::{FsOpsError, FsOpsResult};
use crate::model::{DetectedFile, DispatchReport};
use crate::quiescence::QuiescenceDetector;
use crate::relocate::{Relocation, Relocator};

const HEALTH_COMPONENT: &str = "dispatch";

/// Service executing the per-file pipeline.
#[derive(Clone)]
pub struct DispatchService {
    detector: QuiescenceDetector,
    relocator: Relocator,
    events: EventBus,
    health_degraded: Arc<Mutex<bool>>,
}

impl DispatchService {
    /// Construct a dispatcher publishing progress on `events`.
    #[must_use]
    pub fn new(detector: QuiescenceDetector, relocator: Relocator, events: EventBus) -> Self {
        Self {
            detector,
            relocator,
            events,
            health_degraded: Arc::new(Mutex::new(false)),
        }
    }

    /// Dispatcher over the local filesystem using the configured timings.
    #[must_use]
    pub fn from_settings(settings: &Settings, events: EventBus) -> Self {
        let detector =
            QuiescenceDetector::new(settings.sample_interval).with_limit(settings.stable_timeout);
        Self::new(detector, Relocator::default(), events)
    }

    /// Bus this service publishes on.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Dispatch `path` using the rule registered for its containing directory.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::NoRule`] when no rule covers the directory, and
    /// otherwise the first failure of the settle wait or relocation.
    pub async fn dispatch(&self, path: &Path, rules: &RuleTable) -> FsOpsResult<DispatchReport> {
        let rule = rules.resolve(path).cloned().ok_or_else(|| FsOpsError::NoRule {
            path: path.to_path_buf(),
        })?;
        self.dispatch_detected(DetectedFile::new(path.to_path_buf(), rule))
            .await
    }

    /// Dispatch a file whose rule is already known.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the settle wait or relocation.
    pub async fn dispatch_detected(&self, detected: DetectedFile) -> FsOpsResult<DispatchReport> {
        let dispatch_id = Uuid::new_v4();
        self.events.publish(Event::DispatchStarted {
            dispatch_id,
            path: detected.path.clone(),
        });

        match self.execute_pipeline(dispatch_id, &detected).await {
            Ok(report) => {
                self.mark_recovered();
                self.events.publish(Event::FileRelocated {
                    dispatch_id,
                    source: report.source.clone(),
                    destination: report.destination.clone(),
                    strategy: report.relocation.strategy.as_str().to_string(),
                });
                info!(
                    dispatch_id = %dispatch_id,
                    source = %report.source.display(),
                    destination = %report.destination.display(),
                    strategy = report.relocation.strategy.as_str(),
                    "file relocated"
                );
                Ok(report)
            }
            Err(err) => {
                let detail = describe(&err);
                self.mark_degraded(&detail);
                self.events.publish(Event::DispatchFailed {
                    dispatch_id,
                    path: detected.path.clone(),
                    message: detail,
                });
                Err(err)
            }
        }
    }

    /// Run [`DispatchService::dispatch`] and log a failure instead of returning it.
    pub async fn dispatch_logged(&self, path: &Path, rules: &RuleTable) {
        let result = self.dispatch(path, rules).await;
        log_outcome(path, result);
    }

    /// Run [`DispatchService::dispatch_logged`] on its own task.
    pub fn spawn_dispatch(&self, path: PathBuf, rules: Arc<RuleTable>) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move { service.dispatch_logged(&path, &rules).await })
    }

    /// Run [`DispatchService::dispatch_detected`] on its own task and log the outcome.
    pub fn spawn_detected(&self, detected: DetectedFile) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let path = detected.path.clone();
            let result = service.dispatch_detected(detected).await;
            log_outcome(&path, result);
        })
    }

    async fn execute_pipeline(
        &self,
        dispatch_id: Uuid,
        detected: &DetectedFile,
    ) -> FsOpsResult<DispatchReport> {
        let path = detected.path.as_path();
        let destination = detected.destination();

        let size_bytes = self.detector.wait_until_stable(path).await?;
        self.events.publish(Event::FileStable {
            dispatch_id,
            path: path.to_path_buf(),
            size_bytes,
        });

        let command = match &detected.rule.command {
            Some(template) => {
                let outcome = run_command(template, path).await;
                if !outcome.is_success() {
                    warn!(
                        dispatch_id = %dispatch_id,
                        path = %path.display(),
                        command = template.as_str(),
                        outcome = ?outcome,
                        "command did not succeed; relocating anyway"
                    );
                }
                self.events.publish(Event::CommandFinished {
                    dispatch_id,
                    command: template.as_str().to_string(),
                    status: outcome.status(),
                });
                Some(outcome)
            }
            None => None,
        };

        let relocation = self.relocate_blocking(path, &destination).await?;

        Ok(DispatchReport {
            dispatch_id,
            source: path.to_path_buf(),
            destination,
            size_bytes,
            command,
            relocation,
        })
    }

    async fn relocate_blocking(&self, from: &Path, to: &Path) -> FsOpsResult<Relocation> {
        let relocator = self.relocator.clone();
        let from = from.to_path_buf();
        let to = to.to_path_buf();
        tokio::task::spawn_blocking(move || relocator.relocate(&from, &to))
            .await
            .map_err(|source| FsOpsError::Join {
                operation: "relocate",
                source,
            })?
    }

    fn mark_degraded(&self, detail: &str) {
        let mut guard = self.lock_health_flag();
        if *guard {
            drop(guard);
            warn!(
                component = HEALTH_COMPONENT,
                detail = detail,
                "dispatch pipeline still degraded"
            );
        } else {
            *guard = true;
            drop(guard);
            warn!(
                component = HEALTH_COMPONENT,
                detail = detail,
                "dispatch pipeline degraded"
            );
            self.events.publish(Event::HealthChanged {
                degraded: vec![HEALTH_COMPONENT.to_string()],
            });
        }
    }

    fn mark_recovered(&self) {
        let mut guard = self.lock_health_flag();
        if std::mem::take(&mut *guard) {
            drop(guard);
            self.events.publish(Event::HealthChanged { degraded: vec![] });
            info!(component = HEALTH_COMPONENT, "dispatch pipeline recovered");
        }
    }

    fn lock_health_flag(&self) -> MutexGuard<'_, bool> {
        self.health_degraded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn describe(err: &FsOpsError) -> String {
    match err {
        FsOpsError::Relocate {
            stage, from, to, ..
        } => format!(
            "{err} at {stage}: {} -> {}",
            from.display(),
            to.display()
        ),
        FsOpsError::StabilityTimeout { path, waited } => {
            format!("{err} after {waited:?}: {}", path.display())
        }
        FsOpsError::NoRule { path } => format!("{err}: {}", path.display()),
        FsOpsError::Join { operation, .. } => format!("{err} during {operation}"),
    }
}

fn log_outcome(path: &Path, result: FsOpsResult<DispatchReport>) {
    if let Err(err) = result {
        if let FsOpsError::Relocate {
            stage: crate::relocate::RelocateStage::RemoveSource,
            to,
            ..
        } = &err
        {
            warn!(
                path = %path.display(),
                destination = %to.display(),
                "source and destination both exist after a partial relocation"
            );
        }
        error!(
            path = %path.display(),
            error = ?err,
            "dispatch failed"
        );
    }
}
