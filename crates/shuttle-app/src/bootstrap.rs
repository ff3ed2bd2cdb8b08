use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use shuttle_config::{LogFormatPreference, WatchConfig, default_config_path, load_from_path};
use shuttle_events::EventBus;
use shuttle_fsops::DispatchService;
use shuttle_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, init_logging};
use shuttle_watch::{LocalWatchSource, spawn_share_sources};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// Environment variable carrying the build identifier recorded in logs.
pub const BUILD_SHA_ENV: &str = "SHUTTLE_BUILD_SHA";

/// Everything the watch sources need, resolved before any task starts.
pub struct BootstrapDependencies {
    config: WatchConfig,
    events: EventBus,
}

impl BootstrapDependencies {
    /// Wrap an already-loaded configuration.
    #[must_use]
    pub const fn new(config: WatchConfig, events: EventBus) -> Self {
        Self { config, events }
    }

    /// Locate and load the configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be located, read, or validated.
    pub fn from_env() -> AppResult<(Self, PathBuf)> {
        let path = default_config_path().map_err(|err| AppError::config("config.locate", err))?;
        let config = load_from_path(&path).map_err(|err| AppError::config("config.load", err))?;
        Ok((Self::new(config, EventBus::new()), path))
    }
}

/// Entry point for the Shuttle boot sequence.
///
/// # Errors
///
/// Returns an error if configuration loading, logging setup, or watcher
/// construction fails.
pub async fn run_app() -> AppResult<()> {
    let (dependencies, config_path) = BootstrapDependencies::from_env()?;

    let build_sha = std::env::var(BUILD_SHA_ENV).unwrap_or_else(|_| "dev".to_string());
    let settings = &dependencies.config.settings;
    let logging = LoggingConfig {
        level: &settings.log_level,
        format: settings.log_format.map_or_else(LogFormat::infer, log_format),
        build_sha: &build_sha,
    };
    init_logging(&logging).map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("watch");

    info!(config = %config_path.display(), "Shuttle bootstrap starting");
    run_app_with(dependencies, shutdown_signal()).await
}

/// Start every watch source, run until `shutdown` resolves, then stop them.
///
/// In-flight dispatches are abandoned on shutdown.
///
/// # Errors
///
/// Returns an error if the native watcher cannot be constructed or `shutdown`
/// itself fails.
pub async fn run_app_with<F>(dependencies: BootstrapDependencies, shutdown: F) -> AppResult<()>
where
    F: Future<Output = AppResult<()>>,
{
    let BootstrapDependencies { config, events } = dependencies;
    info!(rules = config.rule_count(), "configuration loaded");
    let WatchConfig {
        local,
        shared,
        settings,
    } = config;

    for rule in local.iter().chain(shared.iter()) {
        info!(
            source = %rule.source_dir.display(),
            destination = %rule.destination_dir.display(),
            share = rule.is_share,
            command = rule.command.as_ref().map(|command| command.as_str()),
            "folder rule"
        );
    }

    let dispatcher = DispatchService::from_settings(&settings, events);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if local.is_empty() {
        info!("no local folders configured");
    } else {
        let source = LocalWatchSource::start(Arc::new(local), dispatcher.clone())
            .map_err(|err| AppError::watch("local_source.start", err))?;
        tasks.push(source.spawn());
    }
    tasks.extend(spawn_share_sources(
        &shared,
        settings.poll_interval,
        &dispatcher,
    ));

    info!(sources = tasks.len(), "watch sources running");
    let outcome = shutdown.await;
    info!("shutdown requested; stopping watch sources");

    for task in tasks {
        task.abort();
        match task.await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => {}
            Err(err) => warn!(error = %err, "watch source task join failed"),
        }
    }
    outcome
}

/// Resolve on Ctrl-C, or on SIGTERM where the platform has it.
#[cfg(unix)]
async fn shutdown_signal() -> AppResult<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).map_err(|source| AppError::Signal { source })?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map_err(|source| AppError::Signal { source }),
        _ = terminate.recv() => {
            info!("SIGTERM received");
            Ok(())
        }
    }
}

/// Resolve on Ctrl-C.
#[cfg(not(unix))]
async fn shutdown_signal() -> AppResult<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|source| AppError::Signal { source })
}

const fn log_format(preference: LogFormatPreference) -> LogFormat {
    match preference {
        LogFormatPreference::Pretty => LogFormat::Pretty,
        LogFormatPreference::Json => LogFormat::Json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_maps_each_preference() {
        assert_eq!(log_format(LogFormatPreference::Json), LogFormat::Json);
        assert_eq!(log_format(LogFormatPreference::Pretty), LogFormat::Pretty);
    }

    #[tokio::test]
    async fn empty_configuration_returns_when_shutdown_resolves() -> AppResult<()> {
        let dependencies = BootstrapDependencies::new(WatchConfig::default(), EventBus::new());
        run_app_with(dependencies, async { Ok(()) }).await
    }

    #[tokio::test]
    async fn shutdown_signal_waits_for_a_signal() {
        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(50), shutdown_signal()).await;
        assert!(pending.is_err());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sigterm_resolves_shutdown() -> anyhow::Result<()> {
        let waiter = tokio::spawn(shutdown_signal());
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()?;
        assert!(status.success());

        tokio::time::timeout(std::time::Duration::from_secs(5), waiter).await???;
        Ok(())
    }
}
