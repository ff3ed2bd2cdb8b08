//! # Design
//!
//! - Centralize errors that abort startup.
//! - Keep error messages constant while carrying the failed operation as context.
//! - Runtime dispatch and watch failures never surface here; they are logged
//!   where they happen.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be located or loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: shuttle_config::ConfigError,
    },
    /// Logging could not be initialised.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: shuttle_telemetry::TelemetryError,
    },
    /// A watch source could not be started.
    #[error("watch source failed to start")]
    Watch {
        /// Operation identifier.
        operation: &'static str,
        /// Source watch error.
        source: shuttle_watch::WatchError,
    },
    /// Waiting for the shutdown signal failed.
    #[error("shutdown signal unavailable")]
    Signal {
        /// Source IO error.
        source: std::io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: shuttle_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: shuttle_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn watch(operation: &'static str, source: shuttle_watch::WatchError) -> Self {
        Self::Watch { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "config.load",
            shuttle_config::ConfigError::Io {
                operation: "read",
                path: PathBuf::from("/etc/shuttle/conf.yml"),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert!(matches!(
            config,
            AppError::Config {
                operation: "config.load",
                ..
            }
        ));
        assert_eq!(config.to_string(), "configuration operation failed");

        let watch = AppError::watch(
            "local_source.start",
            shuttle_watch::WatchError::WatcherInit {
                source: notify_error(),
            },
        );
        assert!(matches!(watch, AppError::Watch { .. }));
    }

    fn notify_error() -> shuttle_watch::error::NotifyError {
        shuttle_watch::error::NotifyError::generic("inotify unavailable")
    }
}
