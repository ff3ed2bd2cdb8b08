//! Subscriber installation.
//!
//! `RUST_LOG`, when set and valid, replaces the configured level entirely.
//! The build identifier is recorded on first installation and never changes.

use once_cell::sync::OnceCell;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::error::{Result, TelemetryError};

static BUILD_SHA: OnceCell<String> = OnceCell::new();

/// Inputs for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Filter directive, usually a bare level such as `info`.
    pub level: &'a str,
    /// Rendering of each line.
    pub format: LogFormat,
    /// Build identifier attached to the application span.
    pub build_sha: &'a str,
}

/// Output rendering for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable text.
    Pretty,
}

impl LogFormat {
    /// Pretty in debug builds, JSON in release builds.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    fn layer(self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer().with_target(false).with_thread_ids(false);
        match self {
            Self::Json => base.json().boxed(),
            Self::Pretty => base.boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] when `config.level` is not a valid
/// directive (and `RUST_LOG` is unset), and
/// [`TelemetryError::SubscriberInstall`] when a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    BUILD_SHA.get_or_init(|| config.build_sha.to_owned());

    let filter = env_filter(config.level)?;
    tracing_subscriber::registry()
        .with(config.format.layer())
        .with(filter)
        .try_init()
        .map_err(|source| TelemetryError::SubscriberInstall { source })
}

/// Build identifier recorded by [`init_logging`]; `dev` before installation.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().map_or("dev", String::as_str)
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(level).map_err(|source| TelemetryError::InvalidFilter {
            directive: level.to_owned(),
            source,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_level_is_rejected_when_rust_log_is_unset() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let Err(err) = env_filter("shuttle=loud") else {
            panic!("level name must be rejected");
        };
        assert!(matches!(
            err,
            TelemetryError::InvalidFilter { ref directive, .. } if directive == "shuttle=loud"
        ));
    }

    #[test]
    fn second_installation_is_rejected() {
        let config = LoggingConfig {
            level: "debug",
            format: LogFormat::Json,
            build_sha: "abc123",
        };
        let _ = init_logging(&config);
        let second = init_logging(&config);

        assert!(matches!(second, Err(TelemetryError::SubscriberInstall { .. })));
        assert!(!build_sha().is_empty());
    }
}
