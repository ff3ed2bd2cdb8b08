//! Configuration discovery and YAML parsing.
//!
//! # Design
//! - The packaged document lives next to the executable (`conf/conf.yml`);
//!   `SHUTTLE_CONFIG` points elsewhere for development and tests.
//! - Raw serde structs are validated into immutable models before anything
//!   else sees them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::defaults::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{LogFormatPreference, Settings, WatchConfig, WatchRule};
use crate::validate;

/// Environment variable that overrides the configuration location.
pub const CONFIG_ENV: &str = "SHUTTLE_CONFIG";

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    folders: Vec<RawFolder>,
    #[serde(default)]
    settings: RawSettings,
}

#[derive(Debug, Deserialize)]
struct RawFolder {
    source: String,
    destination: String,
    #[serde(default)]
    is_share: bool,
    #[serde(default)]
    command: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    poll_interval_ms: Option<u64>,
    sample_interval_ms: Option<u64>,
    stable_timeout_secs: Option<u64>,
    log_level: Option<String>,
    log_format: Option<LogFormatPreference>,
}

/// Location of the configuration document.
///
/// # Errors
///
/// Returns an error if the override is unset and the executable path cannot be resolved.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let executable = std::env::current_exe().map_err(|source| ConfigError::Executable { source })?;
    let dir = executable.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Read and validate the configuration document at `path`.
///
/// # Errors
///
/// Returns an error when the file cannot be read, is not valid YAML, or fails validation.
pub fn load_from_path(path: &Path) -> ConfigResult<WatchConfig> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.read",
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_document(&contents, path)?;
    info!(
        path = %path.display(),
        local = config.local.len(),
        shared = config.shared.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Parse and validate a configuration document; `origin` is only used for error context.
///
/// # Errors
///
/// Returns an error when the document is not valid YAML or fails validation.
pub fn parse_document(contents: &str, origin: &Path) -> ConfigResult<WatchConfig> {
    let raw: RawDocument = serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;

    if raw.folders.is_empty() {
        return Err(ConfigError::invalid("folders", "folders", None, "empty"));
    }

    let rules = raw
        .folders
        .iter()
        .enumerate()
        .map(|(index, folder)| build_rule(index, folder))
        .collect::<ConfigResult<Vec<_>>>()?;
    validate::unique_sources(&rules)?;
    warn_missing_destinations(&rules);

    let settings = build_settings(raw.settings)?;
    Ok(WatchConfig::from_rules(rules, settings))
}

fn build_rule(index: usize, folder: &RawFolder) -> ConfigResult<WatchRule> {
    let section = format!("folders[{index}]");
    Ok(WatchRule {
        source_dir: validate::absolute_dir(&section, "source", &folder.source)?,
        destination_dir: validate::absolute_dir(&section, "destination", &folder.destination)?,
        is_share: folder.is_share,
        command: validate::command(&section, folder.command.as_deref())?,
    })
}

fn build_settings(raw: RawSettings) -> ConfigResult<Settings> {
    let mut settings = Settings::default();
    if let Some(value) = raw.poll_interval_ms {
        settings.poll_interval = validate::positive_millis("settings", "poll_interval_ms", value)?;
    }
    if let Some(value) = raw.sample_interval_ms {
        settings.sample_interval =
            validate::positive_millis("settings", "sample_interval_ms", value)?;
    }
    if let Some(secs) = raw.stable_timeout_secs {
        settings.stable_timeout = Some(
            validate::positive_millis("settings", "stable_timeout_secs", secs.saturating_mul(1_000))?,
        );
    }
    if let Some(level) = raw.log_level.filter(|level| !level.trim().is_empty()) {
        settings.log_level = level.trim().to_owned();
    }
    settings.log_format = raw.log_format;
    Ok(settings)
}

fn warn_missing_destinations(rules: &[WatchRule]) {
    for rule in rules.iter().filter(|rule| !rule.destination_dir.is_dir()) {
        warn!(
            source = %rule.source_dir.display(),
            destination = %rule.destination_dir.display(),
            "destination directory does not exist; relocations for this folder will fail until it is created"
        );
    }
}
