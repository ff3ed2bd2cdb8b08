//! Validation helpers and path normalisation for configuration documents.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{CommandTemplate, WatchRule};

/// Lexically normalise a path: drop trailing separators and `.` components.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.components().collect()
}

pub(crate) fn absolute_dir(section: &str, field: &'static str, value: &str) -> ConfigResult<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(section, field, None, "empty"));
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(ConfigError::invalid(
            section,
            field,
            Some(trimmed.to_owned()),
            "not_absolute",
        ));
    }
    Ok(normalize_path(path))
}

pub(crate) fn command(section: &str, value: Option<&str>) -> ConfigResult<Option<CommandTemplate>> {
    value.map_or(Ok(None), |raw| {
        CommandTemplate::parse(raw)
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(section, "command", Some(raw.to_owned()), "blank"))
    })
}

pub(crate) fn positive_millis(section: &str, field: &'static str, value: u64) -> ConfigResult<Duration> {
    if value == 0 {
        return Err(ConfigError::invalid(
            section,
            field,
            Some(value.to_string()),
            "must_be_positive",
        ));
    }
    Ok(Duration::from_millis(value))
}

pub(crate) fn unique_sources(rules: &[WatchRule]) -> ConfigResult<()> {
    let mut seen = HashSet::with_capacity(rules.len());
    for rule in rules {
        if !seen.insert(rule.source_dir.as_path()) {
            return Err(ConfigError::invalid(
                "folders",
                "source",
                Some(rule.source_dir.display().to_string()),
                "duplicate",
            ));
        }
    }
    Ok(())
}
