//! Typed configuration models.
//!
//! # Design
//! - Pure data carriers; everything here is immutable once loaded.
//! - Rule tables are keyed by the normalised source directory so lookups from
//!   detected file paths agree with the configured folders.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::defaults;
use crate::validate::normalize_path;

/// One configured folder: where files arrive, where they go, and what runs first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRule {
    /// Absolute, normalised directory being observed.
    pub source_dir: PathBuf,
    /// Absolute directory that receives relocated files.
    pub destination_dir: PathBuf,
    /// Whether the folder lives on a share that must be polled.
    pub is_share: bool,
    /// Optional command invoked with the detected path before relocation.
    pub command: Option<CommandTemplate>,
}

impl WatchRule {
    /// Destination a detected file is relocated to: the rule's destination joined
    /// with the file's base name.
    #[must_use]
    pub fn destination_for(&self, file: &Path) -> PathBuf {
        file.file_name().map_or_else(
            || self.destination_dir.clone(),
            |name| self.destination_dir.join(name),
        )
    }
}

/// Executable plus fixed arguments, split on whitespace from the configured string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    /// Split a command string into program and arguments.
    ///
    /// Returns `None` when the string holds no program.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace().map(str::to_owned);
        let program = parts.next()?;
        Some(Self {
            raw: raw.trim().to_owned(),
            program,
            args: parts.collect(),
        })
    }

    /// Executable name or path.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Fixed arguments preceding the detected path.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The template as written in the configuration (trimmed).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Full argument list for one invocation: the fixed arguments followed by `file`.
    #[must_use]
    pub fn arguments_for(&self, file: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(OsString::from)
            .chain(std::iter::once(file.as_os_str().to_owned()))
            .collect()
    }
}

/// Read-only map from source directory to its rule.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<PathBuf, WatchRule>,
}

impl RuleTable {
    /// Build a table from rules; later duplicates replace earlier ones.
    #[must_use]
    pub fn from_rules(rules: impl IntoIterator<Item = WatchRule>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|rule| (rule.source_dir.clone(), rule))
                .collect(),
        }
    }

    /// Rule registered for exactly this directory.
    #[must_use]
    pub fn get(&self, source_dir: &Path) -> Option<&WatchRule> {
        self.rules.get(&normalize_path(source_dir))
    }

    /// Rule governing a detected file, looked up by the file's containing directory.
    #[must_use]
    pub fn resolve(&self, file: &Path) -> Option<&WatchRule> {
        file.parent().and_then(|dir| self.get(dir))
    }

    /// Iterate over every rule in the table.
    pub fn iter(&self) -> impl Iterator<Item = &WatchRule> {
        self.rules.values()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Preferred log rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatPreference {
    /// Human-readable output.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Process-wide timings and logging preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Delay between snapshots of shared folders.
    pub poll_interval: Duration,
    /// Delay between size samples while waiting for a file to settle.
    pub sample_interval: Duration,
    /// Upper bound on the settle wait; `None` waits indefinitely.
    pub stable_timeout: Option<Duration>,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log rendering; `None` lets the build profile decide.
    pub log_format: Option<LogFormatPreference>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval: defaults::POLL_INTERVAL,
            sample_interval: defaults::SAMPLE_INTERVAL,
            stable_timeout: None,
            log_level: defaults::LOG_LEVEL.to_owned(),
            log_format: None,
        }
    }
}

/// Loaded configuration, partitioned by observation mode.
#[derive(Debug, Clone, Default)]
pub struct WatchConfig {
    /// Folders observed through native filesystem notifications.
    pub local: RuleTable,
    /// Folders observed by polling snapshots.
    pub shared: RuleTable,
    /// Timings and logging preferences.
    pub settings: Settings,
}

impl WatchConfig {
    /// Partition validated rules into the local and shared tables.
    #[must_use]
    pub fn from_rules(rules: Vec<WatchRule>, settings: Settings) -> Self {
        let (shared, local): (Vec<_>, Vec<_>) = rules.into_iter().partition(|rule| rule.is_share);
        Self {
            local: RuleTable::from_rules(local),
            shared: RuleTable::from_rules(shared),
            settings,
        }
    }

    /// Total number of configured folders.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.local.len() + self.shared.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(source: &str, destination: &str, is_share: bool) -> WatchRule {
        WatchRule {
            source_dir: PathBuf::from(source),
            destination_dir: PathBuf::from(destination),
            is_share,
            command: None,
        }
    }

    #[test]
    fn command_template_splits_on_whitespace() {
        let template = CommandTemplate::parse("  gzip   -k -9 ").expect("template");
        assert_eq!(template.program(), "gzip");
        assert_eq!(template.args(), ["-k", "-9"]);
        assert_eq!(template.as_str(), "gzip   -k -9");

        let args = template.arguments_for(Path::new("/in/y.txt"));
        assert_eq!(
            args,
            vec![
                OsString::from("-k"),
                OsString::from("-9"),
                OsString::from("/in/y.txt")
            ]
        );
    }

    #[test]
    fn command_template_rejects_blank_strings() {
        assert!(CommandTemplate::parse("").is_none());
        assert!(CommandTemplate::parse("   \t").is_none());
    }

    #[test]
    fn rule_table_resolves_by_parent_directory() {
        let table = RuleTable::from_rules([rule("/in", "/out", false)]);
        let resolved = table.resolve(Path::new("/in/x.txt")).expect("rule");
        assert_eq!(resolved.destination_dir, PathBuf::from("/out"));
        assert!(table.resolve(Path::new("/in/nested/x.txt")).is_none());
        assert!(table.resolve(Path::new("/elsewhere/x.txt")).is_none());
        assert!(table.get(Path::new("/in/")).is_some());
    }

    #[test]
    fn destination_keeps_base_name() {
        let rule = rule("/in", "/out", false);
        assert_eq!(
            rule.destination_for(Path::new("/in/report.csv")),
            PathBuf::from("/out/report.csv")
        );
    }

    #[test]
    fn watch_config_partitions_by_share_flag() {
        let config = WatchConfig::from_rules(
            vec![
                rule("/in", "/out", false),
                rule("/share", "/out", true),
                rule("/drop", "/out", false),
            ],
            Settings::default(),
        );
        assert_eq!(config.local.len(), 2);
        assert_eq!(config.shared.len(), 1);
        assert_eq!(config.rule_count(), 3);
        assert!(config.shared.get(Path::new("/share")).is_some());
        assert!(config.local.get(Path::new("/share")).is_none());
    }
}
