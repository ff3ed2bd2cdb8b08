#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(
    missing_docs,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

//! File-backed watch rule configuration.
//!
//! Layout: `model.rs` (rules, rule tables, settings), `loader.rs` (YAML document
//! discovery and parsing), `validate.rs` (field validation and path normalisation),
//! `defaults.rs` (fallback timings and locations).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_ENV, default_config_path, load_from_path, parse_document};
pub use model::{CommandTemplate, LogFormatPreference, RuleTable, Settings, WatchConfig, WatchRule};
pub use validate::normalize_path;
