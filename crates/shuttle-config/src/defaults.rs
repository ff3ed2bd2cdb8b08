//! Default timings and locations for the watch configuration.
//!
//! # Design
//! - Keep the stock cadence in one place so loaders and tests agree on it.

use std::time::Duration;

/// Directory (relative to the executable) that holds the packaged configuration.
pub(crate) const CONFIG_DIR_NAME: &str = "conf";
/// File name of the packaged configuration document.
pub(crate) const CONFIG_FILE_NAME: &str = "conf.yml";
/// Delay between directory snapshots for shared folders.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Delay between file size samples while waiting for a write to settle.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
/// Log level applied when neither the document nor `RUST_LOG` sets one.
pub(crate) const LOG_LEVEL: &str = "debug";
