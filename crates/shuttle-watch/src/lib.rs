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

//! Watch sources that turn new files into dispatches.
//!
//! Layout: `local.rs` (native notifications for local folders), `share.rs`
//! (snapshot polling for shared folders), `snapshot.rs` (recursive listing and
//! diff), `error.rs`.

pub mod error;
pub mod local;
pub mod share;
pub mod snapshot;

pub use error::{WatchError, WatchResult};
pub use local::LocalWatchSource;
pub use share::{SharePoller, spawn_share_sources};
pub use snapshot::{DirectorySnapshot, EntryMeta};
