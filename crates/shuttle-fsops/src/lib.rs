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

//! Per-file dispatch pipeline: wait for a file to settle, run the optional
//! command, relocate it.
//!
//! Layout: `quiescence.rs` (size-sampling settle detector), `relocate.rs`
//! (rename with copy-then-delete fallback), `command.rs` (external command
//! invocation), `service.rs` (`DispatchService`), `model.rs` (request/report
//! types), `error.rs` (pipeline errors).

pub mod command;
pub mod error;
pub mod model;
pub mod quiescence;
pub mod relocate;
pub mod service;

pub use command::{CommandOutcome, run_command};
pub use error::{FsOpsError, FsOpsResult};
pub use model::{DetectedFile, DispatchReport};
pub use quiescence::{FsSizeProbe, QuiescenceDetector, SizeProbe};
pub use relocate::{FsPrimitives, LocalFs, RelocateStage, Relocation, RelocationStrategy, Relocator};
pub use service::DispatchService;
