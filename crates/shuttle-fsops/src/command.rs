//! External command invocation.
//!
//! A command enriches a file before it moves; it never gates the move. Every
//! way a command can end, including failing to start, is a [`CommandOutcome`]
//! rather than an error.

use std::path::Path;
use std::process::Stdio;

use shuttle_config::CommandTemplate;
use shuttle_events::CommandStatus;
use tokio::process::Command;
use tracing::{debug, info};

/// How a command invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Exited with status zero.
    Succeeded {
        /// Captured standard output.
        stdout: String,
    },
    /// Exited non-zero, or was terminated by a signal (`code` is `None`).
    Failed {
        /// Exit code, when the platform reported one.
        code: Option<i32>,
        /// Captured standard output.
        stdout: String,
    },
    /// The executable could not be started.
    LaunchFailed {
        /// Launch error text.
        message: String,
    },
}

impl CommandOutcome {
    /// Whether the command ran and exited cleanly.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Event payload for this outcome.
    #[must_use]
    pub fn status(&self) -> CommandStatus {
        match self {
            Self::Succeeded { .. } => CommandStatus::Succeeded,
            Self::Failed { code, .. } => CommandStatus::Failed { code: *code },
            Self::LaunchFailed { message } => CommandStatus::LaunchFailed {
                message: message.clone(),
            },
        }
    }
}

/// Run `template` with `file` appended as the final argument and wait for it to exit.
pub async fn run_command(template: &CommandTemplate, file: &Path) -> CommandOutcome {
    let args = template.arguments_for(file);
    info!(
        command = template.program(),
        args = ?args,
        "running command"
    );

    let output = Command::new(template.program())
        .args(&args)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .await;

    match output {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            debug!(command = template.program(), output = %stdout, "command output");
            if output.status.success() {
                CommandOutcome::Succeeded { stdout }
            } else {
                CommandOutcome::Failed {
                    code: output.status.code(),
                    stdout,
                }
            }
        }
        Err(error) => CommandOutcome::LaunchFailed {
            message: error.to_string(),
        },
    }
}
