//! Errors raised by the Pulumi CLI engine.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::command::CommandError;
use crate::program::ProgramError;

/// Errors surfaced by [`super::PulumiEngine`].
#[derive(Debug, Error)]
pub enum PulumiError {
    /// Raised when the Pulumi binary cannot be started.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// Raised when a Pulumi command exits unsuccessfully.
    #[error("`{command}` failed with status {status}: {stderr}")]
    CommandFailure {
        /// Subcommand that failed, for example `pulumi up`.
        command: String,
        /// Exit status text.
        status: String,
        /// Trimmed standard error.
        stderr: String,
    },
    /// Raised when another update holds the stack lock.
    #[error("stack {stack} is locked by another update: {stderr}")]
    Conflict {
        /// Stack that is locked.
        stack: String,
        /// Trimmed standard error.
        stderr: String,
    },
    /// Raised when Pulumi prints JSON the engine cannot decode.
    #[error("failed to parse {what}: {message}")]
    Parse {
        /// Description of the payload being decoded.
        what: &'static str,
        /// Decoder error message.
        message: String,
    },
    /// Raised when the stack workspace cannot be prepared.
    #[error("failed to prepare workspace {path}: {message}")]
    Workspace {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the program cannot be rendered to YAML.
    #[error("failed to render program: {0}")]
    Render(String),
    /// Raised when the program rejects the stored configuration.
    #[error(transparent)]
    Program(#[from] ProgramError),
    /// Raised when the blocking command task is cancelled or panics.
    #[error("pulumi task failed: {0}")]
    Join(String),
}

impl PulumiError {
    /// Returns `true` when the failure is a stack lock conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
