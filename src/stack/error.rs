//! Error taxonomy for stack orchestration.

use thiserror::Error;

use crate::program::ProgramError;

use super::StackIdentity;

/// Raised when an engine output map does not match the typed contract.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OutputValidationError {
    /// Raised when the engine reports outputs that are not a map.
    #[error("outputs should be a JSON object, got {actual}")]
    NotAnObject {
        /// Rendering of the document that was found.
        actual: String,
    },
    /// Raised when an expected output key is absent.
    #[error("output '{key}' is missing")]
    MissingKey {
        /// Output key that was expected.
        key: String,
    },
    /// Raised when an output holds the wrong JSON shape.
    #[error("output '{key}' should be a {expected}, got {actual}")]
    WrongShape {
        /// Output key being read.
        key: String,
        /// Shape the contract requires.
        expected: &'static str,
        /// Rendering of the value that was found.
        actual: String,
    },
    /// Raised when a required string output is empty.
    #[error("output '{key}' is empty")]
    EmptyValue {
        /// Output key being read.
        key: String,
    },
    /// Raised when an address output does not parse.
    #[error("output '{key}' is not an IP address: {value}")]
    InvalidAddress {
        /// Output key being read.
        key: String,
        /// Raw value that failed to parse.
        value: String,
    },
}

/// Errors surfaced by [`super::StackDriver`].
///
/// Configuration and output-validation failures are permanent for the
/// given input; only engine failures are worth retrying.
#[derive(Debug, Error)]
pub enum StackError<EngineError>
where
    EngineError: std::error::Error + 'static,
{
    /// Raised when the stack identity itself is unusable.
    #[error("invalid stack identity: {0}")]
    Identity(String),
    /// Raised when the configuration cannot produce a valid graph.
    #[error("configuration error for stack {identity}: {source}")]
    Config {
        /// Stack being configured or applied.
        identity: StackIdentity,
        /// Underlying configuration problem.
        #[source]
        source: ProgramError,
    },
    /// Raised when the engine rejects an operation.
    #[error("engine error for stack {identity}: {source}")]
    Engine {
        /// Stack the engine was operating on.
        identity: StackIdentity,
        /// Error returned by the engine, unmodified.
        #[source]
        source: EngineError,
    },
    /// Raised when apply succeeded but its outputs cannot be trusted.
    #[error("invalid outputs for stack {identity}: {source}")]
    OutputValidation {
        /// Stack whose outputs were read.
        identity: StackIdentity,
        /// Underlying validation failure.
        #[source]
        source: OutputValidationError,
    },
}

impl<EngineError> StackError<EngineError>
where
    EngineError: std::error::Error + 'static,
{
    /// Returns `true` when retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Engine { .. })
    }

    /// Returns the identity of the stack involved, when one was resolved.
    #[must_use]
    pub const fn identity(&self) -> Option<&StackIdentity> {
        match self {
            Self::Identity(_) => None,
            Self::Config { identity, .. }
            | Self::Engine { identity, .. }
            | Self::OutputValidation { identity, .. } => Some(identity),
        }
    }
}
