//! Provisioning programs and the declaration model they produce.
//!
//! A program is a stateless function from the stack's stored configuration
//! to a [`DeclaredStack`]. Engines may call it any number of times; it never
//! performs I/O and never mutates anything outside the graph it returns.

mod declaration;
mod model;

use std::str::FromStr;

use thiserror::Error;

use crate::stack::{ConfigMap, StackIdentity};

pub use declaration::{DeclaredStack, Invoke, Reference, Resource, ResourceHandle, ResourceOptions};
pub use model::{
    DeclarationError, KeyMaterial, PortRule, Protocol, PublicIpType, UNRESTRICTED_IPV4,
    UNRESTRICTED_IPV6, VolumeSpec, slugify, validate_volumes,
};

/// Program bound to a stack contract.
pub type Program = fn(&ProgramContext) -> Result<DeclaredStack, ProgramError>;

/// Errors raised while a program builds its graph.
///
/// These are configuration errors: retrying with the same configuration
/// always fails the same way.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProgramError {
    /// Raised when a required configuration key is absent.
    #[error("missing required configuration value '{key}'")]
    MissingConfig {
        /// Configuration key that was not set.
        key: String,
    },
    /// Raised when a configuration value cannot be interpreted.
    #[error("configuration value '{key}' = {value:?} is invalid: {reason}")]
    InvalidConfig {
        /// Configuration key holding the value.
        key: String,
        /// Raw stored value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// Raised when the composed graph would be inconsistent.
    #[error(transparent)]
    Declaration(#[from] DeclarationError),
}

/// Read-only view of a stack passed to its program.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProgramContext {
    identity: StackIdentity,
    config: ConfigMap,
}

impl ProgramContext {
    /// Creates a context over the stack's stored configuration.
    #[must_use]
    pub const fn new(identity: StackIdentity, config: ConfigMap) -> Self {
        Self { identity, config }
    }

    /// Logical stack name; composition units namespace resources with it.
    #[must_use]
    pub fn stack_name(&self) -> &str {
        self.identity.stack_name()
    }

    /// Project the stack belongs to.
    #[must_use]
    pub fn project_name(&self) -> &str {
        self.identity.project_name()
    }

    /// Returns a configuration value when present and non-blank.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Returns a required configuration value.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::MissingConfig`] when the key is absent or blank.
    pub fn require(&self, key: &str) -> Result<&str, ProgramError> {
        self.get(key).ok_or_else(|| ProgramError::MissingConfig {
            key: key.to_owned(),
        })
    }

    /// Returns a required configuration value parsed as a number.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::MissingConfig`] when absent and
    /// [`ProgramError::InvalidConfig`] when the value is not a number.
    pub fn require_number<T>(&self, key: &str) -> Result<T, ProgramError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.require(key)?;
        raw.trim()
            .parse::<T>()
            .map_err(|err| ProgramError::InvalidConfig {
                key: key.to_owned(),
                value: raw.to_owned(),
                reason: err.to_string(),
            })
    }
}
