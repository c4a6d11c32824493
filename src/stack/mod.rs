//! Provider-agnostic stack orchestration.
//!
//! A stack is one persisted unit of declared infrastructure, addressed by a
//! [`StackIdentity`]. The [`Engine`] trait is the boundary with the
//! declarative apply engine; [`StackContract`] registers a provider's typed
//! configuration, typed outputs and program; [`StackDriver`] ties the two
//! together into the set-config → apply → typed-output → destroy lifecycle.

mod driver;
mod error;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::str::FromStr;

use serde_json::Value;

use crate::program::{Program, ProgramError};

pub use driver::StackDriver;
pub use error::{OutputValidationError, StackError};

/// Stored stack configuration, keyed without the project namespace.
pub type ConfigMap = BTreeMap<String, String>;

/// Raw outputs returned by the engine after a successful apply.
pub type OutputMap = BTreeMap<String, Value>;

/// Future returned by engine operations.
pub type EngineFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Address of one persisted stack.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StackIdentity {
    project_name: String,
    stack_name: String,
}

impl StackIdentity {
    /// Builds an identity, trimming both parts.
    ///
    /// # Errors
    ///
    /// Returns a message when either part is blank or the stack name holds
    /// characters other than ASCII alphanumerics, `-` and `_`. Stack names
    /// become resource name prefixes, so `.` is rejected as well.
    pub fn new(
        project_name: impl Into<String>,
        stack_name: impl Into<String>,
    ) -> Result<Self, String> {
        let project = project_name.into().trim().to_owned();
        let stack = stack_name.into().trim().to_owned();
        if project.is_empty() {
            return Err(String::from("project name must not be empty"));
        }
        if stack.is_empty() {
            return Err(String::from("stack name must not be empty"));
        }
        if let Some(bad) = stack
            .chars()
            .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_')))
        {
            return Err(format!("stack name '{stack}' contains invalid character {bad:?}"));
        }
        Ok(Self {
            project_name: project,
            stack_name: stack,
        })
    }

    /// Project the stack belongs to.
    #[must_use]
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Logical name of the stack, which is also the instance name.
    #[must_use]
    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }
}

impl fmt::Display for StackIdentity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}", self.project_name, self.stack_name)
    }
}

/// Declarative apply engine holding persisted stack state.
///
/// Implementations enforce at most one concurrent update per stack and
/// report a second one as an error rather than waiting.
pub trait Engine {
    /// Engine specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Selects the stack, creating it when absent.
    fn select_stack<'a>(&'a self, identity: &'a StackIdentity)
    -> EngineFuture<'a, (), Self::Error>;

    /// Writes one configuration value, overwriting any previous value.
    fn set_config<'a>(
        &'a self,
        identity: &'a StackIdentity,
        key: &'a str,
        value: &'a str,
    ) -> EngineFuture<'a, (), Self::Error>;

    /// Reads every stored configuration value.
    fn get_all_config<'a>(
        &'a self,
        identity: &'a StackIdentity,
    ) -> EngineFuture<'a, ConfigMap, Self::Error>;

    /// Runs `program`, reconciles the stack toward its graph and returns the
    /// output document exactly as the engine reported it.
    fn up<'a>(
        &'a self,
        identity: &'a StackIdentity,
        program: Program,
    ) -> EngineFuture<'a, Value, Self::Error>;

    /// Tears down every resource recorded for the stack.
    fn destroy<'a>(&'a self, identity: &'a StackIdentity) -> EngineFuture<'a, (), Self::Error>;
}

/// Typed configuration and output contract for one provider.
pub trait StackContract {
    /// Typed configuration pushed into the stack before apply.
    type Config: Clone + fmt::Debug + Send + Sync;
    /// Typed outputs read back after apply.
    type Output: Clone + fmt::Debug;

    /// Project under which this provider's stacks are stored.
    const PROJECT_NAME: &'static str;
    /// Program declaring this provider's resource graph.
    const PROGRAM: Program;

    /// Flattens the configuration into stored key/value pairs.
    fn config_entries(config: &Self::Config) -> Vec<(&'static str, String)>;

    /// Rejects configuration values that can never produce a valid graph.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError`] describing the first invalid field.
    fn validate_config(_config: &Self::Config) -> Result<(), ProgramError> {
        Ok(())
    }

    /// Extracts and casts the typed outputs from the raw map.
    ///
    /// # Errors
    ///
    /// Returns [`OutputValidationError`] when a key is absent or malformed.
    fn build_typed_output(outputs: &OutputMap) -> Result<Self::Output, OutputValidationError>;
}

/// Checks that an engine output document is a key/value map.
///
/// # Errors
///
/// Returns [`OutputValidationError::NotAnObject`] for any other JSON shape.
pub fn output_map(document: Value) -> Result<OutputMap, OutputValidationError> {
    match document {
        Value::Object(entries) => Ok(entries.into_iter().collect()),
        other => Err(OutputValidationError::NotAnObject {
            actual: other.to_string(),
        }),
    }
}

/// Reads a required, non-empty string output.
///
/// # Errors
///
/// Returns [`OutputValidationError`] when the key is missing, not a string,
/// or blank.
pub fn require_string_output(
    outputs: &OutputMap,
    key: &str,
) -> Result<String, OutputValidationError> {
    let value = outputs
        .get(key)
        .ok_or_else(|| OutputValidationError::MissingKey {
            key: key.to_owned(),
        })?;
    let Value::String(text) = value else {
        return Err(OutputValidationError::WrongShape {
            key: key.to_owned(),
            expected: "string",
            actual: value.to_string(),
        });
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(OutputValidationError::EmptyValue {
            key: key.to_owned(),
        });
    }
    Ok(trimmed.to_owned())
}

/// Reads a required IP address output.
///
/// # Errors
///
/// Returns [`OutputValidationError`] when the key is missing, malformed, or
/// does not parse as an IP address.
pub fn require_ip_output(outputs: &OutputMap, key: &str) -> Result<IpAddr, OutputValidationError> {
    let raw = require_string_output(outputs, key)?;
    IpAddr::from_str(&raw).map_err(|_| OutputValidationError::InvalidAddress {
        key: key.to_owned(),
        value: raw,
    })
}
