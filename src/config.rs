//! Configuration loading via `ortho-config`.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::command::expand_tilde;

/// Default Pulumi state backend, local to the operator's machine.
pub const DEFAULT_BACKEND_URL: &str = "file://~/.rigstack/pulumi-backend";

/// Default root under which per-stack Pulumi projects are written.
pub const DEFAULT_WORKSPACE_ROOT: &str = "~/.rigstack/workspaces";

/// Default Paperspace API endpoint.
pub const DEFAULT_PAPERSPACE_API_URL: &str = "https://api.paperspace.com/v1";

const FILE_BACKEND_SCHEME: &str = "file://";

/// Engine settings derived from environment variables, configuration files
/// and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "RIGSTACK",
    discovery(
        app_name = "rigstack",
        env_var = "RIGSTACK_CONFIG_PATH",
        config_file_name = "rigstack.toml",
        dotfile_name = ".rigstack.toml",
        project_file_name = "rigstack.toml"
    )
)]
pub struct EngineConfig {
    /// Path to the `pulumi` executable.
    #[ortho_config(default = "pulumi".to_owned())]
    pub pulumi_bin: String,
    /// Pulumi state backend URL. `file://` URLs support tilde expansion.
    #[ortho_config(default = DEFAULT_BACKEND_URL.to_owned())]
    pub backend_url: String,
    /// Passphrase protecting secrets in the state backend. May be empty.
    #[ortho_config(default = String::new())]
    pub config_passphrase: String,
    /// Directory holding one Pulumi project per stack. Supports tilde
    /// expansion.
    #[ortho_config(default = DEFAULT_WORKSPACE_ROOT.to_owned())]
    pub workspace_root: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [{}] in rigstack.toml",
            metadata.description, metadata.env_var, metadata.toml_key, metadata.section
        )));
    }
    Ok(())
}

impl EngineConfig {
    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("rigstack")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks that every required field is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the environment variable
    /// and TOML key to set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.pulumi_bin,
            &FieldMetadata::new(
                "Pulumi executable",
                "RIGSTACK_PULUMI_BIN",
                "pulumi_bin",
                "engine",
            ),
        )?;
        require_field(
            &self.backend_url,
            &FieldMetadata::new(
                "Pulumi state backend",
                "RIGSTACK_BACKEND_URL",
                "backend_url",
                "engine",
            ),
        )?;
        require_field(
            &self.workspace_root,
            &FieldMetadata::new(
                "workspace directory",
                "RIGSTACK_WORKSPACE_ROOT",
                "workspace_root",
                "engine",
            ),
        )?;
        Ok(())
    }

    /// Backend URL with a leading `~/` expanded in `file://` URLs.
    #[must_use]
    pub fn resolved_backend_url(&self) -> String {
        let url = self.backend_url.trim();
        url.strip_prefix(FILE_BACKEND_SCHEME).map_or_else(
            || url.to_owned(),
            |path| format!("{FILE_BACKEND_SCHEME}{}", expand_tilde(path)),
        )
    }

    /// Local state directory when the backend is a `file://` URL.
    #[must_use]
    pub fn local_backend_dir(&self) -> Option<Utf8PathBuf> {
        self.resolved_backend_url()
            .strip_prefix(FILE_BACKEND_SCHEME)
            .map(Utf8PathBuf::from)
    }

    /// Workspace root with a leading `~/` expanded.
    #[must_use]
    pub fn resolved_workspace_root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(expand_tilde(self.workspace_root.trim()))
    }
}

/// Paperspace control-plane settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "PAPERSPACE",
    discovery(
        app_name = "rigstack",
        env_var = "RIGSTACK_CONFIG_PATH",
        config_file_name = "rigstack.toml",
        dotfile_name = ".rigstack.toml",
        project_file_name = "rigstack.toml"
    )
)]
pub struct PaperspaceConfig {
    /// API key used as a bearer token.
    pub api_key: Option<String>,
    /// Base URL of the public API.
    #[ortho_config(default = DEFAULT_PAPERSPACE_API_URL.to_owned())]
    pub api_base_url: String,
}

impl PaperspaceConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("rigstack")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Picks the explicit key when given, otherwise the configured one.
    /// Blank values count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when neither is set.
    pub fn resolve_api_key(&self, explicit: Option<&str>) -> Result<String, ConfigError> {
        let key = [explicit, self.api_key.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|candidate| !candidate.is_empty())
            .unwrap_or_default();
        require_field(
            key,
            &FieldMetadata::new(
                "Paperspace API key",
                "PAPERSPACE_API_KEY",
                "api_key",
                "paperspace",
            ),
        )?;
        Ok(key.to_owned())
    }

    /// Checks the API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the URL is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.api_base_url,
            &FieldMetadata::new(
                "Paperspace API URL",
                "PAPERSPACE_API_BASE_URL",
                "api_base_url",
                "paperspace",
            ),
        )
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
