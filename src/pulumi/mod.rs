//! [`Engine`] implementation driving the Pulumi CLI.
//!
//! Every stack gets its own Pulumi YAML project directory under the
//! configured workspace root. Programs are evaluated in-process and the
//! resulting graph is written to `Pulumi.yaml` before `pulumi up`, so the
//! CLI only ever sees a fully resolved declaration. State, configuration
//! and stack locking remain the CLI's responsibility.

mod error;
mod workspace;

use std::collections::BTreeMap;
use std::ffi::OsString;

use camino::Utf8PathBuf;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::command::{CommandEnv, CommandOutput, CommandRunner, ProcessCommandRunner};
use crate::config::EngineConfig;
use crate::program::{Program, ProgramContext};
use crate::stack::{ConfigMap, Engine, EngineFuture, StackIdentity};

pub use error::PulumiError;
pub use workspace::{PROJECT_FILE, render_project, stack_dir};

/// Environment variable selecting the state backend.
pub const BACKEND_URL_ENV: &str = "PULUMI_BACKEND_URL";
/// Environment variable holding the secrets passphrase.
pub const PASSPHRASE_ENV: &str = "PULUMI_CONFIG_PASSPHRASE";

const LOCK_MARKERS: [&str; 3] = [
    "currently locked",
    "another update is currently in progress",
    "[409] conflict",
];

/// Pulumi CLI engine.
#[derive(Clone, Debug)]
pub struct PulumiEngine<R = ProcessCommandRunner> {
    runner: R,
    pulumi_bin: String,
    backend_url: String,
    passphrase: String,
    workspace_root: Utf8PathBuf,
    local_backend: Option<Utf8PathBuf>,
}

impl PulumiEngine<ProcessCommandRunner> {
    /// Builds an engine that spawns the real `pulumi` binary.
    ///
    /// # Errors
    ///
    /// Returns [`crate::config::ConfigError`] when the configuration is
    /// incomplete.
    pub fn new(config: &EngineConfig) -> Result<Self, crate::config::ConfigError> {
        Self::with_runner(config, ProcessCommandRunner)
    }
}

impl<R> PulumiEngine<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    /// Builds an engine using the supplied command runner.
    ///
    /// # Errors
    ///
    /// Returns [`crate::config::ConfigError`] when the configuration is
    /// incomplete.
    pub fn with_runner(
        config: &EngineConfig,
        runner: R,
    ) -> Result<Self, crate::config::ConfigError> {
        config.validate()?;
        Ok(Self {
            runner,
            pulumi_bin: config.pulumi_bin.trim().to_owned(),
            backend_url: config.resolved_backend_url(),
            passphrase: config.config_passphrase.clone(),
            workspace_root: config.resolved_workspace_root(),
            local_backend: config.local_backend_dir(),
        })
    }

    /// Project directory used for `identity`.
    #[must_use]
    pub fn workspace_dir(&self, identity: &StackIdentity) -> Utf8PathBuf {
        stack_dir(&self.workspace_root, identity)
    }

    fn envs(&self) -> Vec<CommandEnv> {
        vec![
            (BACKEND_URL_ENV.to_owned(), self.backend_url.clone()),
            (PASSPHRASE_ENV.to_owned(), self.passphrase.clone()),
        ]
    }

    async fn pulumi(
        &self,
        identity: &StackIdentity,
        subcommand: &[&str],
    ) -> Result<CommandOutput, PulumiError> {
        let dir = self.workspace_dir(identity);
        let mut args: Vec<OsString> = vec![
            OsString::from("--non-interactive"),
            OsString::from("--cwd"),
            OsString::from(dir.as_str()),
        ];
        args.extend(subcommand.iter().map(OsString::from));
        let verb: Vec<&str> = subcommand
            .iter()
            .copied()
            .take_while(|arg| !arg.starts_with('-'))
            .take(2)
            .collect();
        let command = format!("pulumi {}", verb.join(" "));
        debug!(stack = %identity, %command, "running pulumi");

        let runner = self.runner.clone();
        let program = self.pulumi_bin.clone();
        let envs = self.envs();
        let output = tokio::task::spawn_blocking(move || runner.run(&program, &args, &envs))
            .await
            .map_err(|err| PulumiError::Join(err.to_string()))??;

        if output.is_success() {
            return Ok(output);
        }
        let stderr = output.stderr.trim().to_owned();
        if is_lock_conflict(&stderr) {
            return Err(PulumiError::Conflict {
                stack: identity.to_string(),
                stderr,
            });
        }
        Err(PulumiError::CommandFailure {
            command,
            status: output.status_text(),
            stderr,
        })
    }

    fn prepare_workspace(&self, identity: &StackIdentity) -> Result<(), PulumiError> {
        if let Some(state_dir) = &self.local_backend {
            workspace::ensure_dir(state_dir)?;
        }
        let dir = self.workspace_dir(identity);
        if workspace::project_exists(&dir)? {
            return Ok(());
        }
        let contents = render_project(identity.project_name(), &ConfigMap::new(), None)?;
        workspace::write_project(&dir, &contents)
    }

    async fn read_config(&self, identity: &StackIdentity) -> Result<ConfigMap, PulumiError> {
        let output = self
            .pulumi(
                identity,
                &[
                    "config",
                    "--json",
                    "--show-secrets",
                    "--stack",
                    identity.stack_name(),
                ],
            )
            .await?;
        parse_config(identity.project_name(), &output.stdout)
    }
}

impl<R> Engine for PulumiEngine<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    type Error = PulumiError;

    fn select_stack<'a>(
        &'a self,
        identity: &'a StackIdentity,
    ) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.prepare_workspace(identity)?;
            self.pulumi(
                identity,
                &["stack", "select", "--create", identity.stack_name()],
            )
            .await?;
            Ok(())
        })
    }

    fn set_config<'a>(
        &'a self,
        identity: &'a StackIdentity,
        key: &'a str,
        value: &'a str,
    ) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.pulumi(
                identity,
                &[
                    "config",
                    "set",
                    "--stack",
                    identity.stack_name(),
                    "--",
                    key,
                    value,
                ],
            )
            .await?;
            Ok(())
        })
    }

    fn get_all_config<'a>(
        &'a self,
        identity: &'a StackIdentity,
    ) -> EngineFuture<'a, ConfigMap, Self::Error> {
        Box::pin(self.read_config(identity))
    }

    fn up<'a>(
        &'a self,
        identity: &'a StackIdentity,
        program: Program,
    ) -> EngineFuture<'a, Value, Self::Error> {
        Box::pin(async move {
            let config = self.read_config(identity).await?;
            let context = ProgramContext::new(identity.clone(), config.clone());
            let declared = program(&context)?;
            debug!(
                stack = %identity,
                resources = declared.resource_count(),
                "rendering program"
            );
            let contents = render_project(identity.project_name(), &config, Some(&declared))?;
            workspace::write_project(&self.workspace_dir(identity), &contents)?;

            self.pulumi(
                identity,
                &[
                    "up",
                    "--yes",
                    "--skip-preview",
                    "--stack",
                    identity.stack_name(),
                ],
            )
            .await?;
            let output = self
                .pulumi(
                    identity,
                    &[
                        "stack",
                        "output",
                        "--json",
                        "--show-secrets",
                        "--stack",
                        identity.stack_name(),
                    ],
                )
                .await?;
            parse_outputs(&output.stdout)
        })
    }

    fn destroy<'a>(&'a self, identity: &'a StackIdentity) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.pulumi(
                identity,
                &[
                    "destroy",
                    "--yes",
                    "--skip-preview",
                    "--stack",
                    identity.stack_name(),
                ],
            )
            .await?;
            Ok(())
        })
    }
}

#[derive(Deserialize)]
struct ConfigEntry {
    value: Option<Value>,
}

/// Decodes `pulumi config --json`, stripping the project namespace.
///
/// # Errors
///
/// Returns [`PulumiError::Parse`] when the payload is not a JSON object.
pub fn parse_config(project: &str, stdout: &str) -> Result<ConfigMap, PulumiError> {
    if stdout.trim().is_empty() {
        return Ok(ConfigMap::new());
    }
    let entries: BTreeMap<String, ConfigEntry> =
        serde_json::from_str(stdout).map_err(|err| PulumiError::Parse {
            what: "stack configuration",
            message: err.to_string(),
        })?;
    let namespace = format!("{project}:");
    Ok(entries
        .into_iter()
        .filter_map(|(key, entry)| {
            let text = match entry.value? {
                Value::String(text) => text,
                other => other.to_string(),
            };
            let local = key
                .strip_prefix(&namespace)
                .map_or_else(|| key.clone(), str::to_owned);
            Some((local, text))
        })
        .collect())
}

/// Decodes `pulumi stack output --json`.
///
/// The document's shape is left to the stack driver to check.
///
/// # Errors
///
/// Returns [`PulumiError::Parse`] when the payload is not JSON.
pub fn parse_outputs(stdout: &str) -> Result<Value, PulumiError> {
    serde_json::from_str(stdout).map_err(|err| PulumiError::Parse {
        what: "stack outputs",
        message: err.to_string(),
    })
}

fn is_lock_conflict(stderr: &str) -> bool {
    let lowered = stderr.to_ascii_lowercase();
    LOCK_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
