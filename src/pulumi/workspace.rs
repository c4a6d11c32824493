//! Per-stack Pulumi YAML project directories.

use std::collections::BTreeMap;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Serialize;

use crate::program::DeclaredStack;
use crate::stack::{ConfigMap, StackIdentity};

use super::PulumiError;

/// Project file name Pulumi looks for in the working directory.
pub const PROJECT_FILE: &str = "Pulumi.yaml";

const RUNTIME: &str = "yaml";

#[derive(Serialize)]
struct ConfigDeclaration {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ProjectDocument<'a> {
    name: &'a str,
    runtime: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    config: BTreeMap<&'a str, ConfigDeclaration>,
    #[serde(flatten)]
    program: Option<&'a DeclaredStack>,
}

/// Directory holding the project file for `identity`.
#[must_use]
pub fn stack_dir(root: &Utf8Path, identity: &StackIdentity) -> Utf8PathBuf {
    root.join(identity.project_name())
        .join(identity.stack_name())
}

/// Renders a project file, declaring every project-scoped configuration key.
///
/// Keys carrying a provider namespace (such as `aws:region`) belong to the
/// provider and are not declared.
///
/// # Errors
///
/// Returns [`PulumiError::Render`] when YAML serialisation fails.
pub fn render_project(
    project: &str,
    config: &ConfigMap,
    program: Option<&DeclaredStack>,
) -> Result<String, PulumiError> {
    let document = ProjectDocument {
        name: project,
        runtime: RUNTIME,
        config: config
            .keys()
            .filter(|key| !key.contains(':'))
            .map(|key| (key.as_str(), ConfigDeclaration { kind: "string" }))
            .collect(),
        program,
    };
    serde_yaml::to_string(&document).map_err(|err| PulumiError::Render(err.to_string()))
}

/// Returns `true` when the stack directory already holds a project file.
///
/// # Errors
///
/// Returns [`PulumiError::Workspace`] when the directory cannot be read.
pub fn project_exists(dir: &Utf8Path) -> Result<bool, PulumiError> {
    match Dir::open_ambient_dir(dir, ambient_authority()) {
        Ok(handle) => handle
            .try_exists(PROJECT_FILE)
            .map_err(|err| workspace_error(dir, &err)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(workspace_error(dir, &err)),
    }
}

/// Writes the project file, creating the directory when needed.
///
/// # Errors
///
/// Returns [`PulumiError::Workspace`] when the directory or file cannot be
/// written.
pub fn write_project(dir: &Utf8Path, contents: &str) -> Result<(), PulumiError> {
    ensure_dir(dir)?;
    let handle =
        Dir::open_ambient_dir(dir, ambient_authority()).map_err(|err| workspace_error(dir, &err))?;
    handle
        .write(PROJECT_FILE, contents)
        .map_err(|err| workspace_error(&dir.join(PROJECT_FILE), &err))
}

/// Creates `dir` and its parents.
///
/// # Errors
///
/// Returns [`PulumiError::Workspace`] when creation fails.
pub fn ensure_dir(dir: &Utf8Path) -> Result<(), PulumiError> {
    Dir::create_ambient_dir_all(dir, ambient_authority()).map_err(|err| workspace_error(dir, &err))
}

fn workspace_error(path: &Utf8Path, err: &io::Error) -> PulumiError {
    PulumiError::Workspace {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
