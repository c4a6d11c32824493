//! Turns operator intent into something the stacks can act on.
//!
//! Paperspace intent resolves to a [`ProvisionPlan`]: either arguments for a
//! new machine, or a reference to a machine that already exists and bypasses
//! the stack driver entirely. AWS intent resolves to an [`AwsStackConfig`].

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::{debug, info};

use crate::aws::AwsStackConfig;
use crate::command::expand_tilde;
use crate::paperspace::{ControlPlane, Machine, PaperspaceError};
use crate::program::{DeclarationError, PublicIpType};

/// Paperspace regions offered to operators.
pub const KNOWN_REGIONS: [&str; 3] = ["East Coast (NY2)", "West Coast (CA1)", "Europe (AMS1)"];

/// Machine type used when none is requested.
pub const DEFAULT_MACHINE_TYPE: &str = "RTX4000";

/// Errors raised while resolving operator intent.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Raised when the selected machine is absent from the fetched list.
    #[error("machine '{0}' was not found in the account")]
    MachineNotFound(String),
    /// Raised when the selected machine has no public address.
    #[error("machine '{name}' ({machine_id}) has no public IP address")]
    MissingPublicIp {
        /// Identifier of the selected machine.
        machine_id: String,
        /// Display name of the selected machine.
        name: String,
    },
    /// Raised when a required value was not supplied.
    #[error("missing required value: {0}")]
    MissingField(&'static str),
    /// Raised when a supplied value is unusable.
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Value as supplied.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Raised when the SSH public key file cannot be read.
    #[error("failed to read SSH public key {path}: {message}")]
    KeyFile {
        /// Path that was read.
        path: Utf8PathBuf,
        /// Underlying I/O message.
        message: String,
    },
    /// Raised when the control plane cannot be queried.
    #[error(transparent)]
    Client(#[from] PaperspaceError),
}

/// Arguments for a new Paperspace machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PaperspaceCreateArgs {
    /// Machine type, for example `RTX4000`.
    pub machine_type: String,
    /// Boot disk size in GB.
    pub disk_size_gb: u32,
    /// Public address allocation mode.
    pub public_ip_type: PublicIpType,
    /// Region display name, for example `East Coast (NY2)`.
    pub region: String,
}

/// Machine that already exists and is reachable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExistingMachine {
    /// Provider machine identifier.
    pub machine_id: String,
    /// Public address of the machine.
    pub public_ip: String,
}

/// Outcome of resolving Paperspace intent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProvisionPlan {
    /// Provision a new machine.
    Create(PaperspaceCreateArgs),
    /// Reuse a machine that already exists.
    UseExisting(ExistingMachine),
}

/// What an operator asked for on Paperspace.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PaperspaceIntent {
    /// Machine to reuse instead of creating one.
    pub existing_machine: Option<String>,
    /// Requested machine type.
    pub machine_type: Option<String>,
    /// Requested disk size in GB.
    pub disk_size_gb: Option<u32>,
    /// Requested public address mode.
    pub public_ip_type: Option<String>,
    /// Requested region.
    pub region: Option<String>,
}

/// Where the SSH public key comes from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SshKeySource {
    /// Key text given directly.
    Inline(String),
    /// Path to an OpenSSH public key file. A leading `~/` is expanded.
    File(Utf8PathBuf),
}

/// What an operator asked for on AWS.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AwsIntent {
    /// AWS region.
    pub region: String,
    /// EC2 instance type.
    pub instance_type: String,
    /// Root volume size in GiB.
    pub root_volume_size_gb: u32,
    /// Public address mode as typed by the operator.
    pub public_ip_type: String,
    /// SSH public key source.
    pub ssh_key: SshKeySource,
}

/// Resolves Paperspace intent into a plan.
///
/// When an existing machine is named the creation fields are ignored.
///
/// # Errors
///
/// Returns [`WorkflowError`] when a field is missing or invalid, when the
/// named machine cannot be used, or when the control plane fails.
pub async fn resolve_paperspace_plan<C>(
    client: &C,
    intent: &PaperspaceIntent,
) -> Result<ProvisionPlan, WorkflowError>
where
    C: ControlPlane + Sync,
{
    if let Some(machine) = non_blank(intent.existing_machine.as_deref()) {
        return select_existing_machine(client, machine)
            .await
            .map(ProvisionPlan::UseExisting);
    }
    paperspace_create_args(intent).map(ProvisionPlan::Create)
}

/// Validates the creation half of Paperspace intent.
///
/// # Errors
///
/// Returns [`WorkflowError::MissingField`] when the region or disk size is
/// absent and [`WorkflowError::InvalidField`] when a value is unusable.
pub fn paperspace_create_args(
    intent: &PaperspaceIntent,
) -> Result<PaperspaceCreateArgs, WorkflowError> {
    let region = non_blank(intent.region.as_deref()).ok_or(WorkflowError::MissingField("region"))?;
    let disk_size_gb = intent
        .disk_size_gb
        .ok_or(WorkflowError::MissingField("disk size"))?;
    if disk_size_gb == 0 {
        return Err(WorkflowError::InvalidField {
            field: "disk size",
            value: String::from("0"),
            reason: String::from("must be a positive number of GB"),
        });
    }
    let public_ip_type = parse_public_ip_type(intent.public_ip_type.as_deref())?;
    let machine_type = non_blank(intent.machine_type.as_deref()).unwrap_or(DEFAULT_MACHINE_TYPE);

    Ok(PaperspaceCreateArgs {
        machine_type: machine_type.to_owned(),
        disk_size_gb,
        public_ip_type,
        region: region.to_owned(),
    })
}

/// Picks an existing machine by id or name from a freshly fetched list.
///
/// The credentials are confirmed before listing.
///
/// # Errors
///
/// Returns [`WorkflowError::MachineNotFound`] when nothing matches and
/// [`WorkflowError::MissingPublicIp`] when the match has no address.
pub async fn select_existing_machine<C>(
    client: &C,
    machine: &str,
) -> Result<ExistingMachine, WorkflowError>
where
    C: ControlPlane + Sync,
{
    let session = client.auth_session().await?;
    debug!(user = %session.user.email, team = %session.team.id, "authenticated");
    let machines = client.list_machines().await?;
    let selected = find_machine(&machines, machine)
        .ok_or_else(|| WorkflowError::MachineNotFound(machine.to_owned()))?;
    let public_ip = selected
        .public_address()
        .ok_or_else(|| WorkflowError::MissingPublicIp {
            machine_id: selected.id.clone(),
            name: selected.name.clone(),
        })?;
    info!(machine = %selected.id, %public_ip, "using existing machine");
    Ok(ExistingMachine {
        machine_id: selected.id.clone(),
        public_ip: public_ip.to_owned(),
    })
}

fn find_machine<'a>(machines: &'a [Machine], wanted: &str) -> Option<&'a Machine> {
    machines
        .iter()
        .find(|machine| machine.id == wanted)
        .or_else(|| machines.iter().find(|machine| machine.name == wanted))
}

/// Resolves AWS intent into the stack configuration.
///
/// # Errors
///
/// Returns [`WorkflowError`] when a field is blank or invalid, or when the
/// SSH key file cannot be read.
pub fn resolve_aws_config(intent: &AwsIntent) -> Result<AwsStackConfig, WorkflowError> {
    let region =
        non_blank(Some(intent.region.as_str())).ok_or(WorkflowError::MissingField("region"))?;
    let instance_type = non_blank(Some(intent.instance_type.as_str()))
        .ok_or(WorkflowError::MissingField("instance type"))?;
    if intent.root_volume_size_gb == 0 {
        return Err(WorkflowError::InvalidField {
            field: "root volume size",
            value: String::from("0"),
            reason: String::from("must be a positive number of GiB"),
        });
    }
    let public_ip_type = parse_public_ip_type(Some(intent.public_ip_type.as_str()))?;
    let key = match &intent.ssh_key {
        SshKeySource::Inline(text) => text.trim().to_owned(),
        SshKeySource::File(path) => read_public_key(path)?,
    };
    if key.is_empty() {
        return Err(WorkflowError::MissingField("SSH public key"));
    }

    Ok(AwsStackConfig {
        region: region.to_owned(),
        instance_type: instance_type.to_owned(),
        root_volume_size_gb: intent.root_volume_size_gb,
        public_ssh_key_content: key,
        public_ip_type,
    })
}

fn parse_public_ip_type(value: Option<&str>) -> Result<PublicIpType, WorkflowError> {
    non_blank(value).map_or_else(
        || Ok(PublicIpType::default()),
        |text| {
            text.parse().map_err(|err: DeclarationError| WorkflowError::InvalidField {
                field: "public IP type",
                value: text.to_owned(),
                reason: err.to_string(),
            })
        },
    )
}

fn read_public_key(path: &Utf8Path) -> Result<String, WorkflowError> {
    let expanded = Utf8PathBuf::from(expand_tilde(path.as_str()));
    let key_error = |message: String| WorkflowError::KeyFile {
        path: expanded.clone(),
        message,
    };
    let file_name = expanded
        .file_name()
        .ok_or_else(|| key_error(String::from("path has no file name")))?;
    let parent = expanded
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| key_error(err.to_string()))?;
    let contents = dir
        .read_to_string(file_name)
        .map_err(|err| key_error(err.to_string()))?;
    Ok(contents.trim().to_owned())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}
