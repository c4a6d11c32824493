//! Command-line interface definitions for the `rigstack` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. It
//! must not depend on the library crate.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `rigstack` binary.
#[derive(Debug, Parser)]
#[command(
    name = "rigstack",
    version,
    about = "Provision remote gaming rigs as infrastructure stacks",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Log orchestration steps at debug level (`RIGSTACK_LOG` overrides).
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    /// Provider to act on.
    #[command(subcommand)]
    pub(crate) command: ProviderCommand,
}

/// Providers understood by `rigstack`.
#[derive(Debug, Subcommand)]
pub(crate) enum ProviderCommand {
    /// Manage rigs backed by an AWS stack.
    #[command(subcommand)]
    Aws(AwsCommand),
    /// Inspect Paperspace machines and plan new ones.
    #[command(subcommand)]
    Paperspace(PaperspaceCommand),
}

/// Actions on AWS rig stacks.
#[derive(Debug, Subcommand)]
pub(crate) enum AwsCommand {
    /// Create or update a rig and print its instance id and address.
    Up(AwsUpCommand),
    /// Tear down every resource of a rig.
    Destroy(StackNameArgs),
}

/// Arguments naming an existing rig stack.
#[derive(Debug, Args)]
pub(crate) struct StackNameArgs {
    /// Logical rig name; also the stack name.
    #[arg(value_name = "NAME")]
    pub(crate) name: String,
}

/// Arguments for `rigstack aws up`.
#[derive(Debug, Args)]
pub(crate) struct AwsUpCommand {
    /// Logical rig name; also the stack name.
    #[arg(value_name = "NAME")]
    pub(crate) name: String,
    /// AWS region to deploy into.
    #[arg(long, value_name = "REGION", env = "AWS_REGION")]
    pub(crate) region: String,
    /// EC2 instance type.
    #[arg(long, value_name = "TYPE", default_value = "g4dn.xlarge")]
    pub(crate) instance_type: String,
    /// Root volume size in GiB.
    #[arg(long, value_name = "GIB", default_value_t = 100)]
    pub(crate) root_volume_size: u32,
    /// Public address mode: `static` keeps the address across replacement,
    /// `dynamic` releases it with the instance.
    #[arg(long, value_name = "MODE", default_value = "static")]
    pub(crate) public_ip_type: String,
    /// OpenSSH public key file installed on the rig.
    #[arg(
        long,
        value_name = "PATH",
        conflicts_with = "ssh_key",
        required_unless_present = "ssh_key"
    )]
    pub(crate) ssh_key_file: Option<String>,
    /// OpenSSH public key given inline.
    #[arg(long, value_name = "KEY")]
    pub(crate) ssh_key: Option<String>,
}

/// Read-only Paperspace actions.
#[derive(Debug, Subcommand)]
pub(crate) enum PaperspaceCommand {
    /// List machines visible to the API key.
    List(PaperspaceAuthArgs),
    /// Resolve an existing machine or validate arguments for a new one.
    Resolve(PaperspaceResolveCommand),
}

/// Credentials for Paperspace commands.
#[derive(Debug, Args)]
pub(crate) struct PaperspaceAuthArgs {
    /// API key; falls back to `PAPERSPACE_API_KEY` or `rigstack.toml`.
    #[arg(long, value_name = "KEY")]
    pub(crate) api_key: Option<String>,
}

/// Arguments for `rigstack paperspace resolve`.
#[derive(Debug, Args)]
pub(crate) struct PaperspaceResolveCommand {
    /// Credentials for the control plane.
    #[command(flatten)]
    pub(crate) auth: PaperspaceAuthArgs,
    /// Reuse this machine (id or name) instead of planning a new one.
    #[arg(long, value_name = "MACHINE")]
    pub(crate) existing: Option<String>,
    /// Machine type for a new machine.
    #[arg(long, value_name = "TYPE")]
    pub(crate) machine_type: Option<String>,
    /// Disk size in GB for a new machine.
    #[arg(long, value_name = "GB")]
    pub(crate) disk_size: Option<u32>,
    /// Public address mode for a new machine.
    #[arg(long, value_name = "MODE")]
    pub(crate) public_ip_type: Option<String>,
    /// Region for a new machine, for example "East Coast (NY2)".
    #[arg(long, value_name = "REGION")]
    pub(crate) region: Option<String>,
}
