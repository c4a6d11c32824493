//! AWS stack contract, EC2 composition unit and provisioning program.

mod instance;
mod program;

use std::net::IpAddr;

use crate::program::{Program, ProgramError, PublicIpType};
use crate::stack::{
    OutputMap, OutputValidationError, StackContract, StackDriver, require_ip_output,
    require_string_output,
};

pub use instance::{
    InstanceArgs, InstanceArgsBuilder, NAME_PREFIX, RigInstance, RootVolume, declare,
};
pub use program::{
    IMAGE_VARIABLE, UBUNTU_IMAGE_OWNER, UBUNTU_IMAGE_PATTERN, aws_program, streaming_ports,
};

/// Project holding every AWS rig stack.
pub const PROJECT_NAME: &str = "RigStack-AWS";

/// Stored key for the provider region.
pub const REGION_KEY: &str = "aws:region";
/// Stored key for the EC2 instance type.
pub const INSTANCE_TYPE_KEY: &str = "instanceType";
/// Stored key for the root volume size in GiB.
pub const ROOT_VOLUME_SIZE_KEY: &str = "rootVolumeSizeGB";
/// Stored key for the SSH public key content.
pub const PUBLIC_SSH_KEY_KEY: &str = "publicSshKeyContent";
/// Stored key for the public address mode.
pub const PUBLIC_IP_TYPE_KEY: &str = "publicIpType";

/// Output holding the EC2 instance id.
pub const INSTANCE_ID_OUTPUT: &str = "instanceId";
/// Output holding the reachable public address.
pub const PUBLIC_IP_OUTPUT: &str = "publicIp";

/// Configuration pushed into an AWS rig stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AwsStackConfig {
    /// AWS region, for example `eu-west-3`.
    pub region: String,
    /// EC2 instance type, for example `g4dn.xlarge`.
    pub instance_type: String,
    /// Root volume size in GiB.
    pub root_volume_size_gb: u32,
    /// OpenSSH public key installed on the instance.
    pub public_ssh_key_content: String,
    /// Public address allocation mode.
    pub public_ip_type: PublicIpType,
}

/// Outputs read back from an applied AWS rig stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AwsStackOutput {
    /// EC2 instance id.
    pub instance_id: String,
    /// Reachable public address.
    pub public_ip: IpAddr,
}

/// Contract binding [`AwsStackConfig`], [`AwsStackOutput`] and
/// [`aws_program`].
#[derive(Clone, Copy, Debug)]
pub struct AwsStack;

/// Driver for AWS rig stacks.
pub type AwsDriver<E> = StackDriver<E, AwsStack>;

impl StackContract for AwsStack {
    type Config = AwsStackConfig;
    type Output = AwsStackOutput;

    const PROJECT_NAME: &'static str = PROJECT_NAME;
    const PROGRAM: Program = aws_program;

    fn config_entries(config: &Self::Config) -> Vec<(&'static str, String)> {
        vec![
            (REGION_KEY, config.region.trim().to_owned()),
            (INSTANCE_TYPE_KEY, config.instance_type.trim().to_owned()),
            (ROOT_VOLUME_SIZE_KEY, config.root_volume_size_gb.to_string()),
            (
                PUBLIC_SSH_KEY_KEY,
                config.public_ssh_key_content.trim().to_owned(),
            ),
            (PUBLIC_IP_TYPE_KEY, config.public_ip_type.to_string()),
        ]
    }

    fn validate_config(config: &Self::Config) -> Result<(), ProgramError> {
        for (key, value) in [
            (REGION_KEY, &config.region),
            (INSTANCE_TYPE_KEY, &config.instance_type),
            (PUBLIC_SSH_KEY_KEY, &config.public_ssh_key_content),
        ] {
            if value.trim().is_empty() {
                return Err(ProgramError::MissingConfig {
                    key: key.to_owned(),
                });
            }
        }
        if config.root_volume_size_gb == 0 {
            return Err(ProgramError::InvalidConfig {
                key: ROOT_VOLUME_SIZE_KEY.to_owned(),
                value: String::from("0"),
                reason: String::from("root volume must be larger than 0 GiB"),
            });
        }
        Ok(())
    }

    fn build_typed_output(outputs: &OutputMap) -> Result<Self::Output, OutputValidationError> {
        Ok(AwsStackOutput {
            instance_id: require_string_output(outputs, INSTANCE_ID_OUTPUT)?,
            public_ip: require_ip_output(outputs, PUBLIC_IP_OUTPUT)?,
        })
    }
}
