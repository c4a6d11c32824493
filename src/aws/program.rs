//! Provisioning program for AWS rigs.

use serde_json::json;

use crate::program::{DeclaredStack, Invoke, PortRule, ProgramContext, ProgramError, Reference};

use super::instance::{self, InstanceArgs, RootVolume};
use super::{
    INSTANCE_ID_OUTPUT, INSTANCE_TYPE_KEY, PUBLIC_IP_OUTPUT, PUBLIC_IP_TYPE_KEY,
    PUBLIC_SSH_KEY_KEY, ROOT_VOLUME_SIZE_KEY,
};

/// Owner account publishing the Ubuntu images.
pub const UBUNTU_IMAGE_OWNER: &str = "099720109477";
/// Image name pattern for Ubuntu 22.04 on HVM SSD.
pub const UBUNTU_IMAGE_PATTERN: &str = "ubuntu/images/hvm-ssd/ubuntu-jammy-22.04-amd64-server-*";
/// Variable holding the resolved image id.
pub const IMAGE_VARIABLE: &str = "ubuntuAmi";

const ROOT_VOLUME_TYPE: &str = "gp3";

/// Inbound rules for SSH and game streaming.
#[must_use]
pub fn streaming_ports() -> Vec<PortRule> {
    vec![
        PortRule::tcp(22),
        PortRule::tcp(47984),
        PortRule::tcp(47989),
        PortRule::tcp(48010),
        PortRule::udp(47999),
        // video and audio, one port per concurrent client
        PortRule::udp(48100).to(48110),
        PortRule::udp(48200).to(48210),
    ]
}

/// Declares one rig named after the stack.
///
/// Reads `instanceType`, `rootVolumeSizeGB`, `publicIpType` and
/// `publicSshKeyContent`. The region is consumed by the AWS provider from
/// `aws:region` and never read here.
///
/// # Errors
///
/// Returns [`ProgramError`] when a key is missing or malformed, or when the
/// composition rejects the resulting arguments.
pub fn aws_program(ctx: &ProgramContext) -> Result<DeclaredStack, ProgramError> {
    let instance_type = ctx.require(INSTANCE_TYPE_KEY)?;
    let root_volume_size = ctx.require_number::<u32>(ROOT_VOLUME_SIZE_KEY)?;
    let public_ip_type = ctx.require(PUBLIC_IP_TYPE_KEY)?;
    let public_key = ctx.require(PUBLIC_SSH_KEY_KEY)?;
    if root_volume_size == 0 {
        return Err(ProgramError::InvalidConfig {
            key: ROOT_VOLUME_SIZE_KEY.to_owned(),
            value: root_volume_size.to_string(),
            reason: String::from("root volume must be larger than 0 GiB"),
        });
    }

    let args = InstanceArgs::builder()
        .image(Reference::variable(IMAGE_VARIABLE))
        .instance_type(instance_type)
        .public_key_content(public_key)
        .ignore_public_key_changes(true)
        .public_ip_type(public_ip_type)
        .root_volume(RootVolume {
            size_gib: Some(root_volume_size),
            volume_type: Some(ROOT_VOLUME_TYPE.to_owned()),
            encrypted: true,
        })
        .ingress(streaming_ports())
        .build()?;

    let mut stack = DeclaredStack::new();
    stack.invoke(
        IMAGE_VARIABLE,
        Invoke::new(
            "aws:ec2:getAmi",
            json!({
                "mostRecent": true,
                "filters": [
                    {"name": "name", "values": [UBUNTU_IMAGE_PATTERN]},
                    {"name": "virtualization-type", "values": ["hvm"]},
                ],
                "owners": [UBUNTU_IMAGE_OWNER],
            }),
        )
        .returning("id"),
    )?;
    let rig = instance::declare(ctx.stack_name(), &args, &mut stack)?;
    stack.export(INSTANCE_ID_OUTPUT, rig.instance_id);
    stack.export(PUBLIC_IP_OUTPUT, rig.public_ip);
    Ok(stack)
}
