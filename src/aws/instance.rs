//! EC2 resource composition unit.
//!
//! [`declare`] adds one instance's complete graph to a [`DeclaredStack`]:
//! security group, key material, the instance itself, any additional EBS
//! volumes with their attachments, and an optional Elastic IP. All inputs
//! are validated by [`InstanceArgsBuilder::build`], so a graph is either
//! declared completely or not at all.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::program::{
    DeclarationError, DeclaredStack, KeyMaterial, PortRule, PublicIpType, Reference, Resource,
    UNRESTRICTED_IPV4, UNRESTRICTED_IPV6, VolumeSpec, validate_volumes,
};

/// Prefix of every cloud-side name and `Name` tag.
pub const NAME_PREFIX: &str = "RigStack";

/// Root block device settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RootVolume {
    /// Capacity in GiB; the image default applies when absent.
    pub size_gib: Option<u32>,
    /// EBS volume type (for example `gp3`).
    pub volume_type: Option<String>,
    /// Whether the root device is encrypted at rest.
    pub encrypted: bool,
}

impl Default for RootVolume {
    fn default() -> Self {
        Self {
            size_gib: None,
            volume_type: None,
            encrypted: true,
        }
    }
}

/// Validated inputs for one EC2 composition.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceArgs {
    /// VPC hosting the security group; the default VPC when absent.
    pub vpc_id: Option<String>,
    /// Subnet hosting the instance; the default subnet when absent.
    pub subnet_id: Option<String>,
    /// Inbound exposure. Egress is always unrestricted.
    pub ingress: Vec<PortRule>,
    /// Key pair created or referenced for SSH access.
    pub key_material: KeyMaterial,
    /// Leaves a created key pair untouched when its public key changes.
    pub ignore_public_key_changes: bool,
    /// Tags applied to every taggable resource, besides `Name`.
    pub tags: BTreeMap<String, String>,
    /// Image identifier, literal or computed.
    pub image: Value,
    /// EC2 instance type.
    pub instance_type: String,
    /// Public address allocation mode.
    pub public_ip_type: PublicIpType,
    /// Root block device settings.
    pub root_volume: RootVolume,
    /// Additional EBS volumes keyed by device name.
    pub additional_volumes: Vec<VolumeSpec>,
}

impl InstanceArgs {
    /// Starts a builder for [`InstanceArgs`].
    #[must_use]
    pub fn builder() -> InstanceArgsBuilder {
        InstanceArgsBuilder::default()
    }
}

/// Builder for [`InstanceArgs`] that defers validation to [`Self::build`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceArgsBuilder {
    vpc_id: Option<String>,
    subnet_id: Option<String>,
    ingress: Vec<PortRule>,
    public_key_content: Option<String>,
    existing_key_pair: Option<String>,
    ignore_public_key_changes: bool,
    tags: BTreeMap<String, String>,
    image: Option<Value>,
    instance_type: String,
    public_ip_type: String,
    root_volume: RootVolume,
    additional_volumes: Vec<VolumeSpec>,
}

impl InstanceArgsBuilder {
    /// Places the security group in a specific VPC.
    #[must_use]
    pub fn vpc_id(mut self, value: impl Into<String>) -> Self {
        self.vpc_id = Some(value.into());
        self
    }

    /// Places the instance in a specific subnet.
    #[must_use]
    pub fn subnet_id(mut self, value: impl Into<String>) -> Self {
        self.subnet_id = Some(value.into());
        self
    }

    /// Sets the inbound rules.
    #[must_use]
    pub fn ingress(mut self, rules: Vec<PortRule>) -> Self {
        self.ingress = rules;
        self
    }

    /// Creates a new key pair from OpenSSH public key content.
    #[must_use]
    pub fn public_key_content(mut self, value: impl Into<String>) -> Self {
        self.public_key_content = Some(value.into());
        self
    }

    /// Binds an existing key pair by name.
    #[must_use]
    pub fn existing_key_pair(mut self, value: impl Into<String>) -> Self {
        self.existing_key_pair = Some(value.into());
        self
    }

    /// Ignores public key drift on a created key pair.
    #[must_use]
    pub const fn ignore_public_key_changes(mut self, value: bool) -> Self {
        self.ignore_public_key_changes = value;
        self
    }

    /// Adds one tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets the image, either an AMI id or a computed reference.
    #[must_use]
    pub fn image(mut self, value: impl Into<Value>) -> Self {
        self.image = Some(value.into());
        self
    }

    /// Sets the instance type.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.instance_type = value.into();
        self
    }

    /// Sets the public address mode, `static` or `dynamic`.
    #[must_use]
    pub fn public_ip_type(mut self, value: impl Into<String>) -> Self {
        self.public_ip_type = value.into();
        self
    }

    /// Replaces the root block device settings.
    #[must_use]
    pub fn root_volume(mut self, value: RootVolume) -> Self {
        self.root_volume = value;
        self
    }

    /// Adds an EBS volume.
    #[must_use]
    pub fn additional_volume(mut self, value: VolumeSpec) -> Self {
        self.additional_volumes.push(value);
        self
    }

    /// Validates every input.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError`] for conflicting or missing key material,
    /// an unknown public IP mode, a missing image or instance type, inverted
    /// port ranges and invalid volume lists.
    pub fn build(self) -> Result<InstanceArgs, DeclarationError> {
        let key_material =
            KeyMaterial::from_options(self.public_key_content, self.existing_key_pair)?;
        let public_ip_type = self.public_ip_type.parse::<PublicIpType>()?;
        let instance_type = self.instance_type.trim().to_owned();
        if instance_type.is_empty() {
            return Err(DeclarationError::MissingField(String::from("instance_type")));
        }
        let image = match self.image {
            Some(Value::String(ref id)) if id.trim().is_empty() => None,
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        }
        .ok_or_else(|| DeclarationError::MissingField(String::from("image")))?;
        for rule in &self.ingress {
            rule.validate()?;
        }
        validate_volumes(&self.additional_volumes)?;
        Ok(InstanceArgs {
            vpc_id: self.vpc_id,
            subnet_id: self.subnet_id,
            ingress: self.ingress,
            key_material,
            ignore_public_key_changes: self.ignore_public_key_changes,
            tags: self.tags,
            image,
            instance_type,
            public_ip_type,
            root_volume: self.root_volume,
            additional_volumes: self.additional_volumes,
        })
    }
}

/// Values exposed by a declared composition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RigInstance {
    /// Identifier of the EC2 instance.
    pub instance_id: Reference,
    /// Elastic IP when static, otherwise the instance's launch address.
    pub public_ip: Reference,
}

/// Declares the complete graph for the instance called `name`.
///
/// Resource logical names are all derived from `name`, so two compositions
/// in one stack, or in two stacks, never collide.
///
/// # Errors
///
/// Returns [`DeclarationError::MissingField`] for a blank name and
/// [`DeclarationError::DuplicateResource`] when `name` was already used in
/// `stack`.
pub fn declare(
    instance_name: &str,
    args: &InstanceArgs,
    stack: &mut DeclaredStack,
) -> Result<RigInstance, DeclarationError> {
    let name = instance_name.trim();
    if name.is_empty() {
        return Err(DeclarationError::MissingField(String::from("name")));
    }
    let cloud_name = format!("{NAME_PREFIX}-{name}");
    let mut named_tags = args.tags.clone();
    named_tags.insert(String::from("Name"), cloud_name.clone());
    let tags = tag_value(&named_tags);

    let security_group = stack.declare(
        format!("{name}-sg"),
        Resource::new("aws:ec2:SecurityGroup")
            .optional_property("vpcId", args.vpc_id.clone())
            .property("ingress", ingress_rules(&args.ingress))
            .property("egress", json!([unrestricted_egress()]))
            .property("name", cloud_name.as_str())
            .property("tags", tags.clone()),
    )?;

    let key_name = match &args.key_material {
        KeyMaterial::New { public_key } => {
            let mut resource = Resource::new("aws:ec2:KeyPair")
                .property("publicKey", public_key.as_str())
                .property("keyName", cloud_name.as_str());
            if args.ignore_public_key_changes {
                resource = resource.ignore_changes(&["publicKey"]);
            }
            let key_pair = stack.declare(format!("{name}-keypair"), resource)?;
            Value::from(key_pair.output("keyName"))
        }
        KeyMaterial::Existing { key_name } => Value::from(key_name.as_str()),
    };

    let mut root_block_device = Map::new();
    root_block_device.insert(
        String::from("encrypted"),
        Value::Bool(args.root_volume.encrypted),
    );
    if let Some(size) = args.root_volume.size_gib {
        root_block_device.insert(String::from("volumeSize"), Value::from(size));
    }
    if let Some(volume_type) = &args.root_volume.volume_type {
        root_block_device.insert(String::from("volumeType"), Value::from(volume_type.as_str()));
    }

    let instance = stack.declare(
        format!("{name}-ec2-instance"),
        Resource::new("aws:ec2:Instance")
            .property("ami", args.image.clone())
            .property("instanceType", args.instance_type.as_str())
            .property("tags", tags.clone())
            .property("volumeTags", tag_value(&args.tags))
            .property("vpcSecurityGroupIds", json!([security_group.output("id")]))
            .property("keyName", key_name)
            .property("rootBlockDevice", root_block_device)
            .optional_property("subnetId", args.subnet_id.clone())
            .property("associatePublicIpAddress", true)
            .ignore_changes(&["associatePublicIpAddress"]),
    )?;

    for volume in &args.additional_volumes {
        let slug = volume.name_slug();
        let zone = volume
            .availability_zone
            .clone()
            .map_or_else(|| Value::from(instance.output("availabilityZone")), Value::from);
        let ebs = stack.declare(
            format!("{name}-volume-{slug}"),
            Resource::new("aws:ebs:Volume")
                .property("encrypted", volume.encrypted)
                .property("availabilityZone", zone)
                .property("size", volume.size_gib)
                .optional_property("type", volume.volume_type.clone())
                .optional_property("iops", volume.iops)
                .optional_property("throughput", volume.throughput)
                .property("tags", tags.clone()),
        )?;
        stack.declare(
            format!("{name}-volume-attach-{slug}"),
            Resource::new("aws:ec2:VolumeAttachment")
                .property("deviceName", volume.device_name.as_str())
                .property("volumeId", ebs.output("id"))
                .property("instanceId", instance.output("id")),
        )?;
    }

    let public_ip = match args.public_ip_type {
        PublicIpType::Static => {
            let eip = stack.declare(
                format!("{name}-eip"),
                Resource::new("aws:ec2:Eip").property("tags", tags),
            )?;
            stack.declare(
                format!("{name}-eip-assoc"),
                Resource::new("aws:ec2:EipAssociation")
                    .property("instanceId", instance.output("id"))
                    .property("allocationId", eip.output("id"))
                    .depends_on(instance.reference()),
            )?;
            eip.output("publicIp")
        }
        PublicIpType::Dynamic => instance.output("publicIp"),
    };

    Ok(RigInstance {
        instance_id: instance.output("id"),
        public_ip,
    })
}

fn tag_value(tags: &BTreeMap<String, String>) -> Value {
    Value::Object(
        tags.iter()
            .map(|(key, value)| (key.clone(), Value::from(value.as_str())))
            .collect(),
    )
}

fn ingress_rules(rules: &[PortRule]) -> Value {
    Value::Array(
        rules
            .iter()
            .map(|rule| {
                json!({
                    "fromPort": rule.from_port(),
                    "toPort": rule.to_port(),
                    "protocol": rule.protocol_kind().as_str(),
                    "cidrBlocks": rule.ipv4(),
                    "ipv6CidrBlocks": rule.ipv6(),
                })
            })
            .collect(),
    )
}

fn unrestricted_egress() -> Value {
    json!({
        "fromPort": 0,
        "toPort": 0,
        "protocol": "-1",
        "cidrBlocks": [UNRESTRICTED_IPV4],
        "ipv6CidrBlocks": [UNRESTRICTED_IPV6],
    })
}
