//! Provider-neutral building blocks shared by resource composition units.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// IPv4 range that admits every address.
pub const UNRESTRICTED_IPV4: &str = "0.0.0.0/0";
/// IPv6 range that admits every address.
pub const UNRESTRICTED_IPV6: &str = "::/0";

/// Errors raised while assembling a resource graph from caller input.
///
/// Every variant is raised before any resource is declared.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DeclarationError {
    /// Raised when both a public key and an existing key pair are supplied.
    #[error(
        "existingKeyPair and publicKeyContent are mutually exclusive, only set one or the other"
    )]
    ConflictingKeyMaterial,
    /// Raised when neither a public key nor an existing key pair is supplied.
    #[error("one of publicKeyContent or existingKeyPair is required")]
    MissingKeyMaterial,
    /// Raised when the public IP mode is not recognised.
    #[error("publicIpType must be either 'static' or 'dynamic', got '{0}'")]
    InvalidPublicIpType(String),
    /// Raised when a port rule names an unknown protocol.
    #[error("unsupported protocol '{0}': expected tcp, udp, icmp or all")]
    InvalidProtocol(String),
    /// Raised when a port rule ends before it starts.
    #[error("port range {from}-{to} is inverted")]
    InvertedPortRange {
        /// First port of the range.
        from: u16,
        /// Last port of the range.
        to: u16,
    },
    /// Raised when two volumes share a device name.
    #[error("device name '{0}' is used by more than one volume")]
    DuplicateDeviceName(String),
    /// Raised when a volume is declared without a device name.
    #[error("volume device name must not be empty")]
    EmptyDeviceName,
    /// Raised when a volume has no capacity.
    #[error("volume {device_name} must be larger than 0 GiB")]
    EmptyVolume {
        /// Device name of the offending volume.
        device_name: String,
    },
    /// Raised when a required composition argument is blank.
    #[error("missing or empty field: {0}")]
    MissingField(String),
    /// Raised when two declarations claim the same logical name.
    #[error("resource name '{0}' is declared more than once")]
    DuplicateResource(String),
}

/// Network protocol admitted by an inbound rule.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Protocol {
    /// Transmission Control Protocol.
    Tcp,
    /// User Datagram Protocol.
    Udp,
    /// Internet Control Message Protocol.
    Icmp,
    /// Every protocol.
    #[default]
    All,
}

impl Protocol {
    /// Returns the provider token for the protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::All => "all",
        }
    }
}

impl FromStr for Protocol {
    type Err = DeclarationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "icmp" => Ok(Self::Icmp),
            "all" | "-1" => Ok(Self::All),
            _ => Err(DeclarationError::InvalidProtocol(value.to_owned())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Inbound exposure for a port or port range.
///
/// Outbound traffic is never described here: composition units always
/// declare unrestricted egress.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortRule {
    from: u16,
    to: u16,
    protocol: Protocol,
    ipv4_ranges: Vec<String>,
    ipv6_ranges: Vec<String>,
}

impl PortRule {
    /// Opens a single port for every protocol from anywhere.
    #[must_use]
    pub fn new(from: u16) -> Self {
        Self {
            from,
            to: from,
            protocol: Protocol::All,
            ipv4_ranges: vec![String::from(UNRESTRICTED_IPV4)],
            ipv6_ranges: vec![String::from(UNRESTRICTED_IPV6)],
        }
    }

    /// Opens a single TCP port.
    #[must_use]
    pub fn tcp(port: u16) -> Self {
        Self::new(port).protocol(Protocol::Tcp)
    }

    /// Opens a single UDP port.
    #[must_use]
    pub fn udp(port: u16) -> Self {
        Self::new(port).protocol(Protocol::Udp)
    }

    /// Extends the rule to a range ending at `to` (inclusive).
    #[must_use]
    pub const fn to(mut self, to: u16) -> Self {
        self.to = to;
        self
    }

    /// Restricts the rule to one protocol.
    #[must_use]
    pub const fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Replaces the admitted IPv4 ranges.
    #[must_use]
    pub fn ipv4_ranges<I, S>(mut self, ranges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ipv4_ranges = ranges.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the admitted IPv6 ranges.
    #[must_use]
    pub fn ipv6_ranges<I, S>(mut self, ranges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ipv6_ranges = ranges.into_iter().map(Into::into).collect();
        self
    }

    /// First port of the rule.
    #[must_use]
    pub const fn from_port(&self) -> u16 {
        self.from
    }

    /// Last port of the rule.
    #[must_use]
    pub const fn to_port(&self) -> u16 {
        self.to
    }

    /// Protocol admitted by the rule.
    #[must_use]
    pub const fn protocol_kind(&self) -> Protocol {
        self.protocol
    }

    /// Admitted IPv4 ranges.
    #[must_use]
    pub fn ipv4(&self) -> &[String] {
        &self.ipv4_ranges
    }

    /// Admitted IPv6 ranges.
    #[must_use]
    pub fn ipv6(&self) -> &[String] {
        &self.ipv6_ranges
    }

    /// Checks the port range ordering.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::InvertedPortRange`] when `to < from`.
    pub const fn validate(&self) -> Result<(), DeclarationError> {
        if self.to < self.from {
            return Err(DeclarationError::InvertedPortRange {
                from: self.from,
                to: self.to,
            });
        }
        Ok(())
    }
}

/// Additional block volume attached to the primary instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeSpec {
    /// Capacity in GiB.
    pub size_gib: u32,
    /// Provider volume type (for example `gp3`).
    pub volume_type: Option<String>,
    /// Device name used for the attachment; unique within one graph.
    pub device_name: String,
    /// Whether the volume is encrypted at rest.
    pub encrypted: bool,
    /// Availability zone; defaults to the instance's zone when absent.
    pub availability_zone: Option<String>,
    /// Provisioned IOPS.
    pub iops: Option<u32>,
    /// Provisioned throughput in MiB/s.
    pub throughput: Option<u32>,
}

impl VolumeSpec {
    /// Creates an encrypted volume in the instance's zone.
    #[must_use]
    pub fn new(device_name: impl Into<String>, size_gib: u32) -> Self {
        Self {
            size_gib,
            volume_type: None,
            device_name: device_name.into().trim().to_owned(),
            encrypted: true,
            availability_zone: None,
            iops: None,
            throughput: None,
        }
    }

    /// Sets the provider volume type.
    #[must_use]
    pub fn volume_type(mut self, value: impl Into<String>) -> Self {
        self.volume_type = Some(value.into());
        self
    }

    /// Overrides encryption at rest.
    #[must_use]
    pub const fn encrypted(mut self, value: bool) -> Self {
        self.encrypted = value;
        self
    }

    /// Pins the volume to an explicit availability zone.
    #[must_use]
    pub fn availability_zone(mut self, value: impl Into<String>) -> Self {
        self.availability_zone = Some(value.into());
        self
    }

    /// Sets provisioned IOPS.
    #[must_use]
    pub const fn iops(mut self, value: u32) -> Self {
        self.iops = Some(value);
        self
    }

    /// Sets provisioned throughput.
    #[must_use]
    pub const fn throughput(mut self, value: u32) -> Self {
        self.throughput = Some(value);
        self
    }

    /// Slug used inside logical resource names.
    #[must_use]
    pub fn name_slug(&self) -> String {
        slugify(&self.device_name)
    }
}

/// Validates a volume list before any of it is declared.
///
/// Device names are the join key between a volume and its attachment, so
/// both the raw names and their slugs must be unique.
///
/// # Errors
///
/// Returns [`DeclarationError`] for empty, zero-sized or duplicated volumes.
pub fn validate_volumes(volumes: &[VolumeSpec]) -> Result<(), DeclarationError> {
    let mut device_names = BTreeSet::new();
    let mut slugs = BTreeSet::new();
    for volume in volumes {
        if volume.device_name.is_empty() {
            return Err(DeclarationError::EmptyDeviceName);
        }
        if volume.size_gib == 0 {
            return Err(DeclarationError::EmptyVolume {
                device_name: volume.device_name.clone(),
            });
        }
        if !device_names.insert(volume.device_name.as_str()) || !slugs.insert(volume.name_slug()) {
            return Err(DeclarationError::DuplicateDeviceName(
                volume.device_name.clone(),
            ));
        }
    }
    Ok(())
}

/// Credential artifact bound to the instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyMaterial {
    /// Create a new key pair from the supplied public key content.
    New {
        /// OpenSSH public key content.
        public_key: String,
    },
    /// Bind to a key pair that already exists with the provider.
    Existing {
        /// Provider-side key pair name.
        key_name: String,
    },
}

impl KeyMaterial {
    /// Decides the key material from the two mutually exclusive options.
    ///
    /// Blank values count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::ConflictingKeyMaterial`] when both are
    /// supplied and [`DeclarationError::MissingKeyMaterial`] when neither is.
    pub fn from_options(
        public_key_content: Option<String>,
        existing_key_pair: Option<String>,
    ) -> Result<Self, DeclarationError> {
        let public_key = non_blank(public_key_content);
        let key_name = non_blank(existing_key_pair);
        match (public_key, key_name) {
            (Some(_), Some(_)) => Err(DeclarationError::ConflictingKeyMaterial),
            (Some(public_key), None) => Ok(Self::New { public_key }),
            (None, Some(key_name)) => Ok(Self::Existing { key_name }),
            (None, None) => Err(DeclarationError::MissingKeyMaterial),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|inner| inner.trim().to_owned())
        .filter(|inner| !inner.is_empty())
}

/// Public address allocation mode.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum PublicIpType {
    /// Address that survives instance replacement.
    #[default]
    Static,
    /// Address assigned at launch and released with the instance.
    Dynamic,
}

impl PublicIpType {
    /// Returns the configuration token for the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        }
    }
}

impl FromStr for PublicIpType {
    type Err = DeclarationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "static" => Ok(Self::Static),
            "dynamic" => Ok(Self::Dynamic),
            other => Err(DeclarationError::InvalidPublicIpType(other.to_owned())),
        }
    }
}

impl fmt::Display for PublicIpType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Lowercases `value` and collapses runs of non-alphanumerics into `-`.
#[must_use]
pub fn slugify(value: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_matches('-').to_owned()
}
