//! Shared fixtures for rig stack BDD scenarios.

use rigstack::aws::{AwsDriver, AwsStackConfig, AwsStackOutput};
use rigstack::program::PublicIpType;
use rigstack::stack::StackError;
use rstest::fixture;

use super::test_doubles::{SimulatedCloud, SimulatedCloudError};
use crate::test_constants::{DEFAULT_REGION, SSH_PUBLIC_KEY};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FailureKind {
    Identity,
    Config,
    Engine,
    Output,
}

#[derive(Clone, Debug)]
pub struct StackFailure {
    pub kind: FailureKind,
    pub retryable: bool,
    pub message: String,
}

impl From<&StackError<SimulatedCloudError>> for StackFailure {
    fn from(err: &StackError<SimulatedCloudError>) -> Self {
        let kind = match err {
            StackError::Identity(_) => FailureKind::Identity,
            StackError::Config { .. } => FailureKind::Config,
            StackError::Engine { .. } => FailureKind::Engine,
            StackError::OutputValidation { .. } => FailureKind::Output,
        };
        Self {
            kind,
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StackContext {
    pub cloud: SimulatedCloud,
    pub stack_name: String,
    pub config: AwsStackConfig,
    pub outputs: Vec<AwsStackOutput>,
    pub failure: Option<StackFailure>,
}

impl StackContext {
    pub fn driver(&self) -> Result<AwsDriver<SimulatedCloud>, StackFailure> {
        AwsDriver::new(self.cloud.clone(), &self.stack_name).map_err(|err| StackFailure::from(&err))
    }

    pub fn last_output(&self) -> Option<&AwsStackOutput> {
        self.outputs.last()
    }
}

pub fn rig_config(public_ip_type: PublicIpType, root_volume_size_gb: u32) -> AwsStackConfig {
    AwsStackConfig {
        region: String::from(DEFAULT_REGION),
        instance_type: String::from("g4dn.xlarge"),
        root_volume_size_gb,
        public_ssh_key_content: String::from(SSH_PUBLIC_KEY),
        public_ip_type,
    }
}

#[fixture]
pub fn stack_context() -> StackContext {
    StackContext {
        cloud: SimulatedCloud::new(),
        stack_name: String::from("rig"),
        config: rig_config(PublicIpType::Static, 100),
        outputs: Vec::new(),
        failure: None,
    }
}
