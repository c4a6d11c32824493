//! Core library for the RigStack remote rig provisioner.
//!
//! The crate drives one infrastructure stack per rig through a generic
//! [`StackDriver`]: typed configuration goes in, the provider program
//! declares the rig's resources, the [`Engine`] reconciles them and typed
//! outputs come back. AWS is the bundled provider, Pulumi the bundled
//! engine, and Paperspace machines can be reused without a stack at all.

pub mod aws;
pub mod command;
pub mod config;
pub mod logging;
pub mod paperspace;
pub mod program;
pub mod pulumi;
pub mod stack;
pub mod test_support;
pub mod workflow;

pub use aws::{AwsDriver, AwsStack, AwsStackConfig, AwsStackOutput};
pub use command::{CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{ConfigError, EngineConfig, PaperspaceConfig};
pub use paperspace::{ControlPlane, Machine, PaperspaceClient, PaperspaceError};
pub use program::{DeclaredStack, Program, ProgramContext, ProgramError, PublicIpType};
pub use pulumi::{PulumiEngine, PulumiError};
pub use stack::{
    ConfigMap, Engine, OutputMap, OutputValidationError, StackContract, StackDriver, StackError,
    StackIdentity,
};
pub use workflow::{
    AwsIntent, ExistingMachine, PaperspaceCreateArgs, PaperspaceIntent, ProvisionPlan,
    SshKeySource, WorkflowError,
};
