//! Shared fixtures for existing-machine workflow scenarios.

use rigstack::workflow::ProvisionPlan;
use rstest::fixture;

use super::test_doubles::StaticControlPlane;

#[derive(Clone, Debug)]
pub struct WorkflowContext {
    pub control_plane: StaticControlPlane,
    pub plan: Option<ProvisionPlan>,
    pub error: Option<String>,
}

#[fixture]
pub fn workflow_context() -> WorkflowContext {
    WorkflowContext {
        control_plane: StaticControlPlane::default(),
        plan: None,
        error: None,
    }
}
