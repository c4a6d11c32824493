//! BDD scenarios for the rig stack lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{StackContext, stack_context};

#[scenario(
    path = "tests/features/stack_lifecycle.feature",
    name = "Provision a rig with a static address"
)]
fn scenario_static_address(stack_context: StackContext) {
    let _ = stack_context;
}

#[scenario(
    path = "tests/features/stack_lifecycle.feature",
    name = "Provision a rig with a dynamic address"
)]
fn scenario_dynamic_address(stack_context: StackContext) {
    let _ = stack_context;
}

#[scenario(
    path = "tests/features/stack_lifecycle.feature",
    name = "Re-applying identical configuration keeps the instance"
)]
fn scenario_idempotent_apply(stack_context: StackContext) {
    let _ = stack_context;
}

#[scenario(
    path = "tests/features/stack_lifecycle.feature",
    name = "Growing the root volume keeps the instance"
)]
fn scenario_root_volume_resize(stack_context: StackContext) {
    let _ = stack_context;
}

#[scenario(
    path = "tests/features/stack_lifecycle.feature",
    name = "Rotating the SSH key keeps the instance"
)]
fn scenario_ssh_key_rotation(stack_context: StackContext) {
    let _ = stack_context;
}

#[scenario(
    path = "tests/features/stack_lifecycle.feature",
    name = "A locked stack fails fast with a retryable engine error"
)]
fn scenario_locked_stack(stack_context: StackContext) {
    let _ = stack_context;
}

#[scenario(
    path = "tests/features/stack_lifecycle.feature",
    name = "Missing outputs are reported instead of defaulted"
)]
fn scenario_missing_output(stack_context: StackContext) {
    let _ = stack_context;
}

#[scenario(
    path = "tests/features/stack_lifecycle.feature",
    name = "A stored public IP type outside static and dynamic never reaches the engine"
)]
fn scenario_invalid_stored_ip_type(stack_context: StackContext) {
    let _ = stack_context;
}

#[scenario(
    path = "tests/features/stack_lifecycle.feature",
    name = "Destroy removes every resource of the rig"
)]
fn scenario_destroy(stack_context: StackContext) {
    let _ = stack_context;
}
