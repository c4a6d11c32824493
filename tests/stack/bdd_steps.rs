//! BDD step definitions for the rig stack lifecycle.

use rigstack::aws::{AwsStack, PUBLIC_IP_TYPE_KEY};
use rigstack::program::PublicIpType;
use rigstack::stack::{Engine, StackContract};
use rstest_bdd_macros::{given, then, when};
use serde_json::Value;
use tokio::runtime::Runtime;

use super::test_helpers::{FailureKind, StackContext, StackFailure};
use crate::test_constants::SSH_PUBLIC_KEY;

const ROTATED_SSH_PUBLIC_KEY: &str =
    "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIRigStackRotatedKey rig@test";

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))
}

fn instance_resource_name(stack_context: &StackContext) -> String {
    format!("{}-ec2-instance", stack_context.stack_name)
}

#[given("a rig stack named \"{name}\"")]
fn rig_stack_named(mut stack_context: StackContext, name: String) -> StackContext {
    stack_context.stack_name = name;
    stack_context
}

#[given("the rig uses region \"{region}\" and instance type \"{instance_type}\"")]
fn rig_region_and_type(
    mut stack_context: StackContext,
    region: String,
    instance_type: String,
) -> StackContext {
    stack_context.config.region = region;
    stack_context.config.instance_type = instance_type;
    stack_context
}

#[given("the rig uses a \"{mode}\" public IP and a \"{size}\" GiB root volume")]
fn rig_address_and_volume(
    mut stack_context: StackContext,
    mode: String,
    size: u32,
) -> StackContext {
    stack_context.config.public_ip_type = mode
        .parse::<PublicIpType>()
        .unwrap_or_else(|err| panic!("scenario uses a valid mode: {err}"));
    stack_context.config.root_volume_size_gb = size;
    stack_context
}

#[when("the rig is reconfigured with a \"{size}\" GiB root volume")]
fn rig_reconfigured(mut stack_context: StackContext, size: u32) -> StackContext {
    stack_context.config.root_volume_size_gb = size;
    stack_context
}

#[when("the rig's SSH public key is rotated")]
fn ssh_key_rotated(mut stack_context: StackContext) -> StackContext {
    stack_context.config.public_ssh_key_content = String::from(ROTATED_SSH_PUBLIC_KEY);
    stack_context
}

#[given("another update holds the stack lock")]
fn another_update_holds_lock(stack_context: StackContext) -> StackContext {
    let driver = stack_context
        .driver()
        .unwrap_or_else(|err| panic!("valid stack name: {}", err.message));
    stack_context.cloud.hold_lock(driver.identity());
    stack_context
}

#[given("the engine omits the \"{output}\" output")]
fn engine_omits_output(stack_context: StackContext, output: String) -> StackContext {
    stack_context.cloud.drop_output(&output);
    stack_context
}

#[given("the stored \"{key}\" is overwritten with \"{value}\"")]
fn stored_value_overwritten(
    mut stack_context: StackContext,
    key: String,
    value: String,
) -> Result<StackContext, StepError> {
    let runtime = runtime()?;
    let driver = stack_context
        .driver()
        .map_err(|err| StepError::Assertion(err.message))?;
    let result = runtime.block_on(async {
        driver.set_config(&stack_context.config).await?;
        let engine = driver.engine();
        engine
            .set_config(driver.identity(), &key, &value)
            .await
            .map_err(|source| rigstack::stack::StackError::Engine {
                identity: driver.identity().clone(),
                source,
            })
    });
    if let Err(err) = result {
        stack_context.failure = Some(StackFailure::from(&err));
    }
    Ok(stack_context)
}

#[when("the rig configuration is pushed and applied")]
fn push_and_apply(mut stack_context: StackContext) -> Result<StackContext, StepError> {
    let runtime = runtime()?;
    let driver = match stack_context.driver() {
        Ok(driver) => driver,
        Err(failure) => {
            stack_context.failure = Some(failure);
            return Ok(stack_context);
        }
    };
    let config = stack_context.config.clone();
    let result = runtime.block_on(async {
        driver.set_config(&config).await?;
        driver.apply().await
    });
    match result {
        Ok(output) => stack_context.outputs.push(output),
        Err(err) => stack_context.failure = Some(StackFailure::from(&err)),
    }
    Ok(stack_context)
}

#[when("the stored configuration is applied")]
fn apply_stored(mut stack_context: StackContext) -> Result<StackContext, StepError> {
    let runtime = runtime()?;
    let driver = stack_context
        .driver()
        .map_err(|err| StepError::Assertion(err.message))?;
    match runtime.block_on(driver.apply()) {
        Ok(output) => stack_context.outputs.push(output),
        Err(err) => stack_context.failure = Some(StackFailure::from(&err)),
    }
    Ok(stack_context)
}

#[when("the rig is destroyed")]
fn destroy_rig(mut stack_context: StackContext) -> Result<StackContext, StepError> {
    let runtime = runtime()?;
    let driver = stack_context
        .driver()
        .map_err(|err| StepError::Assertion(err.message))?;
    if let Err(err) = runtime.block_on(driver.destroy()) {
        stack_context.failure = Some(StackFailure::from(&err));
    }
    Ok(stack_context)
}

#[then("the apply succeeds")]
fn apply_succeeds(stack_context: &StackContext) -> Result<(), StepError> {
    if let Some(failure) = &stack_context.failure {
        return Err(StepError::Assertion(format!(
            "expected success, got failure: {}",
            failure.message
        )));
    }
    if stack_context.outputs.is_empty() {
        return Err(StepError::Assertion(String::from("no outputs recorded")));
    }
    Ok(())
}

#[then("the instance id is not empty")]
fn instance_id_not_empty(stack_context: &StackContext) -> Result<(), StepError> {
    match stack_context.last_output() {
        Some(output) if !output.instance_id.trim().is_empty() => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected an instance id, got {other:?}"
        ))),
    }
}

fn resource_attribute(
    stack_context: &StackContext,
    resource: &str,
    attribute: &str,
) -> Result<String, StepError> {
    let driver = stack_context
        .driver()
        .map_err(|err| StepError::Assertion(err.message))?;
    stack_context
        .cloud
        .resources(driver.identity())
        .get(resource)
        .and_then(|found| found.attributes.get(attribute).cloned())
        .ok_or_else(|| StepError::Assertion(format!("{resource}.{attribute} was not created")))
}

#[then("the public IP is the allocated static address")]
fn public_ip_is_static(stack_context: &StackContext) -> Result<(), StepError> {
    let eip = resource_attribute(
        stack_context,
        &format!("{}-eip", stack_context.stack_name),
        "publicIp",
    )?;
    let ephemeral = resource_attribute(
        stack_context,
        &instance_resource_name(stack_context),
        "publicIp",
    )?;
    let reported = stack_context
        .last_output()
        .map(|output| output.public_ip.to_string())
        .unwrap_or_default();
    if reported == eip && reported != ephemeral {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected static address {eip}, got {reported} (instance address {ephemeral})"
        )))
    }
}

#[then("the public IP is the instance's own address")]
fn public_ip_is_dynamic(stack_context: &StackContext) -> Result<(), StepError> {
    let ephemeral = resource_attribute(
        stack_context,
        &instance_resource_name(stack_context),
        "publicIp",
    )?;
    let reported = stack_context
        .last_output()
        .map(|output| output.public_ip.to_string())
        .unwrap_or_default();
    if reported == ephemeral {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected instance address {ephemeral}, got {reported}"
        )))
    }
}

fn first_and_last(
    stack_context: &StackContext,
) -> Result<(&rigstack::AwsStackOutput, &rigstack::AwsStackOutput), StepError> {
    match (stack_context.outputs.first(), stack_context.outputs.last()) {
        (Some(first), Some(last)) if stack_context.outputs.len() >= 2 => Ok((first, last)),
        _ => Err(StepError::Assertion(format!(
            "expected at least two applies, got {}",
            stack_context.outputs.len()
        ))),
    }
}

#[then("the instance id is unchanged across applies")]
fn instance_id_unchanged(stack_context: &StackContext) -> Result<(), StepError> {
    let (first, last) = first_and_last(stack_context)?;
    if first.instance_id == last.instance_id {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "instance replaced: {} -> {}",
            first.instance_id, last.instance_id
        )))
    }
}

#[then("the public IP is unchanged across applies")]
fn public_ip_unchanged(stack_context: &StackContext) -> Result<(), StepError> {
    let (first, last) = first_and_last(stack_context)?;
    if first.public_ip == last.public_ip {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "public IP changed: {} -> {}",
            first.public_ip, last.public_ip
        )))
    }
}

#[then("the key pair was created once and keeps the original public key")]
fn key_pair_kept(stack_context: &StackContext) -> Result<(), StepError> {
    let driver = stack_context
        .driver()
        .map_err(|err| StepError::Assertion(err.message))?;
    let key_pair = format!("{}-keypair", stack_context.stack_name);
    let create_call = format!("create {key_pair}");
    let creations = stack_context
        .cloud
        .calls()
        .iter()
        .filter(|call| **call == create_call)
        .count();
    let recorded = stack_context
        .cloud
        .resources(driver.identity())
        .get(&key_pair)
        .and_then(|resource| resource.properties.get("publicKey"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    if creations == 1 && recorded.as_deref() == Some(SSH_PUBLIC_KEY) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "key pair created {creations} times, recorded public key {recorded:?}"
        )))
    }
}

#[then("the root volume size is \"{size}\" GiB")]
fn root_volume_size(stack_context: &StackContext, size: u64) -> Result<(), StepError> {
    let driver = stack_context
        .driver()
        .map_err(|err| StepError::Assertion(err.message))?;
    let resources = stack_context.cloud.resources(driver.identity());
    let actual = resources
        .get(&instance_resource_name(stack_context))
        .and_then(|instance| instance.properties.get("rootBlockDevice"))
        .and_then(|device| device.get("volumeSize"))
        .and_then(Value::as_u64);
    if actual == Some(size) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected root volume of {size} GiB, got {actual:?}"
        )))
    }
}

fn failure(stack_context: &StackContext) -> Result<&StackFailure, StepError> {
    stack_context
        .failure
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("expected failure outcome")))
}

#[then("the apply fails with a \"{kind}\" error")]
fn apply_fails_with(stack_context: &StackContext, kind: String) -> Result<(), StepError> {
    let expected = match kind.as_str() {
        "identity" => FailureKind::Identity,
        "config" => FailureKind::Config,
        "engine" => FailureKind::Engine,
        "output" => FailureKind::Output,
        other => {
            return Err(StepError::Assertion(format!("unknown failure kind {other}")));
        }
    };
    let actual = failure(stack_context)?;
    if actual.kind == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?} failure, got {:?}: {}",
            actual.kind, actual.message
        )))
    }
}

#[then("the error is retryable")]
fn error_is_retryable(stack_context: &StackContext) -> Result<(), StepError> {
    if failure(stack_context)?.retryable {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from("expected a retryable error")))
    }
}

#[then("the error is not retryable")]
fn error_is_not_retryable(stack_context: &StackContext) -> Result<(), StepError> {
    if failure(stack_context)?.retryable {
        Err(StepError::Assertion(String::from("expected a permanent error")))
    } else {
        Ok(())
    }
}

#[then("the error names the stack \"{identity}\"")]
fn error_names_stack(stack_context: &StackContext, identity: String) -> Result<(), StepError> {
    let message = &failure(stack_context)?.message;
    if message.contains(&identity) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {identity} in error message: {message}"
        )))
    }
}

#[then("the engine never ran an update")]
fn engine_never_ran(stack_context: &StackContext) -> Result<(), StepError> {
    let ran = stack_context
        .cloud
        .calls()
        .iter()
        .any(|call| call.starts_with("up "));
    if ran {
        Err(StepError::Assertion(String::from("engine update should not run")))
    } else {
        Ok(())
    }
}

#[then("the rig has no resources left")]
fn no_resources_left(stack_context: &StackContext) -> Result<(), StepError> {
    let driver = stack_context
        .driver()
        .map_err(|err| StepError::Assertion(err.message))?;
    let remaining = stack_context.cloud.resources(driver.identity());
    if remaining.is_empty() && stack_context.failure.is_none() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "resources remain: {:?}",
            remaining.keys().collect::<Vec<_>>()
        )))
    }
}

#[then("the stored configuration matches the contract")]
fn stored_config_matches(stack_context: &StackContext) -> Result<(), StepError> {
    let driver = stack_context
        .driver()
        .map_err(|err| StepError::Assertion(err.message))?;
    let stored = stack_context.cloud.stored_config(driver.identity());
    for (key, value) in AwsStack::config_entries(&stack_context.config) {
        if stored.get(key) != Some(&value) {
            return Err(StepError::Assertion(format!(
                "stored {key} = {:?}, expected {value}",
                stored.get(key)
            )));
        }
    }
    if stored.contains_key(PUBLIC_IP_TYPE_KEY) {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from("publicIpType not stored")))
    }
}
