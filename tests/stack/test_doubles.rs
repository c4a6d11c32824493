//! In-memory engine that reconciles declared graphs against a fake cloud.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rigstack::program::{DeclaredStack, Program, ProgramContext, ProgramError, Resource};
use rigstack::stack::{ConfigMap, Engine, EngineFuture, OutputMap, StackIdentity};
use serde_json::{Map, Value};
use thiserror::Error;

/// Properties whose change forces a replacement, per resource type, unless
/// the declaration lists them in `ignoreChanges`.
const REPLACE_ON: [(&str, &[&str]); 3] = [
    ("aws:ec2:Instance", &["ami", "keyName", "subnetId"]),
    ("aws:ec2:KeyPair", &["publicKey", "keyName"]),
    ("aws:ebs:Volume", &["availabilityZone", "encrypted"]),
];

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SimulatedCloudError {
    #[error("stack {0} is locked by another update")]
    Locked(String),
    #[error("stack {0} does not exist")]
    UnknownStack(String),
    #[error(transparent)]
    Program(#[from] ProgramError),
    #[error("output {output} references unknown value {reference}")]
    UnresolvedReference { output: String, reference: String },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloudResource {
    pub type_token: String,
    pub attributes: BTreeMap<String, String>,
    pub properties: Map<String, Value>,
}

#[derive(Clone, Debug, Default)]
struct StackState {
    config: ConfigMap,
    resources: BTreeMap<String, CloudResource>,
    updates: usize,
}

#[derive(Debug, Default)]
struct CloudState {
    stacks: BTreeMap<String, StackState>,
    locked: Vec<String>,
    dropped_outputs: Vec<String>,
    next_id: u32,
    next_static_ip: u8,
    next_dynamic_ip: u8,
    calls: Vec<String>,
}

impl CloudState {
    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:08x}", self.next_id)
    }

    fn allocate_ip(&mut self, static_pool: bool) -> String {
        if static_pool {
            self.next_static_ip += 1;
            format!("198.51.100.{}", self.next_static_ip)
        } else {
            self.next_dynamic_ip += 1;
            format!("203.0.113.{}", self.next_dynamic_ip)
        }
    }

    fn create(&mut self, type_token: &str, properties: &Map<String, Value>) -> CloudResource {
        let mut attributes = BTreeMap::new();
        match type_token {
            "aws:ec2:Instance" => {
                attributes.insert(String::from("id"), self.allocate_id("i"));
                attributes.insert(String::from("publicIp"), self.allocate_ip(false));
                attributes.insert(String::from("availabilityZone"), String::from("sim-1a"));
            }
            "aws:ec2:Eip" => {
                attributes.insert(String::from("id"), self.allocate_id("eipalloc"));
                attributes.insert(String::from("publicIp"), self.allocate_ip(true));
            }
            "aws:ec2:KeyPair" => {
                let id = self.allocate_id("key");
                let key_name = properties
                    .get("keyName")
                    .and_then(Value::as_str)
                    .map_or_else(|| id.clone(), str::to_owned);
                attributes.insert(String::from("keyName"), key_name);
                attributes.insert(String::from("id"), id);
            }
            _ => {
                attributes.insert(String::from("id"), self.allocate_id("res"));
            }
        }
        CloudResource {
            type_token: type_token.to_owned(),
            attributes,
            properties: properties.clone(),
        }
    }
}

/// Engine double with stable identifiers and separate static/dynamic address
/// pools. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct SimulatedCloud {
    state: Arc<Mutex<CloudState>>,
}

impl SimulatedCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulates another process holding the update lock for `identity`.
    pub fn hold_lock(&self, identity: &StackIdentity) {
        self.lock().locked.push(identity.to_string());
    }

    /// Omits `output` from every subsequent `up` result.
    pub fn drop_output(&self, output: &str) {
        self.lock().dropped_outputs.push(output.to_owned());
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn update_count(&self, identity: &StackIdentity) -> usize {
        self.lock()
            .stacks
            .get(&identity.to_string())
            .map_or(0, |stack| stack.updates)
    }

    pub fn resources(&self, identity: &StackIdentity) -> BTreeMap<String, CloudResource> {
        self.lock()
            .stacks
            .get(&identity.to_string())
            .map(|stack| stack.resources.clone())
            .unwrap_or_default()
    }

    pub fn stored_config(&self, identity: &StackIdentity) -> ConfigMap {
        self.lock()
            .stacks
            .get(&identity.to_string())
            .map(|stack| stack.config.clone())
            .unwrap_or_default()
    }

    fn reconcile(
        &self,
        identity: &StackIdentity,
        program: Program,
    ) -> Result<OutputMap, SimulatedCloudError> {
        let key = identity.to_string();
        let mut state = self.lock();
        state.calls.push(format!("up {key}"));
        if state.locked.contains(&key) {
            return Err(SimulatedCloudError::Locked(key));
        }
        let current = state
            .stacks
            .get(&key)
            .cloned()
            .ok_or_else(|| SimulatedCloudError::UnknownStack(key.clone()))?;

        let context = ProgramContext::new(identity.clone(), current.config.clone());
        let declared = program(&context)?;

        let mut next = BTreeMap::new();
        for (name, resource) in declared.resources() {
            let kept = current
                .resources
                .get(name)
                .filter(|existing| !needs_replacement(existing, resource));
            let reconciled = match kept {
                Some(existing) => CloudResource {
                    properties: settled_properties(existing, resource),
                    ..existing.clone()
                },
                None => {
                    state.calls.push(format!("create {name}"));
                    state.create(resource.type_token(), resource.properties())
                }
            };
            next.insert(name.to_owned(), reconciled);
        }

        let outputs = resolve_outputs(&declared, &next, &state.dropped_outputs)?;
        let stack = state.stacks.entry(key).or_default();
        stack.resources = next;
        stack.updates += 1;
        Ok(outputs)
    }
}

fn is_ignored(resource: &Resource, property: &str) -> bool {
    resource
        .options()
        .ignore_changes
        .iter()
        .any(|ignored| ignored == property)
}

fn needs_replacement(existing: &CloudResource, resource: &Resource) -> bool {
    if existing.type_token != resource.type_token() {
        return true;
    }
    REPLACE_ON
        .iter()
        .find(|(token, _)| *token == resource.type_token())
        .is_some_and(|(_, keys)| {
            keys.iter()
                .filter(|prop| !is_ignored(resource, prop))
                .any(|prop| existing.properties.get(*prop) != resource.property_value(prop))
        })
}

/// Applies declared properties in place, keeping the recorded value of every
/// property the declaration ignores.
fn settled_properties(existing: &CloudResource, resource: &Resource) -> Map<String, Value> {
    let mut properties = resource.properties().clone();
    for ignored in &resource.options().ignore_changes {
        match existing.properties.get(ignored) {
            Some(recorded) => {
                properties.insert(ignored.clone(), recorded.clone());
            }
            None => {
                properties.remove(ignored);
            }
        }
    }
    properties
}

fn resolve_outputs(
    declared: &DeclaredStack,
    resources: &BTreeMap<String, CloudResource>,
    dropped: &[String],
) -> Result<OutputMap, SimulatedCloudError> {
    let mut outputs = OutputMap::new();
    for (name, reference) in declared.outputs() {
        if dropped.contains(name) {
            continue;
        }
        let value = reference.attribute_name().and_then(|attribute| {
            resources
                .get(reference.target())
                .and_then(|resource| resource.attributes.get(attribute))
        });
        let Some(text) = value else {
            return Err(SimulatedCloudError::UnresolvedReference {
                output: name.clone(),
                reference: reference.interpolation(),
            });
        };
        outputs.insert(name.clone(), Value::String(text.clone()));
    }
    Ok(outputs)
}

impl Engine for SimulatedCloud {
    type Error = SimulatedCloudError;

    fn select_stack<'a>(
        &'a self,
        identity: &'a StackIdentity,
    ) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(format!("select {identity}"));
            state.stacks.entry(identity.to_string()).or_default();
            Ok(())
        })
    }

    fn set_config<'a>(
        &'a self,
        identity: &'a StackIdentity,
        key: &'a str,
        value: &'a str,
    ) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(format!("set {key}"));
            let stack = state
                .stacks
                .get_mut(&identity.to_string())
                .ok_or_else(|| SimulatedCloudError::UnknownStack(identity.to_string()))?;
            stack.config.insert(key.to_owned(), value.to_owned());
            Ok(())
        })
    }

    fn get_all_config<'a>(
        &'a self,
        identity: &'a StackIdentity,
    ) -> EngineFuture<'a, ConfigMap, Self::Error> {
        Box::pin(async move { Ok(self.stored_config(identity)) })
    }

    fn up<'a>(
        &'a self,
        identity: &'a StackIdentity,
        program: Program,
    ) -> EngineFuture<'a, Value, Self::Error> {
        Box::pin(async move {
            self.reconcile(identity, program)
                .map(|outputs| Value::Object(outputs.into_iter().collect()))
        })
    }

    fn destroy<'a>(&'a self, identity: &'a StackIdentity) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let key = identity.to_string();
            let mut state = self.lock();
            state.calls.push(format!("destroy {key}"));
            if state.locked.contains(&key) {
                return Err(SimulatedCloudError::Locked(key));
            }
            if let Some(stack) = state.stacks.get_mut(&key) {
                stack.resources.clear();
            }
            Ok(())
        })
    }
}
