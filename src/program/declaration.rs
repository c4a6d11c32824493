//! Declarative resource graph produced by a provisioning program.
//!
//! A [`DeclaredStack`] is pure data: it names every resource, the engine
//! functions whose results feed those resources, and the values exported
//! once the engine has reconciled the graph. It serialises to the body of a
//! Pulumi YAML program.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::model::DeclarationError;

/// Pointer to a value the engine computes during reconciliation.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Reference {
    target: String,
    attribute: Option<String>,
}

impl Reference {
    /// References an attribute of a declared resource.
    #[must_use]
    pub fn attribute(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            target: resource.into(),
            attribute: Some(attribute.into()),
        }
    }

    /// References the result of a declared variable.
    #[must_use]
    pub fn variable(name: impl Into<String>) -> Self {
        Self {
            target: name.into(),
            attribute: None,
        }
    }

    /// References a declared resource as a whole, as used by `dependsOn`.
    #[must_use]
    pub fn resource(name: impl Into<String>) -> Self {
        Self::variable(name)
    }

    /// Logical name of the resource or variable referenced.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Attribute read from the target, if any.
    #[must_use]
    pub fn attribute_name(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Renders the engine interpolation syntax, for example `${web.id}`.
    #[must_use]
    pub fn interpolation(&self) -> String {
        match &self.attribute {
            Some(attribute) => format!("${{{}.{attribute}}}", self.target),
            None => format!("${{{}}}", self.target),
        }
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.interpolation())
    }
}

impl From<Reference> for Value {
    fn from(value: Reference) -> Self {
        Self::String(value.interpolation())
    }
}

impl From<&Reference> for Value {
    fn from(value: &Reference) -> Self {
        Self::String(value.interpolation())
    }
}

/// Engine behaviour overrides for one resource.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ResourceOptions {
    /// Properties whose drift never triggers an update or replacement.
    #[serde(rename = "ignoreChanges", skip_serializing_if = "Vec::is_empty")]
    pub ignore_changes: Vec<String>,
    /// Explicit ordering dependencies.
    #[serde(rename = "dependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<Reference>,
}

impl ResourceOptions {
    /// Returns `true` when no option is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ignore_changes.is_empty() && self.depends_on.is_empty()
    }
}

/// One declared cloud resource.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    type_token: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    properties: Map<String, Value>,
    #[serde(skip_serializing_if = "ResourceOptions::is_empty")]
    options: ResourceOptions,
}

impl Resource {
    /// Starts a resource of the given provider type token.
    #[must_use]
    pub fn new(type_token: impl Into<String>) -> Self {
        Self {
            type_token: type_token.into(),
            properties: Map::new(),
            options: ResourceOptions::default(),
        }
    }

    /// Sets a property.
    #[must_use]
    pub fn property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_owned(), value.into());
        self
    }

    /// Sets a property only when a value is present.
    #[must_use]
    pub fn optional_property<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(inner) => self.property(key, inner),
            None => self,
        }
    }

    /// Marks properties whose drift must be ignored.
    #[must_use]
    pub fn ignore_changes(mut self, properties: &[&str]) -> Self {
        self.options
            .ignore_changes
            .extend(properties.iter().map(|&property| property.to_owned()));
        self
    }

    /// Adds an explicit ordering dependency.
    #[must_use]
    pub fn depends_on(mut self, reference: Reference) -> Self {
        self.options.depends_on.push(reference);
        self
    }

    /// Provider type token, for example `aws:ec2:Instance`.
    #[must_use]
    pub fn type_token(&self) -> &str {
        &self.type_token
    }

    /// Declared properties.
    #[must_use]
    pub const fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Looks up one declared property.
    #[must_use]
    pub fn property_value(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Engine options for this resource.
    #[must_use]
    pub const fn options(&self) -> &ResourceOptions {
        &self.options
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct InvokeCall {
    function: String,
    arguments: Value,
    #[serde(rename = "return", skip_serializing_if = "Option::is_none")]
    return_field: Option<String>,
}

/// Engine-evaluated function call, such as an image lookup.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Invoke {
    #[serde(rename = "fn::invoke")]
    call: InvokeCall,
}

impl Invoke {
    /// Builds an invoke of `function` with the given arguments.
    #[must_use]
    pub fn new(function: impl Into<String>, arguments: Value) -> Self {
        Self {
            call: InvokeCall {
                function: function.into(),
                arguments,
                return_field: None,
            },
        }
    }

    /// Narrows the result to a single field.
    #[must_use]
    pub fn returning(mut self, field: impl Into<String>) -> Self {
        self.call.return_field = Some(field.into());
        self
    }

    /// Function token invoked.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.call.function
    }

    /// Arguments passed to the function.
    #[must_use]
    pub const fn arguments(&self) -> &Value {
        &self.call.arguments
    }

    /// Field extracted from the result, if any.
    #[must_use]
    pub fn return_field(&self) -> Option<&str> {
        self.call.return_field.as_deref()
    }
}

/// Handle to a declared resource used to wire references.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceHandle {
    name: String,
}

impl ResourceHandle {
    /// Logical name of the resource.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// References an attribute the engine computes for this resource.
    #[must_use]
    pub fn output(&self, attribute: &str) -> Reference {
        Reference::attribute(self.name.clone(), attribute)
    }

    /// References the resource itself.
    #[must_use]
    pub fn reference(&self) -> Reference {
        Reference::resource(self.name.clone())
    }
}

/// Complete declared graph for one stack.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeclaredStack {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    variables: BTreeMap<String, Invoke>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    resources: BTreeMap<String, Resource>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, Reference>,
}

impl DeclaredStack {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an engine-evaluated variable and returns a reference to it.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::DuplicateResource`] when the name is taken.
    pub fn invoke(
        &mut self,
        name: impl Into<String>,
        invoke: Invoke,
    ) -> Result<Reference, DeclarationError> {
        let key = self.claim(name.into())?;
        self.variables.insert(key.clone(), invoke);
        Ok(Reference::variable(key))
    }

    /// Declares a resource under a logical name.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::DuplicateResource`] when the name is taken.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        resource: Resource,
    ) -> Result<ResourceHandle, DeclarationError> {
        let key = self.claim(name.into())?;
        self.resources.insert(key.clone(), resource);
        Ok(ResourceHandle { name: key })
    }

    /// Exports a computed value under `name`, replacing any previous export.
    pub fn export(&mut self, name: impl Into<String>, value: Reference) {
        self.outputs.insert(name.into(), value);
    }

    /// Looks up a declared resource.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Iterates declared resources in name order.
    pub fn resources(&self) -> impl Iterator<Item = (&str, &Resource)> {
        self.resources
            .iter()
            .map(|(name, resource)| (name.as_str(), resource))
    }

    /// Looks up a declared variable.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Invoke> {
        self.variables.get(name)
    }

    /// Exported values keyed by output name.
    #[must_use]
    pub const fn outputs(&self) -> &BTreeMap<String, Reference> {
        &self.outputs
    }

    /// Number of declared resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    fn claim(&self, name: String) -> Result<String, DeclarationError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DeclarationError::MissingField(String::from(
                "resource name",
            )));
        }
        if self.resources.contains_key(trimmed) || self.variables.contains_key(trimmed) {
            return Err(DeclarationError::DuplicateResource(trimmed.to_owned()));
        }
        Ok(trimmed.to_owned())
    }
}
