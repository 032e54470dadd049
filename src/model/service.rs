use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A named, typed value attached to operations and entity attribute maps.
///
/// Raw values are wrapped on their way into the model so that attribute
/// maps stay uniform regardless of where a value originated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: serde_json::Value,
}

impl Parameter {
    #[must_use]
    pub fn wrap(name: &str, value: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

/// A single invokable operation declared on an interface.
///
/// `implementation` is the resolved callable path: a function registry
/// key for the thread executor, or a command for the subprocess
/// executor. An operation declared without an implementation is still a
/// valid declaration; task builders turn it into a stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub implementation: Option<String>,
    pub plugin: Option<PluginSpecification>,
    #[serde(default)]
    pub inputs: IndexMap<String, Parameter>,
}

/// A named group of operations on a node or relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub operations: IndexMap<String, Operation>,
}

/// Reference from an operation to the plugin providing its
/// implementation. Resolved against the installed-plugin registry at
/// task construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpecification {
    pub name: String,
    pub version: Option<String>,
}

impl PluginSpecification {
    /// Find the installed plugin matching this specification.
    #[must_use]
    pub fn find_plugin(&self, installed: &[Plugin]) -> Option<Plugin> {
        installed
            .iter()
            .find(|plugin| {
                plugin.name == self.name
                    && self
                        .version
                        .as_ref()
                        .is_none_or(|version| &plugin.package_version == version)
            })
            .cloned()
    }
}

/// An installed plugin package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plugin {
    pub id: String,
    pub name: String,
    pub package_version: String,
}

/// A node of the modeled service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub service_instance_id: String,
    /// The node this node is contained in; a host node hosts itself.
    pub host_id: Option<String>,
    #[serde(default)]
    pub interfaces: IndexMap<String, Interface>,
    #[serde(default)]
    pub attributes: IndexMap<String, Parameter>,
    /// Relationships where this node is the source.
    #[serde(default)]
    pub outbound_relationship_ids: Vec<String>,
    #[serde(default)]
    pub type_hierarchy: Vec<String>,
}

impl Node {
    #[must_use]
    pub fn interface_operation(&self, interface_name: &str, operation_name: &str) -> Option<&Operation> {
        self.interfaces
            .get(interface_name)
            .and_then(|interface| interface.operations.get(operation_name))
    }
}

/// A directed relationship between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub name: String,
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(default)]
    pub interfaces: IndexMap<String, Interface>,
    #[serde(default)]
    pub attributes: IndexMap<String, Parameter>,
}

impl Relationship {
    #[must_use]
    pub fn interface_operation(&self, interface_name: &str, operation_name: &str) -> Option<&Operation> {
        self.interfaces
            .get(interface_name)
            .and_then(|interface| interface.operations.get(operation_name))
    }
}

/// A deployed instance of a service template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: String,
    pub name: String,
    pub service_template_id: String,
}

/// Reference to the entity an operation acts upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    Node { id: String },
    Relationship { id: String },
}

impl Actor {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Node { id } | Self::Relationship { id } => id,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Node { .. } => "node",
            Self::Relationship { .. } => "relationship",
        }
    }
}
