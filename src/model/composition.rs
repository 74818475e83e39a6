//! Composition models: named children, exported ports, internal connections,
//! and specializations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::ConnectionPolicy;

/// A named child slot in a composition, typed by a component, service, or
/// composition model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildDefinition {
    pub model: String,
    /// Arguments the composition passes down to the child
    #[serde(default)]
    pub arguments: BTreeMap<String, Value>,
}

impl ChildDefinition {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }
}

/// A child port re-exported under the composition's own interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedPort {
    /// Name the port is exported under
    pub name: String,
    pub child: String,
    /// Child-level port name; when absent the export is resolved by name,
    /// then by unique type match
    #[serde(default)]
    pub child_port: Option<String>,
}

/// A connection between two child ports declared inside the composition.
///
/// Port names may be left out; resolution then goes exact-name-match first,
/// unique-type-match second, and fails on ambiguity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalConnection {
    pub source_child: String,
    #[serde(default)]
    pub source_port: Option<String>,
    pub sink_child: String,
    #[serde(default)]
    pub sink_port: Option<String>,
    #[serde(default)]
    pub policy: ConnectionPolicy,
}

impl InternalConnection {
    pub fn new(source_child: impl Into<String>, sink_child: impl Into<String>) -> Self {
        Self {
            source_child: source_child.into(),
            source_port: None,
            sink_child: sink_child.into(),
            sink_port: None,
            policy: ConnectionPolicy::default(),
        }
    }

    pub fn ports(
        mut self,
        source_port: impl Into<String>,
        sink_port: impl Into<String>,
    ) -> Self {
        self.source_port = Some(source_port.into());
        self.sink_port = Some(sink_port.into());
        self
    }

    pub fn with_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// An alternate composition model selected automatically when child roles are
/// bound to sufficiently specific models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specialization {
    /// child role name -> model the role must be bound to (or a
    /// specialization of it) for this specialization to trigger
    pub triggers: BTreeMap<String, String>,
    /// Composition model that replaces the base when triggered
    pub target: String,
}

impl Specialization {
    pub fn new(
        triggers: impl IntoIterator<Item = (String, String)>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            triggers: triggers.into_iter().collect(),
            target: target.into(),
        }
    }
}

/// A component model whose ports are exported ports of named children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionModel {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: BTreeMap<String, ChildDefinition>,
    #[serde(default)]
    pub exports: Vec<ExportedPort>,
    #[serde(default)]
    pub connections: Vec<InternalConnection>,
    #[serde(default)]
    pub specializations: Vec<Specialization>,
}

impl CompositionModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: BTreeMap::new(),
            exports: Vec::new(),
            connections: Vec::new(),
            specializations: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_child(mut self, name: impl Into<String>, child: ChildDefinition) -> Self {
        self.children.insert(name.into(), child);
        self
    }

    pub fn with_connection(mut self, connection: InternalConnection) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn with_export(mut self, export: ExportedPort) -> Self {
        self.exports.push(export);
        self
    }

    pub fn with_specialization(mut self, specialization: Specialization) -> Self {
        self.specializations.push(specialization);
        self
    }

    pub fn child(&self, name: &str) -> Option<&ChildDefinition> {
        self.children.get(name)
    }
}
