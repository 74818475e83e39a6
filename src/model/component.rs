//! Component model definitions: typed ports, properties, provided services.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of a wire-level data type carried by a port.
///
/// Two ports can be connected when their data types compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataType(pub String);

impl DataType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn is_compatible_with(&self, other: &DataType) -> bool {
        self == other
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DataType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Direction of a port as seen from its owning component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// A typed data port on a component or service model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub data_type: DataType,
    pub direction: PortDirection,
    /// Optional ports may stay unconnected in a valid network
    #[serde(default)]
    pub optional: bool,
    /// Input ports that accept more than one writer
    #[serde(default)]
    pub multiplexing: bool,
}

impl Port {
    pub fn input(name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            direction: PortDirection::Input,
            optional: false,
            multiplexing: false,
        }
    }

    pub fn output(name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            direction: PortDirection::Output,
            optional: false,
            multiplexing: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn multiplexing(mut self) -> Self {
        self.multiplexing = true;
        self
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }
}

/// A configuration property on a component model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub default: Option<Value>,
    /// Writable while the owning task is running
    #[serde(default)]
    pub live_updatable: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            default: None,
            live_updatable: false,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn live_updatable(mut self) -> Self {
        self.live_updatable = true;
        self
    }
}

/// Declaration that a component provides a service, mapping the service's
/// abstract port names onto the component's concrete ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvidedService {
    pub service: String,
    /// service-level port name -> component-level port name
    #[serde(default)]
    pub port_mappings: BTreeMap<String, String>,
}

/// Immutable description of a task type: ports, properties, provided services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentModel {
    pub name: String,
    /// Refined parent model in the single-inheritance hierarchy
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub provides: Vec<ProvidedService>,
}

impl ComponentModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            ports: Vec::new(),
            properties: Vec::new(),
            provides: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn providing(
        mut self,
        service: impl Into<String>,
        port_mappings: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.provides.push(ProvidedService {
            service: service.into(),
            port_mappings: port_mappings.into_iter().collect(),
        });
        self
    }

    /// Port declared directly on this model (inheritance-aware lookup lives
    /// on the registry)
    pub fn find_port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn provided(&self, service: &str) -> Option<&ProvidedService> {
        self.provides.iter().find(|p| p.service == service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_builders() {
        let port = Port::input("frames", "image").optional();
        assert!(port.is_input());
        assert!(port.optional);
        assert!(!port.multiplexing);

        let port = Port::output("pose", "rigid_body_state");
        assert!(port.is_output());
        assert_eq!(port.data_type, DataType::new("rigid_body_state"));
    }

    #[test]
    fn test_data_type_compatibility() {
        assert!(DataType::new("image").is_compatible_with(&"image".into()));
        assert!(!DataType::new("image").is_compatible_with(&"laser_scan".into()));
    }

    #[test]
    fn test_component_port_lookup() {
        let model = ComponentModel::new("video_source")
            .with_port(Port::output("frames", "image"))
            .with_property(Property::new("frame_rate", "int32").with_default(30.into()));

        assert!(model.find_port("frames").is_some());
        assert!(model.find_port("missing").is_none());
        assert_eq!(
            model.find_property("frame_rate").unwrap().default,
            Some(30.into())
        );
    }
}
