//! Service models: abstract capability bundles independent of any component.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::component::{Port, Property};

/// A named bundle of ports and properties describing a capability, fulfilled
/// by any component that declares it in its provides table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceModel {
    pub name: String,
    /// More general service this one refines
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl ServiceModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            ports: Vec::new(),
            properties: Vec::new(),
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

    pub fn find_port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }
}

/// A live view of a service as provided by a concrete component: service-level
/// port names resolved onto the component's concrete ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundService {
    pub component: String,
    pub service: String,
    /// service-level port name -> component-level port name
    pub port_mappings: BTreeMap<String, String>,
}

impl BoundService {
    /// Concrete component port backing the given service-level port name.
    ///
    /// Falls back to the service port name itself when no explicit mapping is
    /// declared (the common same-name case).
    pub fn component_port<'a>(&'a self, service_port: &'a str) -> &'a str {
        self.port_mappings
            .get(service_port)
            .map(String::as_str)
            .unwrap_or(service_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_service_port_resolution() {
        let bound = BoundService {
            component: "stereo_camera".to_string(),
            service: "image_source".to_string(),
            port_mappings: [("frames".to_string(), "left_frames".to_string())]
                .into_iter()
                .collect(),
        };
        assert_eq!(bound.component_port("frames"), "left_frames");
        assert_eq!(bound.component_port("timestamps"), "timestamps");
    }
}
