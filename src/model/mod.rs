//! # Model Graph
//!
//! Immutable component, service, and composition model definitions plus the
//! registry that holds them. Models are loaded once at orchestrator startup
//! and shared read-only by the generation and reconciliation engines.
//!
//! The open-ended "provides" relation is an explicit capability table on the
//! registry (component model -> provided services with port mappings), queried
//! by lookup. Models are a tagged union, not an inheritance hierarchy.

pub mod component;
pub mod composition;
pub mod registry;
pub mod service;

pub use component::{ComponentModel, DataType, Port, PortDirection, Property, ProvidedService};
pub use composition::{
    ChildDefinition, CompositionModel, ExportedPort, InternalConnection, Specialization,
};
pub use registry::{ModelError, ModelLoader, ModelRegistry, ModelResult};
pub use service::{BoundService, ServiceModel};

use serde::{Deserialize, Serialize};

/// A model definition: task component, abstract service, or composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    Component(ComponentModel),
    Service(ServiceModel),
    Composition(CompositionModel),
}

impl Model {
    pub fn name(&self) -> &str {
        match self {
            Model::Component(m) => &m.name,
            Model::Service(m) => &m.name,
            Model::Composition(m) => &m.name,
        }
    }

    /// Parent in the single-inheritance refinement hierarchy, if any
    pub fn parent(&self) -> Option<&str> {
        match self {
            Model::Component(m) => m.parent.as_deref(),
            Model::Service(m) => m.parent.as_deref(),
            Model::Composition(m) => m.parent.as_deref(),
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self, Model::Component(_))
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Model::Service(_))
    }

    pub fn is_composition(&self) -> bool {
        matches!(self, Model::Composition(_))
    }

    pub fn as_component(&self) -> Option<&ComponentModel> {
        match self {
            Model::Component(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&ServiceModel> {
        match self {
            Model::Service(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_composition(&self) -> Option<&CompositionModel> {
        match self {
            Model::Composition(m) => Some(m),
            _ => None,
        }
    }
}
