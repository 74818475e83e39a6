//! # Model Registry
//!
//! Name-indexed store of component, service, and composition models, the
//! explicit provides-relation table, and the memoized specialization map.
//!
//! The registry is loaded once at orchestrator startup (optionally through a
//! [`ModelLoader`] capability backed by an external model-description system)
//! and shared read-only afterwards. The specialization memo is the only
//! interior-mutable piece: a cache of `(base composition, selection set) ->
//! resolved model`, keyed structurally instead of generating anonymous model
//! types at runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

use super::component::{ComponentModel, Port, Property};
use super::composition::{CompositionModel, Specialization};
use super::service::BoundService;
use super::Model;

/// Errors raised by model lookup and registration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("model not found: {name}")]
    NotFound { name: String },

    #[error("duplicate model registration: {name}")]
    Duplicate { name: String },

    #[error("model {name} is not a component model")]
    NotAComponent { name: String },

    #[error("model {name} is not a composition model")]
    NotAComposition { name: String },

    #[error("ambiguous specialization of {base}: candidates {candidates:?}")]
    AmbiguousSpecialization {
        base: String,
        candidates: Vec<String>,
    },

    #[error("component {component} does not provide service {service}")]
    ServiceNotProvided { component: String, service: String },
}

impl ModelError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Capability for resolving a model name to its full description, sourced
/// from an external component-description system.
pub trait ModelLoader: Send + Sync {
    fn load(&self, name: &str) -> ModelResult<Model>;
}

type SpecializationKey = (String, BTreeMap<String, String>);

/// Name -> model map plus the relation tables derived from registration.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<Model>>,
    /// Direct provides relation: service name -> component names declaring it
    providers: BTreeMap<String, BTreeSet<String>>,
    /// (base composition, child selections) -> resolved composition model
    specialization_memo: Mutex<BTreeMap<SpecializationKey, String>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, updating the provides table
    pub fn register(&mut self, model: Model) -> ModelResult<()> {
        let name = model.name().to_string();
        if self.models.contains_key(&name) {
            return Err(ModelError::Duplicate { name });
        }
        if let Model::Component(component) = &model {
            for provided in &component.provides {
                self.providers
                    .entry(provided.service.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }
        debug!(model = %name, "📚 MODEL: Registered");
        self.models.insert(name, Arc::new(model));
        Ok(())
    }

    /// Load a model (and, transitively, everything it references) through the
    /// given loader, skipping names already registered
    pub fn ensure_loaded(&mut self, loader: &dyn ModelLoader, name: &str) -> ModelResult<()> {
        if self.models.contains_key(name) {
            return Ok(());
        }
        let model = loader.load(name)?;

        let mut referenced: Vec<String> = Vec::new();
        if let Some(parent) = model.parent() {
            referenced.push(parent.to_string());
        }
        match &model {
            Model::Component(component) => {
                referenced.extend(component.provides.iter().map(|p| p.service.clone()));
            }
            Model::Composition(composition) => {
                referenced.extend(composition.children.values().map(|c| c.model.clone()));
                referenced.extend(
                    composition
                        .specializations
                        .iter()
                        .map(|s| s.target.clone()),
                );
            }
            Model::Service(_) => {}
        }

        self.register(model)?;
        for reference in referenced {
            self.ensure_loaded(loader, &reference)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> ModelResult<&Arc<Model>> {
        self.models
            .get(name)
            .ok_or_else(|| ModelError::not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn component(&self, name: &str) -> ModelResult<&ComponentModel> {
        self.get(name)?
            .as_component()
            .ok_or_else(|| ModelError::NotAComponent {
                name: name.to_string(),
            })
    }

    pub fn composition(&self, name: &str) -> ModelResult<&CompositionModel> {
        self.get(name)?
            .as_composition()
            .ok_or_else(|| ModelError::NotAComposition {
                name: name.to_string(),
            })
    }

    pub fn is_service(&self, name: &str) -> bool {
        self.models.get(name).is_some_and(|m| m.is_service())
    }

    pub fn is_component(&self, name: &str) -> bool {
        self.models.get(name).is_some_and(|m| m.is_component())
    }

    pub fn is_composition(&self, name: &str) -> bool {
        self.models.get(name).is_some_and(|m| m.is_composition())
    }

    /// Whether `name` equals `ancestor` or refines it through the parent chain
    pub fn is_specialization_of(&self, name: &str, ancestor: &str) -> bool {
        let mut current = Some(name.to_string());
        while let Some(model_name) = current {
            if model_name == ancestor {
                return true;
            }
            current = self
                .models
                .get(&model_name)
                .and_then(|m| m.parent().map(str::to_string));
        }
        false
    }

    /// Whether `model` satisfies a request for `request`: either through the
    /// refinement hierarchy, or (for components) through the provides table
    pub fn fulfills(&self, model: &str, request: &str) -> bool {
        if self.is_specialization_of(model, request) {
            return true;
        }
        if !self.is_service(request) {
            return false;
        }
        // walk the component's parent chain collecting provided services
        let mut current = Some(model.to_string());
        while let Some(model_name) = current {
            if let Some(Model::Component(component)) = self.models.get(&model_name).map(Arc::as_ref)
            {
                for provided in &component.provides {
                    if self.is_specialization_of(&provided.service, request) {
                        return true;
                    }
                }
            }
            current = self
                .models
                .get(&model_name)
                .and_then(|m| m.parent().map(str::to_string));
        }
        false
    }

    /// All registered component models fulfilling a request for `service`,
    /// in sorted name order
    pub fn components_providing(&self, service: &str) -> Vec<&str> {
        self.models
            .iter()
            .filter(|(_, m)| m.is_component())
            .filter(|(name, _)| self.fulfills(name, service))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Direct provides table (service -> declaring components)
    pub fn providers_table(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.providers
    }

    /// Bind a service onto a concrete component, resolving port mappings from
    /// the provides declaration closest in the component's parent chain
    pub fn bound_service(&self, component: &str, service: &str) -> ModelResult<BoundService> {
        let mut current = Some(component.to_string());
        while let Some(model_name) = current {
            if let Some(Model::Component(model)) = self.models.get(&model_name).map(Arc::as_ref) {
                for provided in &model.provides {
                    if self.is_specialization_of(&provided.service, service) {
                        return Ok(BoundService {
                            component: component.to_string(),
                            service: service.to_string(),
                            port_mappings: provided.port_mappings.clone(),
                        });
                    }
                }
            }
            current = self
                .models
                .get(&model_name)
                .and_then(|m| m.parent().map(str::to_string));
        }
        Err(ModelError::ServiceNotProvided {
            component: component.to_string(),
            service: service.to_string(),
        })
    }

    /// Inheritance-aware port lookup. For compositions this resolves through
    /// the export declaration down to the owning child.
    pub fn resolve_port(&self, model: &str, port: &str) -> ModelResult<Option<Port>> {
        let mut current = Some(model.to_string());
        while let Some(model_name) = current {
            let found = self.get(&model_name)?;
            match found.as_ref() {
                Model::Component(m) => {
                    if let Some(p) = m.find_port(port) {
                        return Ok(Some(p.clone()));
                    }
                }
                Model::Service(m) => {
                    if let Some(p) = m.find_port(port) {
                        return Ok(Some(p.clone()));
                    }
                }
                Model::Composition(m) => {
                    if let Some(export) = m.exports.iter().find(|e| e.name == port) {
                        let child = m.child(&export.child).ok_or_else(|| {
                            ModelError::not_found(format!("{model_name}.{}", export.child))
                        })?;
                        let child_port = export.child_port.as_deref().unwrap_or(port);
                        return self.resolve_port(&child.model, child_port);
                    }
                }
            }
            current = found.parent().map(str::to_string);
        }
        Ok(None)
    }

    /// All ports visible on a model, parents included; a redeclared port name
    /// shadows the parent's declaration
    pub fn effective_ports(&self, model: &str) -> ModelResult<Vec<Port>> {
        let mut seen = BTreeSet::new();
        let mut ports = Vec::new();
        let mut current = Some(model.to_string());
        while let Some(model_name) = current {
            let found = self.get(&model_name)?;
            let own: &[Port] = match found.as_ref() {
                Model::Component(m) => &m.ports,
                Model::Service(m) => &m.ports,
                Model::Composition(_) => &[],
            };
            for port in own {
                if seen.insert(port.name.clone()) {
                    ports.push(port.clone());
                }
            }
            current = found.parent().map(str::to_string);
        }
        Ok(ports)
    }

    /// All properties visible on a model, parents included
    pub fn effective_properties(&self, model: &str) -> ModelResult<Vec<Property>> {
        let mut seen = BTreeSet::new();
        let mut properties = Vec::new();
        let mut current = Some(model.to_string());
        while let Some(model_name) = current {
            let found = self.get(&model_name)?;
            let own: &[Property] = match found.as_ref() {
                Model::Component(m) => &m.properties,
                Model::Service(m) => &m.properties,
                Model::Composition(_) => &[],
            };
            for property in own {
                if seen.insert(property.name.clone()) {
                    properties.push(property.clone());
                }
            }
            current = found.parent().map(str::to_string);
        }
        Ok(properties)
    }

    /// Resolve the composition model to instantiate for `base` given the
    /// child-role selections, applying specializations recursively.
    ///
    /// The most specific triggered specialization wins; two incomparable
    /// triggered specializations with different targets are an error. Results
    /// are memoized by `(base, selections)`.
    pub fn specialize(
        &self,
        base: &str,
        selections: &BTreeMap<String, String>,
    ) -> ModelResult<String> {
        let key = (base.to_string(), selections.clone());
        if let Some(resolved) = self.specialization_memo.lock().unwrap().get(&key) {
            return Ok(resolved.clone());
        }

        let resolved = self.specialize_uncached(base, selections)?;
        self.specialization_memo
            .lock()
            .unwrap()
            .insert(key, resolved.clone());
        Ok(resolved)
    }

    fn specialize_uncached(
        &self,
        base: &str,
        selections: &BTreeMap<String, String>,
    ) -> ModelResult<String> {
        let composition = self.composition(base)?;

        let triggered: Vec<&Specialization> = composition
            .specializations
            .iter()
            .filter(|s| self.specialization_triggered(s, selections))
            .collect();
        if triggered.is_empty() {
            return Ok(base.to_string());
        }

        // keep only maximal elements under the trigger-implication order
        let maximal: Vec<&Specialization> = triggered
            .iter()
            .filter(|a| {
                !triggered
                    .iter()
                    .any(|b| b.target != a.target && self.strictly_more_specific(b, a))
            })
            .copied()
            .collect();

        let mut targets: Vec<String> = maximal.iter().map(|s| s.target.clone()).collect();
        targets.sort();
        targets.dedup();

        match targets.len() {
            1 => {
                let target = targets.into_iter().next().unwrap();
                debug!(base = %base, target = %target, "📚 MODEL: Specialization selected");
                // the target may specialize further given the same selections
                if target == base {
                    Ok(target)
                } else {
                    self.specialize_uncached(&target, selections)
                }
            }
            _ => Err(ModelError::AmbiguousSpecialization {
                base: base.to_string(),
                candidates: targets,
            }),
        }
    }

    fn specialization_triggered(
        &self,
        specialization: &Specialization,
        selections: &BTreeMap<String, String>,
    ) -> bool {
        specialization.triggers.iter().all(|(child, trigger)| {
            selections
                .get(child)
                .is_some_and(|selected| self.fulfills(selected, trigger))
        })
    }

    /// Whether specialization `a` implies everything `b` requires, and more
    fn strictly_more_specific(&self, a: &Specialization, b: &Specialization) -> bool {
        let implies_all = b.triggers.iter().all(|(child, b_model)| {
            a.triggers
                .get(child)
                .is_some_and(|a_model| self.fulfills(a_model, b_model))
        });
        implies_all && a.triggers != b.triggers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::component::Port;
    use crate::model::composition::ChildDefinition;

    fn registry_with_hierarchy() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .register(Model::Service(ServiceModel::new("image_source")))
            .unwrap();
        registry
            .register(Model::Component(
                ComponentModel::new("video_source")
                    .with_port(Port::output("frames", "image"))
                    .providing("image_source", []),
            ))
            .unwrap();
        registry
            .register(Model::Component(
                ComponentModel::new("gige_video_source").with_parent("video_source"),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_specialization_chain() {
        let registry = registry_with_hierarchy();
        assert!(registry.is_specialization_of("gige_video_source", "video_source"));
        assert!(registry.is_specialization_of("video_source", "video_source"));
        assert!(!registry.is_specialization_of("video_source", "gige_video_source"));
    }

    #[test]
    fn test_fulfills_through_provides() {
        let registry = registry_with_hierarchy();
        assert!(registry.fulfills("video_source", "image_source"));
        // inherited through the parent chain
        assert!(registry.fulfills("gige_video_source", "image_source"));
        assert!(!registry.fulfills("image_source", "video_source"));
    }

    #[test]
    fn test_components_providing_sorted() {
        let registry = registry_with_hierarchy();
        let providers = registry.components_providing("image_source");
        assert_eq!(providers, vec!["gige_video_source", "video_source"]);
    }

    #[test]
    fn test_inherited_ports() {
        let registry = registry_with_hierarchy();
        let port = registry
            .resolve_port("gige_video_source", "frames")
            .unwrap()
            .unwrap();
        assert_eq!(port.data_type, "image".into());
    }

    #[test]
    fn test_bound_service_resolves_through_parent_chain() {
        let mut registry = ModelRegistry::new();
        registry
            .register(Model::Service(ServiceModel::new("image_source")))
            .unwrap();
        registry
            .register(Model::Component(
                ComponentModel::new("stereo_camera")
                    .with_port(Port::output("left_frames", "image"))
                    .providing(
                        "image_source",
                        [("frames".to_string(), "left_frames".to_string())],
                    ),
            ))
            .unwrap();
        registry
            .register(Model::Component(
                ComponentModel::new("gige_stereo_camera").with_parent("stereo_camera"),
            ))
            .unwrap();

        // the provides declaration is inherited by the refinement
        let bound = registry
            .bound_service("gige_stereo_camera", "image_source")
            .unwrap();
        assert_eq!(bound.component_port("frames"), "left_frames");

        let err = registry
            .bound_service("gige_stereo_camera", "laser_source")
            .unwrap_err();
        assert!(matches!(err, ModelError::ServiceNotProvided { .. }));
    }

    #[test]
    fn test_ensure_loaded_pulls_references() {
        struct FixtureLoader;

        impl ModelLoader for FixtureLoader {
            fn load(&self, name: &str) -> ModelResult<Model> {
                match name {
                    "image_source" => Ok(Model::Service(ServiceModel::new("image_source"))),
                    "video_source" => Ok(Model::Component(
                        ComponentModel::new("video_source").providing("image_source", []),
                    )),
                    "gige_video_source" => Ok(Model::Component(
                        ComponentModel::new("gige_video_source").with_parent("video_source"),
                    )),
                    other => Err(ModelError::not_found(other)),
                }
            }
        }

        let mut registry = ModelRegistry::new();
        registry
            .ensure_loaded(&FixtureLoader, "gige_video_source")
            .unwrap();
        // the parent and its provided service were pulled in transitively
        assert!(registry.contains("video_source"));
        assert!(registry.is_service("image_source"));
        assert!(registry.fulfills("gige_video_source", "image_source"));

        let err = registry.ensure_loaded(&FixtureLoader, "laser_source").unwrap_err();
        assert!(matches!(err, ModelError::NotFound { .. }));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry_with_hierarchy();
        let err = registry
            .register(Model::Component(ComponentModel::new("video_source")))
            .unwrap_err();
        assert!(matches!(err, ModelError::Duplicate { .. }));
    }

    #[test]
    fn test_specialize_picks_most_specific() {
        let mut registry = registry_with_hierarchy();
        registry
            .register(Model::Composition(
                CompositionModel::new("tracker")
                    .with_child("source", ChildDefinition::new("image_source"))
                    .with_specialization(Specialization::new(
                        [("source".to_string(), "video_source".to_string())],
                        "tracker_with_video",
                    ))
                    .with_specialization(Specialization::new(
                        [("source".to_string(), "gige_video_source".to_string())],
                        "tracker_with_gige",
                    )),
            ))
            .unwrap();
        registry
            .register(Model::Composition(CompositionModel::new(
                "tracker_with_video",
            )))
            .unwrap();
        registry
            .register(Model::Composition(CompositionModel::new(
                "tracker_with_gige",
            )))
            .unwrap();

        let selections: BTreeMap<String, String> =
            [("source".to_string(), "gige_video_source".to_string())]
                .into_iter()
                .collect();
        assert_eq!(
            registry.specialize("tracker", &selections).unwrap(),
            "tracker_with_gige"
        );

        let selections: BTreeMap<String, String> =
            [("source".to_string(), "video_source".to_string())]
                .into_iter()
                .collect();
        assert_eq!(
            registry.specialize("tracker", &selections).unwrap(),
            "tracker_with_video"
        );
    }
}
