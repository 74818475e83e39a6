//! Requirement trees and the merge operation that unifies compatible ones.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::ModelRegistry;

/// Stable identity of a root requirement held by the orchestrator.
///
/// Tasks in the data-flow graph carry back-references to these; a task
/// referenced by at least one live requirement is never torn down.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RequirementId(pub u64);

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// A named task-construction argument, either bound to a concrete value or an
/// unbound placeholder resolved later from the injection context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ArgumentValue {
    Bound(Value),
    Unbound { placeholder: String },
}

impl ArgumentValue {
    pub fn bound(value: impl Into<Value>) -> Self {
        Self::Bound(value.into())
    }

    pub fn unbound(placeholder: impl Into<String>) -> Self {
        Self::Unbound {
            placeholder: placeholder.into(),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Bound(value) => Some(value),
            Self::Unbound { .. } => None,
        }
    }
}

/// Errors raised while merging or resolving requirements
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequirementError {
    #[error("incompatible model sets: {left:?} vs {right:?}")]
    IncompatibleModels {
        left: Vec<String>,
        right: Vec<String>,
    },

    #[error("conflicting values for argument {name}: {left} vs {right}")]
    ConflictingArguments {
        name: String,
        left: Value,
        right: Value,
    },

    #[error("selection {selected} for child {child} does not fulfill {declared}")]
    InvalidSelection {
        child: String,
        selected: String,
        declared: String,
    },

    #[error("ambiguous selection for {request}: candidates {candidates:?}")]
    AmbiguousSelection {
        request: String,
        candidates: Vec<String>,
    },

    #[error("conflicting deployment groups: {left} vs {right}")]
    ConflictingDeploymentGroups { left: String, right: String },
}

pub type RequirementResult<T> = std::result::Result<T, RequirementError>;

/// Abstract specification of one desired component instance.
///
/// `models` is a disjunction narrowed towards a single concrete component
/// model by merging and injection. Children of composition requirements are
/// themselves requirements, forming a tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceRequirements {
    /// Candidate models; the instance must fulfill every entry
    pub models: BTreeSet<String>,
    /// Explicit dependency-injection overrides keyed by child role name
    #[serde(default)]
    pub selections: BTreeMap<String, String>,
    /// Explicit overrides keyed by the abstract model they replace
    #[serde(default)]
    pub model_selections: BTreeMap<String, String>,
    #[serde(default)]
    pub arguments: BTreeMap<String, ArgumentValue>,
    /// Preferred deployment group for the resulting task
    #[serde(default)]
    pub deployment_group: Option<String>,
    /// Child requirements, for composition models
    #[serde(default)]
    pub children: BTreeMap<String, InstanceRequirements>,
}

impl InstanceRequirements {
    pub fn of_model(model: impl Into<String>) -> Self {
        Self {
            models: BTreeSet::from([model.into()]),
            ..Self::default()
        }
    }

    pub fn of_models(models: impl IntoIterator<Item = String>) -> Self {
        Self {
            models: models.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: ArgumentValue) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn with_selection(
        mut self,
        child: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        self.selections.insert(child.into(), model.into());
        self
    }

    pub fn with_model_selection(
        mut self,
        abstract_model: impl Into<String>,
        concrete: impl Into<String>,
    ) -> Self {
        self.model_selections
            .insert(abstract_model.into(), concrete.into());
        self
    }

    pub fn with_deployment_group(mut self, group: impl Into<String>) -> Self {
        self.deployment_group = Some(group.into());
        self
    }

    pub fn with_child(mut self, name: impl Into<String>, child: InstanceRequirements) -> Self {
        self.children.insert(name.into(), child);
        self
    }

    /// The single concrete model, when the requirement has been narrowed to
    /// exactly one candidate
    pub fn concrete_model(&self) -> Option<&str> {
        if self.models.len() == 1 {
            self.models.iter().next().map(String::as_str)
        } else {
            None
        }
    }

    /// Check that every explicit child selection fulfills the model the child
    /// role declares
    pub fn validate(&self, registry: &ModelRegistry) -> RequirementResult<()> {
        for model_name in &self.models {
            let Ok(model) = registry.get(model_name) else {
                continue;
            };
            let Some(composition) = model.as_composition() else {
                continue;
            };
            for (child, selected) in &self.selections {
                if let Some(declared) = composition.child(child) {
                    if !registry.fulfills(selected, &declared.model) {
                        return Err(RequirementError::InvalidSelection {
                            child: child.clone(),
                            selected: selected.clone(),
                            declared: declared.model.clone(),
                        });
                    }
                }
            }
        }
        for child in self.children.values() {
            child.validate(registry)?;
        }
        Ok(())
    }

    /// Combine two requirements referring to the same logical slot.
    ///
    /// Model sets must be ordered by inclusion; the merged set is the
    /// intersection. Arguments must agree on every bound value; selections
    /// union, with the more specific model winning a per-child conflict.
    pub fn merge(
        &self,
        other: &Self,
        registry: &ModelRegistry,
    ) -> RequirementResult<Self> {
        let models = merge_model_sets(&self.models, &other.models)?;
        let arguments = merge_arguments(&self.arguments, &other.arguments)?;
        let selections =
            merge_selections(&self.selections, &other.selections, registry)?;
        let model_selections =
            merge_selections(&self.model_selections, &other.model_selections, registry)?;

        let deployment_group = match (&self.deployment_group, &other.deployment_group) {
            (Some(a), Some(b)) if a != b => {
                return Err(RequirementError::ConflictingDeploymentGroups {
                    left: a.clone(),
                    right: b.clone(),
                })
            }
            (Some(a), _) => Some(a.clone()),
            (None, b) => b.clone(),
        };

        let mut children = self.children.clone();
        for (name, theirs) in &other.children {
            match children.remove(name) {
                Some(ours) => {
                    children.insert(name.clone(), ours.merge(theirs, registry)?);
                }
                None => {
                    children.insert(name.clone(), theirs.clone());
                }
            }
        }

        Ok(Self {
            models,
            selections,
            model_selections,
            arguments,
            deployment_group,
            children,
        })
    }

    /// Whether `merge` would succeed, without building the result
    pub fn mergeable_with(&self, other: &Self, registry: &ModelRegistry) -> bool {
        self.merge(other, registry).is_ok()
    }
}

fn merge_model_sets(
    left: &BTreeSet<String>,
    right: &BTreeSet<String>,
) -> RequirementResult<BTreeSet<String>> {
    if left.is_superset(right) && !right.is_empty() {
        Ok(right.clone())
    } else if right.is_superset(left) && !left.is_empty() {
        Ok(left.clone())
    } else {
        Err(RequirementError::IncompatibleModels {
            left: left.iter().cloned().collect(),
            right: right.iter().cloned().collect(),
        })
    }
}

fn merge_arguments(
    left: &BTreeMap<String, ArgumentValue>,
    right: &BTreeMap<String, ArgumentValue>,
) -> RequirementResult<BTreeMap<String, ArgumentValue>> {
    let mut merged = left.clone();
    for (name, theirs) in right {
        match merged.get(name) {
            None => {
                merged.insert(name.clone(), theirs.clone());
            }
            Some(ours) => match (ours, theirs) {
                (ArgumentValue::Bound(a), ArgumentValue::Bound(b)) => {
                    if a != b {
                        return Err(RequirementError::ConflictingArguments {
                            name: name.clone(),
                            left: a.clone(),
                            right: b.clone(),
                        });
                    }
                }
                (ArgumentValue::Unbound { .. }, ArgumentValue::Bound(_)) => {
                    merged.insert(name.clone(), theirs.clone());
                }
                (ArgumentValue::Bound(_), ArgumentValue::Unbound { .. }) => {}
                // two placeholders: keep the lexicographically smallest so
                // the merge stays commutative
                (
                    ArgumentValue::Unbound { placeholder: a },
                    ArgumentValue::Unbound { placeholder: b },
                ) => {
                    if b < a {
                        merged.insert(name.clone(), theirs.clone());
                    }
                }
            },
        }
    }
    Ok(merged)
}

fn merge_selections(
    left: &BTreeMap<String, String>,
    right: &BTreeMap<String, String>,
    registry: &ModelRegistry,
) -> RequirementResult<BTreeMap<String, String>> {
    let mut merged = left.clone();
    for (key, theirs) in right {
        match merged.get(key) {
            None => {
                merged.insert(key.clone(), theirs.clone());
            }
            Some(ours) if ours == theirs => {}
            Some(ours) => {
                if registry.is_specialization_of(theirs, ours) {
                    merged.insert(key.clone(), theirs.clone());
                } else if registry.is_specialization_of(ours, theirs) {
                    // ours already more specific
                } else {
                    return Err(RequirementError::IncompatibleModels {
                        left: vec![ours.clone()],
                        right: vec![theirs.clone()],
                    });
                }
            }
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentModel, Model};

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .register(Model::Component(ComponentModel::new("video_source")))
            .unwrap();
        registry
            .register(Model::Component(
                ComponentModel::new("gige_video_source").with_parent("video_source"),
            ))
            .unwrap();
        registry
            .register(Model::Component(ComponentModel::new("edge_detector")))
            .unwrap();
        registry
    }

    #[test]
    fn test_merge_narrows_model_set() {
        let registry = registry();
        let a = InstanceRequirements::of_models(
            ["video_source".to_string(), "edge_detector".to_string()].into_iter(),
        );
        let b = InstanceRequirements::of_model("video_source");
        let merged = a.merge(&b, &registry).unwrap();
        assert_eq!(merged.concrete_model(), Some("video_source"));
    }

    #[test]
    fn test_merge_rejects_disjoint_models() {
        let registry = registry();
        let a = InstanceRequirements::of_model("video_source");
        let b = InstanceRequirements::of_model("edge_detector");
        let err = a.merge(&b, &registry).unwrap_err();
        assert!(matches!(err, RequirementError::IncompatibleModels { .. }));
    }

    #[test]
    fn test_merge_rejects_conflicting_arguments() {
        let registry = registry();
        let a = InstanceRequirements::of_model("video_source")
            .with_argument("device", ArgumentValue::bound("/dev/video0"));
        let b = InstanceRequirements::of_model("video_source")
            .with_argument("device", ArgumentValue::bound("/dev/video1"));
        let err = a.merge(&b, &registry).unwrap_err();
        assert!(matches!(
            err,
            RequirementError::ConflictingArguments { .. }
        ));
    }

    #[test]
    fn test_merge_binds_placeholder() {
        let registry = registry();
        let a = InstanceRequirements::of_model("video_source")
            .with_argument("device", ArgumentValue::unbound("camera_device"));
        let b = InstanceRequirements::of_model("video_source")
            .with_argument("device", ArgumentValue::bound("/dev/video0"));
        let merged = a.merge(&b, &registry).unwrap();
        assert_eq!(
            merged.arguments.get("device"),
            Some(&ArgumentValue::bound("/dev/video0"))
        );
        // and the other way round
        let merged = b.merge(&a, &registry).unwrap();
        assert_eq!(
            merged.arguments.get("device"),
            Some(&ArgumentValue::bound("/dev/video0"))
        );
    }

    #[test]
    fn test_merge_selection_specificity() {
        let registry = registry();
        let a = InstanceRequirements::of_model("video_source")
            .with_selection("source", "video_source");
        let b = InstanceRequirements::of_model("video_source")
            .with_selection("source", "gige_video_source");
        let merged = a.merge(&b, &registry).unwrap();
        assert_eq!(
            merged.selections.get("source").map(String::as_str),
            Some("gige_video_source")
        );
    }

    #[test]
    fn test_merge_is_commutative() {
        let registry = registry();
        let a = InstanceRequirements::of_models(
            ["video_source".to_string(), "gige_video_source".to_string()].into_iter(),
        )
        .with_argument("rate", ArgumentValue::bound(30));
        let b = InstanceRequirements::of_model("gige_video_source")
            .with_argument("device", ArgumentValue::bound("/dev/video0"));
        assert_eq!(
            a.merge(&b, &registry).unwrap(),
            b.merge(&a, &registry).unwrap()
        );
    }
}
