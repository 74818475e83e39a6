//! Dependency-injection context: a stack of selection scopes walked from the
//! outermost composition to the innermost child.

use std::collections::BTreeMap;

use serde_json::Value;

use super::instance_requirements::{
    ArgumentValue, InstanceRequirements, RequirementError, RequirementResult,
};
use crate::model::ModelRegistry;

/// Selections contributed by one composition level
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionScope {
    /// child role name -> selected model
    pub by_child: BTreeMap<String, String>,
    /// abstract model or service name -> selected model
    pub by_model: BTreeMap<String, String>,
    /// placeholder name -> value, for unbound arguments
    pub arguments: BTreeMap<String, Value>,
}

impl SelectionScope {
    pub fn from_requirements(ir: &InstanceRequirements) -> Self {
        Self {
            by_child: ir.selections.clone(),
            by_model: ir.model_selections.clone(),
            arguments: ir
                .arguments
                .iter()
                .filter_map(|(name, value)| {
                    value.as_value().map(|v| (name.clone(), v.clone()))
                })
                .collect(),
        }
    }
}

/// Stack of selection scopes; the innermost scope wins.
#[derive(Debug, Clone, Default)]
pub struct InjectionContext {
    scopes: Vec<SelectionScope>,
}

impl InjectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: SelectionScope) {
        self.scopes.push(scope);
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Explicit selection for a child role, innermost scope first
    pub fn selection_for_child(&self, child: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.by_child.get(child).map(String::as_str))
    }

    /// Explicit selection for an abstract model request, innermost scope first
    pub fn selection_for_model(&self, request: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.by_model.get(request).map(String::as_str))
    }

    /// Value bound to an argument placeholder, innermost scope first
    pub fn argument_binding(&self, placeholder: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.arguments.get(placeholder))
    }
}

/// Substitute abstract service/model requests in `ir` with concrete component
/// models, and bind placeholder arguments from the context.
///
/// Precedence: the requirement's own explicit selection, then the innermost
/// context scope with a matching selection, then the registry's provides
/// table. Among provider defaults, strictly more specific models shadow their
/// ancestors; several equally-specific candidates fail with
/// `AmbiguousSelection` naming all of them.
pub fn resolve_injection(
    ir: &InstanceRequirements,
    context: &InjectionContext,
    registry: &ModelRegistry,
) -> RequirementResult<InstanceRequirements> {
    let mut resolved = ir.clone();

    let mut models = std::collections::BTreeSet::new();
    for model in &ir.models {
        models.insert(resolve_model_request(ir, model, context, registry)?);
    }
    resolved.models = models;

    for (name, value) in &mut resolved.arguments {
        if let ArgumentValue::Unbound { placeholder } = value {
            let binding = context
                .argument_binding(placeholder)
                .or_else(|| context.argument_binding(name));
            if let Some(bound) = binding {
                *value = ArgumentValue::Bound(bound.clone());
            }
        }
    }

    Ok(resolved)
}

fn resolve_model_request(
    ir: &InstanceRequirements,
    request: &str,
    context: &InjectionContext,
    registry: &ModelRegistry,
) -> RequirementResult<String> {
    if !registry.is_service(request) {
        return Ok(request.to_string());
    }

    if let Some(selected) = ir.model_selections.get(request) {
        return check_selection(selected, request, registry);
    }
    if let Some(selected) = context.selection_for_model(request) {
        return check_selection(selected, request, registry);
    }

    let candidates = registry.components_providing(request);
    let maximal: Vec<&str> = candidates
        .iter()
        .copied()
        .filter(|c| {
            !candidates
                .iter()
                .any(|d| *d != *c && registry.is_specialization_of(d, c))
        })
        .collect();

    match maximal.len() {
        // no provider registered: leave the request abstract so generation
        // reports it as a missing model with full context
        0 => Ok(request.to_string()),
        1 => Ok(maximal[0].to_string()),
        _ => Err(RequirementError::AmbiguousSelection {
            request: request.to_string(),
            candidates: maximal.iter().map(|c| c.to_string()).collect(),
        }),
    }
}

fn check_selection(
    selected: &str,
    request: &str,
    registry: &ModelRegistry,
) -> RequirementResult<String> {
    if registry.fulfills(selected, request) {
        Ok(selected.to_string())
    } else {
        Err(RequirementError::InvalidSelection {
            child: request.to_string(),
            selected: selected.to_string(),
            declared: request.to_string(),
        })
    }
}
