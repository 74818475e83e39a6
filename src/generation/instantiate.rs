//! Recursive instantiation of requirement trees into candidate subgraphs.
//!
//! Walks each requirement tree with a dependency-injection scope stack,
//! resolves composition children and specializations, and emits candidate
//! nodes and connections into the candidate graph.

use std::collections::BTreeMap;

use tracing::debug;

use super::candidates::{CandidateConnection, CandidateGraph, CandidateNode};
use super::errors::{GenerationError, GenerationResult};
use crate::model::{ModelError, ModelRegistry};
use crate::requirements::{
    resolve_injection, ArgumentValue, InjectionContext, InstanceRequirements, RequirementError,
    RequirementId, SelectionScope,
};

/// Shape of one instantiated requirement: either a single candidate node or
/// a composition of named child units
#[derive(Debug, Clone)]
pub enum InstantiatedUnit {
    Component(usize),
    Composition {
        model: String,
        children: BTreeMap<String, InstantiatedUnit>,
    },
}

/// Instantiate one root requirement into the candidate graph
pub fn instantiate_requirement(
    graph: &mut CandidateGraph,
    id: RequirementId,
    ir: &InstanceRequirements,
    registry: &ModelRegistry,
) -> GenerationResult<InstantiatedUnit> {
    let mut injection = InjectionContext::new();
    instantiate_node(
        graph,
        id,
        ir,
        &id.to_string(),
        ir.deployment_group.clone(),
        &mut injection,
        registry,
    )
}

fn instantiate_node(
    graph: &mut CandidateGraph,
    id: RequirementId,
    ir: &InstanceRequirements,
    path: &str,
    group: Option<String>,
    injection: &mut InjectionContext,
    registry: &ModelRegistry,
) -> GenerationResult<InstantiatedUnit> {
    let resolved = resolve_injection(ir, injection, registry)?;

    if resolved.models.is_empty() {
        return Err(GenerationError::CannotInstallMissingModel {
            request: "<no model>".to_string(),
            required_by: path.to_string(),
        });
    }

    let group = resolved.deployment_group.clone().or(group);

    if let Some(model_name) = resolved.concrete_model() {
        if registry.is_composition(model_name) {
            let model_name = model_name.to_string();
            return instantiate_composition(
                graph, id, &resolved, &model_name, path, group, injection, registry,
            );
        }
    }

    // component, service, or still-disjunctive request: one candidate node;
    // merging and the concreteness check deal with the rest
    let node = CandidateNode {
        path: path.to_string(),
        models: resolved.models.clone(),
        arguments: resolved.arguments.clone(),
        deployment_group: group,
        refs: [id].into_iter().collect(),
    };
    debug!(path = %path, models = ?node.models, "🧩 GENERATION: Candidate node");
    Ok(InstantiatedUnit::Component(graph.add_node(node)))
}

#[allow(clippy::too_many_arguments)]
fn instantiate_composition(
    graph: &mut CandidateGraph,
    id: RequirementId,
    ir: &InstanceRequirements,
    base_model: &str,
    path: &str,
    group: Option<String>,
    injection: &mut InjectionContext,
    registry: &ModelRegistry,
) -> GenerationResult<InstantiatedUnit> {
    // specializations trigger on the explicit child bindings
    let base = registry.composition(base_model)?;
    let mut selections: BTreeMap<String, String> = BTreeMap::new();
    for (role, child_def) in &base.children {
        let effective = ir
            .selections
            .get(role)
            .map(String::as_str)
            .or_else(|| injection.selection_for_child(role))
            .or_else(|| ir.children.get(role).and_then(|c| c.concrete_model()))
            .unwrap_or(&child_def.model);
        selections.insert(role.clone(), effective.to_string());
    }
    let model_name = registry.specialize(base_model, &selections)?;
    let composition = registry.composition(&model_name)?;

    injection.push(SelectionScope::from_requirements(ir));

    let result = (|| {
        let mut children: BTreeMap<String, InstantiatedUnit> = BTreeMap::new();
        for (role, child_def) in &composition.children {
            let selected = ir
                .selections
                .get(role)
                .map(String::as_str)
                .or_else(|| injection.selection_for_child(role))
                .map(str::to_string);

            if let Some(selected) = &selected {
                if !registry.fulfills(selected, &child_def.model) {
                    return Err(GenerationError::Requirement(
                        RequirementError::InvalidSelection {
                            child: format!("{path}.{role}"),
                            selected: selected.clone(),
                            declared: child_def.model.clone(),
                        },
                    ));
                }
            }

            let mut child_ir = ir.children.get(role).cloned().unwrap_or_default();
            if let Some(selected) = selected {
                child_ir.models = [selected].into_iter().collect();
            } else if child_ir.models.is_empty() {
                child_ir.models = [child_def.model.clone()].into_iter().collect();
            } else if !child_ir
                .models
                .iter()
                .all(|m| registry.fulfills(m, &child_def.model))
            {
                return Err(GenerationError::Requirement(
                    RequirementError::InvalidSelection {
                        child: format!("{path}.{role}"),
                        selected: child_ir.models.iter().cloned().collect::<Vec<_>>().join("|"),
                        declared: child_def.model.clone(),
                    },
                ));
            }

            for (name, value) in &child_def.arguments {
                child_ir
                    .arguments
                    .entry(name.clone())
                    .or_insert_with(|| ArgumentValue::Bound(value.clone()));
            }

            let unit = instantiate_node(
                graph,
                id,
                &child_ir,
                &format!("{path}.{role}"),
                group.clone(),
                injection,
                registry,
            )?;
            children.insert(role.clone(), unit);
        }

        for connection in &composition.connections {
            let source_unit = children.get(&connection.source_child).ok_or_else(|| {
                GenerationError::Model(ModelError::not_found(format!(
                    "{model_name}.{}",
                    connection.source_child
                )))
            })?;
            let sink_unit = children.get(&connection.sink_child).ok_or_else(|| {
                GenerationError::Model(ModelError::not_found(format!(
                    "{model_name}.{}",
                    connection.sink_child
                )))
            })?;

            let (source, source_port) = resolve_endpoint(
                source_unit,
                connection.source_port.clone(),
                registry,
                &format!("{path}.{}", connection.source_child),
            )?;
            let (sink, sink_port) = resolve_endpoint(
                sink_unit,
                connection.sink_port.clone(),
                registry,
                &format!("{path}.{}", connection.sink_child),
            )?;

            graph.add_connection(CandidateConnection {
                source,
                source_port,
                sink,
                sink_port,
                policy: connection.policy,
            });
        }

        Ok(InstantiatedUnit::Composition {
            model: model_name.clone(),
            children,
        })
    })();

    injection.pop();
    result
}

/// Resolve a connection endpoint down to a candidate node, following export
/// declarations through nested compositions
fn resolve_endpoint(
    unit: &InstantiatedUnit,
    port: Option<String>,
    registry: &ModelRegistry,
    path: &str,
) -> GenerationResult<(usize, Option<String>)> {
    match unit {
        InstantiatedUnit::Component(index) => Ok((*index, port)),
        InstantiatedUnit::Composition { model, children } => {
            let composition = registry.composition(model)?;
            let export = match &port {
                Some(name) => composition
                    .exports
                    .iter()
                    .find(|e| &e.name == name)
                    .ok_or_else(|| GenerationError::MissingPort {
                        task: path.to_string(),
                        model: model.clone(),
                        port: name.clone(),
                    })?,
                None => match composition.exports.as_slice() {
                    [only] => only,
                    [] => {
                        return Err(GenerationError::NoConnectionCandidate {
                            task: path.to_string(),
                            model: model.clone(),
                            other: "<export>".to_string(),
                        })
                    }
                    exports => {
                        let mut candidates: Vec<String> =
                            exports.iter().map(|e| format!("{path}.{}", e.name)).collect();
                        candidates.sort();
                        return Err(GenerationError::AmbiguousConnection {
                            source_id: path.to_string(),
                            sink: "<export>".to_string(),
                            candidates,
                        });
                    }
                },
            };
            let child_unit = children.get(&export.child).ok_or_else(|| {
                GenerationError::Model(ModelError::not_found(format!(
                    "{model}.{}",
                    export.child
                )))
            })?;
            resolve_endpoint(
                child_unit,
                export.child_port.clone().or_else(|| Some(export.name.clone())),
                registry,
                &format!("{path}.{}", export.child),
            )
        }
    }
}

/// Collect every node index reachable from a unit
pub fn unit_nodes(unit: &InstantiatedUnit, into: &mut Vec<usize>) {
    match unit {
        InstantiatedUnit::Component(index) => into.push(*index),
        InstantiatedUnit::Composition { children, .. } => {
            for child in children.values() {
                unit_nodes(child, into);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ChildDefinition, ComponentModel, CompositionModel, InternalConnection, Port,
    };

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .register(Model::Component(
                ComponentModel::new("video_source").with_port(Port::output("frames", "image")),
            ))
            .unwrap();
        registry
            .register(Model::Component(
                ComponentModel::new("edge_detector")
                    .with_port(Port::input("frames", "image"))
                    .with_port(Port::output("edges", "image")),
            ))
            .unwrap();
        registry
            .register(Model::Composition(
                CompositionModel::new("vision_pipeline")
                    .with_child("source", ChildDefinition::new("video_source"))
                    .with_child("filter", ChildDefinition::new("edge_detector"))
                    .with_connection(
                        InternalConnection::new("source", "filter").ports("frames", "frames"),
                    ),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_composition_expands_children_and_connections() {
        let registry = registry();
        let mut graph = CandidateGraph::new();
        let ir = InstanceRequirements::of_model("vision_pipeline");
        let unit =
            instantiate_requirement(&mut graph, RequirementId(1), &ir, &registry).unwrap();

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.connections.len(), 1);
        let mut nodes = Vec::new();
        unit_nodes(&unit, &mut nodes);
        assert_eq!(nodes.len(), 2);

        let connection = &graph.connections[0];
        assert_eq!(connection.source_port.as_deref(), Some("frames"));
        assert_eq!(connection.sink_port.as_deref(), Some("frames"));
    }

    #[test]
    fn test_child_arguments_flow_down() {
        let mut registry = registry();
        registry
            .register(Model::Composition(
                CompositionModel::new("tuned_pipeline")
                    .with_child(
                        "source",
                        ChildDefinition::new("video_source")
                            .with_argument("frame_rate", 60.into()),
                    )
                    .with_child("filter", ChildDefinition::new("edge_detector")),
            ))
            .unwrap();

        let mut graph = CandidateGraph::new();
        let ir = InstanceRequirements::of_model("tuned_pipeline");
        instantiate_requirement(&mut graph, RequirementId(1), &ir, &registry).unwrap();

        let source = graph
            .nodes
            .iter()
            .find(|n| n.path.ends_with(".source"))
            .unwrap();
        assert_eq!(
            source.arguments.get("frame_rate"),
            Some(&ArgumentValue::bound(60))
        );
    }

    #[test]
    fn test_invalid_selection_is_rejected() {
        let mut registry = registry();
        registry
            .register(Model::Component(ComponentModel::new("unrelated")))
            .unwrap();

        let mut graph = CandidateGraph::new();
        let ir = InstanceRequirements::of_model("vision_pipeline")
            .with_selection("source", "unrelated");
        let err = instantiate_requirement(&mut graph, RequirementId(1), &ir, &registry)
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Requirement(RequirementError::InvalidSelection { .. })
        ));
    }
}
