//! Set differences between the target and live graphs.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::operations::ConnectionSpec;
use crate::graph::DataFlowGraph;
use crate::model::ModelRegistry;
use crate::runtime::pending_properties;

/// Everything that differs between the desired and the running world.
///
/// Task identity across graph generations is the task name; a name present
/// on both sides with a different model or arguments is a replacement
/// (full teardown and rebuild), since component models are immutable once
/// running.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphDelta {
    /// In target, not yet live
    pub tasks_to_add: Vec<String>,
    /// Live under the same name but with a different definition
    pub tasks_to_replace: Vec<String>,
    /// Live but no longer wanted by any requirement
    pub tasks_unreferenced: Vec<String>,
    pub connections_to_add: Vec<ConnectionSpec>,
    pub connections_to_remove: Vec<ConnectionSpec>,
    /// Tasks whose pending property values differ from what was last applied
    pub properties_to_update: Vec<String>,
}

impl GraphDelta {
    pub fn is_empty(&self) -> bool {
        self.tasks_to_add.is_empty()
            && self.tasks_to_replace.is_empty()
            && self.tasks_unreferenced.is_empty()
            && self.connections_to_add.is_empty()
            && self.connections_to_remove.is_empty()
            && self.properties_to_update.is_empty()
    }
}

/// Compute the delta for one reconciliation cycle
pub fn diff(
    target: &DataFlowGraph,
    live: &DataFlowGraph,
    registry: &ModelRegistry,
    property_defaults: &BTreeMap<String, BTreeMap<String, Value>>,
) -> GraphDelta {
    let mut delta = GraphDelta::default();

    let mut doomed: BTreeSet<String> = BTreeSet::new();

    for (_, task) in target.tasks() {
        match live.by_name(&task.name) {
            None => delta.tasks_to_add.push(task.name.clone()),
            Some(existing) => {
                if !existing.same_definition_as(task) {
                    delta.tasks_to_replace.push(task.name.clone());
                    doomed.insert(task.name.clone());
                } else if !pending_properties(
                    registry,
                    property_defaults.get(&task.model),
                    existing,
                )
                .is_empty()
                {
                    delta.properties_to_update.push(task.name.clone());
                }
            }
        }
    }

    for (_, task) in live.tasks() {
        if target.by_name(&task.name).is_none() {
            delta.tasks_unreferenced.push(task.name.clone());
            doomed.insert(task.name.clone());
        }
    }

    let live_connections = connection_specs(live);
    let target_connections = connection_specs(target);

    for spec in &live_connections {
        let touches_doomed =
            doomed.contains(&spec.source) || doomed.contains(&spec.sink);
        let still_wanted = target_connections.iter().any(|t| t == spec);
        if touches_doomed || !still_wanted {
            delta.connections_to_remove.push(spec.clone());
        }
    }

    for spec in &target_connections {
        let already_live = live_connections.iter().any(|l| l == spec);
        if !already_live {
            delta.connections_to_add.push(spec.clone());
        }
    }

    delta
}

fn connection_specs(graph: &DataFlowGraph) -> Vec<ConnectionSpec> {
    let names: BTreeMap<_, _> = graph
        .tasks()
        .map(|(id, task)| (id, task.name.clone()))
        .collect();
    let mut specs: Vec<ConnectionSpec> = graph
        .connections()
        .iter()
        .filter_map(|c| {
            Some(ConnectionSpec {
                source: names.get(&c.source)?.clone(),
                source_port: c.source_port.clone(),
                sink: names.get(&c.sink)?.clone(),
                sink_port: c.sink_port.clone(),
                policy: c.policy,
            })
        })
        .collect();
    specs.sort();
    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Connection, ConnectionPolicy, TaskInstance};
    use crate::model::{ComponentModel, Model, Port};

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .register(Model::Component(
                ComponentModel::new("video_source").with_port(Port::output("frames", "image")),
            ))
            .unwrap();
        registry
            .register(Model::Component(
                ComponentModel::new("edge_detector").with_port(Port::input("frames", "image")),
            ))
            .unwrap();
        registry
    }

    fn graph_with_pair(policy: ConnectionPolicy) -> DataFlowGraph {
        let registry = registry();
        let mut graph = DataFlowGraph::new();
        let camera = graph
            .add_task(TaskInstance::new("camera", "video_source"))
            .unwrap();
        let filter = graph
            .add_task(TaskInstance::new("filter", "edge_detector"))
            .unwrap();
        graph
            .add_connection(
                Connection {
                    source: camera,
                    source_port: "frames".to_string(),
                    sink: filter,
                    sink_port: "frames".to_string(),
                    policy,
                },
                &registry,
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_identical_graphs_produce_empty_delta() {
        let registry = registry();
        let target = graph_with_pair(ConnectionPolicy::data());
        let live = graph_with_pair(ConnectionPolicy::data());
        let delta = diff(&target, &live, &registry, &BTreeMap::new());
        assert!(delta.is_empty());
    }

    #[test]
    fn test_policy_change_produces_remove_and_add() {
        let registry = registry();
        let target = graph_with_pair(ConnectionPolicy::buffer(8));
        let live = graph_with_pair(ConnectionPolicy::data());
        let delta = diff(&target, &live, &registry, &BTreeMap::new());

        assert_eq!(delta.connections_to_remove.len(), 1);
        assert_eq!(delta.connections_to_add.len(), 1);
        assert_eq!(delta.connections_to_remove[0].policy, ConnectionPolicy::data());
        assert_eq!(
            delta.connections_to_add[0].policy,
            ConnectionPolicy::buffer(8)
        );
    }

    #[test]
    fn test_argument_change_is_a_replacement() {
        let registry = registry();
        let mut target = DataFlowGraph::new();
        target
            .add_task(
                TaskInstance::new("camera", "video_source")
                    .with_argument("device", "/dev/video1".into()),
            )
            .unwrap();
        let mut live = DataFlowGraph::new();
        live.add_task(
            TaskInstance::new("camera", "video_source")
                .with_argument("device", "/dev/video0".into()),
        )
        .unwrap();

        let delta = diff(&target, &live, &registry, &BTreeMap::new());
        assert_eq!(delta.tasks_to_replace, vec!["camera".to_string()]);
        assert!(delta.tasks_to_add.is_empty());
    }

    #[test]
    fn test_withdrawn_task_is_unreferenced() {
        let registry = registry();
        let target = DataFlowGraph::new();
        let mut live = DataFlowGraph::new();
        live.add_task(TaskInstance::new("camera", "video_source"))
            .unwrap();

        let delta = diff(&target, &live, &registry, &BTreeMap::new());
        assert_eq!(delta.tasks_unreferenced, vec!["camera".to_string()]);
    }
}
