//! Deployment selection for concrete tasks.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::candidates::CandidateGraph;
use super::errors::GenerationError;
use crate::deployment::DeploymentRegistry;
use crate::graph::DeploymentAssignment;
use crate::model::ModelRegistry;

/// Match every concrete candidate against the configured deployments.
///
/// Explicit deployment-group preferences restrict the candidate set; the
/// remaining choice is deterministic (priority, then name, see
/// [`DeploymentRegistry::candidates_for`]). Each deployment task slot hosts
/// at most one instance, so assignment walks nodes in sorted path order and
/// books slots as it goes.
pub fn assign_deployments(
    graph: &CandidateGraph,
    models: &ModelRegistry,
    deployments: &DeploymentRegistry,
    errors: &mut Vec<GenerationError>,
) -> BTreeMap<usize, DeploymentAssignment> {
    let mut assignments: BTreeMap<usize, DeploymentAssignment> = BTreeMap::new();
    let mut used_slots: BTreeSet<(String, String)> = BTreeSet::new();

    let mut order: Vec<usize> = (0..graph.nodes.len()).collect();
    order.sort_by(|a, b| graph.nodes[*a].path.cmp(&graph.nodes[*b].path));

    for index in order {
        let node = &graph.nodes[index];
        let Some(model) = node.concrete_model() else {
            // abstract nodes are reported by the concreteness check
            continue;
        };

        let group = node.deployment_group.as_deref();
        let mut assigned = false;
        for candidate in deployments.candidates_for(model, group, models) {
            let slot = candidate
                .deployment
                .slots_for(model, models)
                .into_iter()
                .find(|slot| {
                    !used_slots.contains(&(candidate.name().to_string(), slot.to_string()))
                })
                .map(str::to_string);
            if let Some(slot) = slot {
                used_slots.insert((candidate.name().to_string(), slot.clone()));
                let assignment = DeploymentAssignment {
                    deployment: candidate.name().to_string(),
                    process_server: candidate.process_server.clone(),
                    remote_name: candidate.deployment.remote_name(&slot).to_string(),
                };
                debug!(
                    task = %node.path,
                    deployment = %assignment.deployment,
                    remote_name = %assignment.remote_name,
                    "🧩 GENERATION: Deployment assigned"
                );
                assignments.insert(index, assignment);
                assigned = true;
                break;
            }
        }

        if !assigned {
            errors.push(GenerationError::MissingDeployment {
                task: node.path.clone(),
                model: model.to_string(),
                group: node.deployment_group.clone(),
            });
        }
    }

    assignments
}
