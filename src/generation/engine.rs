//! The generation engine: requirements in, concrete target graph out.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, warn};

use super::candidates::CandidateGraph;
use super::connections::resolve_connections;
use super::deployments::assign_deployments;
use super::errors::{GenerationError, GenerationFailure};
use super::instantiate::instantiate_requirement;
use super::merge::merge_candidates;
use crate::context::OrchestratorContext;
use crate::graph::{Connection, DataFlowGraph, TaskId, TaskInstance};
use crate::logging::log_generation;
use crate::requirements::{InstanceRequirements, RequirementId};
use crate::state_machine::DeploymentState;

/// Produces a fresh target graph from the current requirement set each cycle.
///
/// Generation never touches live state: it reads the shared model and
/// deployment registries and returns a new [`DataFlowGraph`] for the
/// reconciler to diff against.
pub struct GenerationEngine<'ctx> {
    context: &'ctx OrchestratorContext,
}

impl<'ctx> GenerationEngine<'ctx> {
    pub fn new(context: &'ctx OrchestratorContext) -> Self {
        Self { context }
    }

    /// Generate the target graph for a batch of requirements.
    ///
    /// All-or-nothing: any error aborts the batch, and every error gathered
    /// across instantiation, merging, the concreteness check, connection
    /// resolution, and deployment selection is reported together.
    pub fn generate(
        &self,
        requirements: &BTreeMap<RequirementId, InstanceRequirements>,
    ) -> Result<DataFlowGraph, GenerationFailure> {
        let started = Instant::now();
        let registry = &self.context.models;
        let mut errors: Vec<GenerationError> = Vec::new();

        let mut candidates = CandidateGraph::new();
        for (id, ir) in requirements {
            if let Err(error) = ir.validate(registry) {
                errors.push(error.into());
                continue;
            }
            if let Err(error) = instantiate_requirement(&mut candidates, *id, ir, registry) {
                errors.push(error);
            }
        }

        let merged = merge_candidates(candidates, registry);
        self.check_concreteness(&merged, &mut errors);

        let connections = resolve_connections(&merged, registry, &mut errors);
        let assignments =
            assign_deployments(&merged, registry, &self.context.deployments, &mut errors);

        if !errors.is_empty() {
            warn!(
                requirements = requirements.len(),
                errors = errors.len(),
                "🧩 GENERATION: Batch failed"
            );
            return Err(GenerationFailure::new(errors));
        }

        // everything resolved; build the concrete graph
        let mut graph = DataFlowGraph::new();
        let mut ids: BTreeMap<usize, TaskId> = BTreeMap::new();
        for (index, node) in merged.nodes.iter().enumerate() {
            let assignment = assignments
                .get(&index)
                .cloned()
                .expect("deployment assignment checked above");
            let name = format!("{}.{}", assignment.deployment, assignment.remote_name);

            let mut task = TaskInstance::new(name, node.concrete_model().unwrap_or_default());
            task.arguments = node.bound_arguments();
            task.deployment = Some(assignment);
            task.state = DeploymentState::SelectedForDeployment;
            task.requirement_refs = node.refs.clone();

            match graph.add_task(task) {
                Ok(id) => {
                    ids.insert(index, id);
                }
                Err(error) => errors.push(error.into()),
            }
        }

        for connection in &connections {
            let (Some(&source), Some(&sink)) =
                (ids.get(&connection.source), ids.get(&connection.sink))
            else {
                continue;
            };
            let result = graph.add_connection(
                Connection {
                    source,
                    source_port: connection.source_port.clone(),
                    sink,
                    sink_port: connection.sink_port.clone(),
                    policy: connection.policy,
                },
                registry,
            );
            if let Err(error) = result {
                errors.push(error.into());
            }
        }

        if !errors.is_empty() {
            return Err(GenerationFailure::new(errors));
        }
        if let Err(error) = graph.check_consistency() {
            return Err(GenerationFailure::new(vec![error.into()]));
        }

        log_generation(
            requirements.len(),
            graph.task_count(),
            graph.connections().len(),
            started.elapsed().as_millis() as u64,
        );
        Ok(graph)
    }

    fn check_concreteness(&self, merged: &CandidateGraph, errors: &mut Vec<GenerationError>) {
        let registry = &self.context.models;
        for node in &merged.nodes {
            match node.models.len() {
                0 => errors.push(GenerationError::CannotInstallMissingModel {
                    request: "<no model>".to_string(),
                    required_by: node.path.clone(),
                }),
                1 => {
                    let model = node.concrete_model().unwrap_or_default();
                    if !registry.contains(model) || registry.is_service(model) {
                        errors.push(GenerationError::CannotInstallMissingModel {
                            request: model.to_string(),
                            required_by: node.path.clone(),
                        });
                    } else {
                        debug!(path = %node.path, model = %model, "🧩 GENERATION: Concrete");
                    }
                }
                _ => errors.push(GenerationError::AmbiguousModel {
                    required_by: node.path.clone(),
                    candidates: node.models.iter().cloned().collect(),
                }),
            }
        }
    }
}
