//! # Orchestrator Facade
//!
//! Owns the requirement book-keeping, the generation engine, and the
//! reconciliation engine, and exposes the operator surface: add and withdraw
//! requirements, redeploy, reload configuration defaults, restart
//! deployments, clear quarantines.
//!
//! One step per host-loop cycle: the target graph is regenerated from the
//! current requirement set and reconciled against the live world. Withdrawn
//! requirements simply vanish from the next target; tasks they referenced
//! unwind like any other unreferenced node.

use std::collections::BTreeMap;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::context::OrchestratorContext;
use crate::error::{ComposerError, Result};
use crate::events::{EventPublisher, OrchestrationEvent, PublishedEvent};
use crate::generation::GenerationEngine;
use crate::graph::DataFlowGraph;
use crate::reconciler::{CycleReport, ReconciliationEngine};
use crate::requirements::{InstanceRequirements, RequirementId};
use crate::runtime::ProcessManager;

/// Top-level engine driver for one orchestrated system
pub struct Orchestrator {
    context: OrchestratorContext,
    reconciler: ReconciliationEngine,
    requirements: BTreeMap<RequirementId, InstanceRequirements>,
    next_requirement_id: u64,
    publisher: EventPublisher,
}

impl Orchestrator {
    pub fn new(context: OrchestratorContext) -> Self {
        let publisher = EventPublisher::default();
        Self {
            context,
            reconciler: ReconciliationEngine::new(publisher.clone()),
            requirements: BTreeMap::new(),
            next_requirement_id: 1,
            publisher,
        }
    }

    pub fn context(&self) -> &OrchestratorContext {
        &self.context
    }

    pub fn live(&self) -> &DataFlowGraph {
        self.reconciler.live()
    }

    pub fn requirements(&self) -> &BTreeMap<RequirementId, InstanceRequirements> {
        &self.requirements
    }

    /// Subscribe to orchestration lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.publisher.subscribe()
    }

    /// Declare a requirement; it takes effect on the next cycle
    pub fn add_requirement(&mut self, requirements: InstanceRequirements) -> RequirementId {
        let id = RequirementId(self.next_requirement_id);
        self.next_requirement_id += 1;
        info!(requirement = %id, models = ?requirements.models, "📋 ORCHESTRATOR: Requirement added");
        self.requirements.insert(id, requirements);
        id
    }

    /// Withdraw a requirement; tasks it alone referenced become garbage on
    /// the next cycle
    pub fn withdraw_requirement(&mut self, id: RequirementId) -> bool {
        let removed = self.requirements.remove(&id).is_some();
        if removed {
            info!(requirement = %id, "📋 ORCHESTRATOR: Requirement withdrawn");
        }
        removed
    }

    /// Generate the target graph for the current requirement set.
    ///
    /// Task requirement references are stamped with the root requirement ids
    /// during instantiation, so referential safety falls out of the diff.
    pub fn generate_target(&self) -> Result<DataFlowGraph> {
        let engine = GenerationEngine::new(&self.context);
        match engine.generate(&self.requirements) {
            Ok(graph) => {
                self.publisher.publish(OrchestrationEvent::GenerationCompleted {
                    tasks: graph.task_count(),
                    connections: graph.connections().len(),
                });
                Ok(graph)
            }
            Err(failure) => {
                self.publisher.publish(OrchestrationEvent::GenerationFailed {
                    errors: failure.messages(),
                });
                Err(failure.into())
            }
        }
    }

    /// Run one reconciliation cycle against a freshly generated target
    pub async fn step(&mut self, manager: &dyn ProcessManager) -> Result<CycleReport> {
        let target = self.generate_target()?;
        Ok(self.reconciler.step(&self.context, manager, &target).await)
    }

    /// Operator command: trigger one reconciliation pass against the latest
    /// requirements
    pub async fn redeploy(&mut self, manager: &dyn ProcessManager) -> Result<CycleReport> {
        info!("📋 ORCHESTRATOR: Redeploy requested");
        self.step(manager).await
    }

    /// Operator command: reload property defaults from disk without
    /// redeploying. Changed values reach the running tasks through the
    /// normal property-synchronization path on subsequent cycles.
    pub fn reload_config(&mut self) -> Result<usize> {
        let models = self.context.configuration.reload_property_defaults()?;
        info!(models = models, "📋 ORCHESTRATOR: Property defaults reloaded");
        Ok(models)
    }

    /// Operator command: coordinated stop and respawn of whole deployments.
    /// Dependent tasks stay referenced throughout and are not torn down
    /// mid-restart.
    pub async fn restart_deployments(
        &mut self,
        manager: &dyn ProcessManager,
        deployments: &[String],
    ) -> Result<()> {
        let errors = self
            .reconciler
            .restart_deployments(manager, deployments)
            .await;
        if let Some(error) = errors.into_iter().next() {
            warn!(error = %error, "📋 ORCHESTRATOR: Restart ran into errors");
            return Err(ComposerError::Reconciliation(error));
        }
        Ok(())
    }

    /// Operator command: clear a task's quarantine so it is retried
    pub fn clear_quarantine(&mut self, task: &str) -> Result<()> {
        self.reconciler
            .clear_quarantine(task)
            .map_err(ComposerError::Reconciliation)
    }
}
