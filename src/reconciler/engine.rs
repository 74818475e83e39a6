//! The reconciliation engine: owns the live graph and drives it toward the
//! target graph, one cycle at a time.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::diff::diff;
use super::operations::{ConnectionSpec, Operation};
use super::ordering::order_operations;
use crate::context::OrchestratorContext;
use crate::events::{EventPublisher, OrchestrationEvent};
use crate::graph::{DataFlowGraph, GraphError, TaskInstance};
use crate::logging::{log_process_operation, log_task_operation};
use crate::requirements::RequirementId;
use crate::runtime::{
    apply_connection, commit_properties, remove_connection, ProcessError, ProcessHandle,
    ProcessManager, RemoteTask, SyncError,
};
use crate::state_machine::{
    determine_target_state, ConfiguredBeforeStart, DeploymentState, SafeToStop, SetupState,
    StateGuard, StateMachineError, TaskEvent, TaskLifecycle,
};

/// Errors gathered while reconciling; each is localized to one task or one
/// deployment, and reconciliation continues for everything else
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error("task {task} failed: {reason} (affects {requirements:?})")]
    TaskFailed {
        task: String,
        requirements: Vec<RequirementId>,
        reason: String,
    },

    #[error("deployment {deployment} failed: {message}")]
    ProcessFailed { deployment: String, message: String },

    #[error("unknown task: {name}")]
    UnknownTask { name: String },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),
}

/// Book-keeping for one spawned deployment process
pub struct ProcessRecord {
    pub handle: ProcessHandle,
    pub deployment: String,
    pub ready: bool,
    /// Task handles by remote name, filled in once the process is ready
    pub task_handles: BTreeMap<String, Arc<dyn RemoteTask>>,
}

impl std::fmt::Debug for ProcessRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRecord")
            .field("handle", &self.handle)
            .field("deployment", &self.deployment)
            .field("ready", &self.ready)
            .field("tasks", &self.task_handles.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Summary of one reconciliation cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    pub operations: Vec<Operation>,
    pub executed: usize,
    pub deferred: usize,
    pub errors: Vec<ReconcileError>,
    pub quarantined: Vec<String>,
}

impl CycleReport {
    /// An idle cycle: nothing to do, nothing pending, nothing failed
    pub fn is_settled(&self) -> bool {
        self.operations.is_empty() && self.deferred == 0 && self.errors.is_empty()
    }
}

/// Single mutator of the live graph.
///
/// External events (process readiness, terminations, remote component
/// states) are ingested by [`ReconciliationEngine::poll_events`] at the start
/// of a cycle; [`ReconciliationEngine::reconcile`] plans the operation list
/// against that consistent snapshot and [`ReconciliationEngine::execute`]
/// drives it, deferring anything whose preconditions are not met yet.
pub struct ReconciliationEngine {
    live: DataFlowGraph,
    processes: BTreeMap<String, ProcessRecord>,
    handles: BTreeMap<String, Arc<dyn RemoteTask>>,
    restart_attempts: BTreeMap<String, u32>,
    /// Deployments we stopped on purpose; their termination must not
    /// propagate as a failure
    expected_stops: BTreeSet<String>,
    publisher: EventPublisher,
}

impl ReconciliationEngine {
    pub fn new(publisher: EventPublisher) -> Self {
        Self {
            live: DataFlowGraph::new(),
            processes: BTreeMap::new(),
            handles: BTreeMap::new(),
            restart_attempts: BTreeMap::new(),
            expected_stops: BTreeSet::new(),
            publisher,
        }
    }

    pub fn live(&self) -> &DataFlowGraph {
        &self.live
    }

    pub fn process(&self, deployment: &str) -> Option<&ProcessRecord> {
        self.processes.get(deployment)
    }

    /// One full control cycle: ingest external events, plan, execute.
    pub async fn step(
        &mut self,
        context: &OrchestratorContext,
        manager: &dyn ProcessManager,
        target: &DataFlowGraph,
    ) -> CycleReport {
        self.poll_events(manager);

        let (operations, mut deferred) = self.reconcile(context, target);
        let mut report = CycleReport {
            operations: operations.clone(),
            ..CycleReport::default()
        };

        for operation in operations {
            match self.execute(context, manager, target, &operation).await {
                ExecutionOutcome::Done => report.executed += 1,
                ExecutionOutcome::Deferred => deferred += 1,
                ExecutionOutcome::Failed(error) => report.errors.push(error),
                ExecutionOutcome::Quarantined(task, error) => {
                    report.quarantined.push(task);
                    report.errors.push(error);
                }
            }
        }

        report.deferred = deferred;
        self.publisher.publish(OrchestrationEvent::CycleCompleted {
            operations: report.operations.len(),
            deferred: report.deferred,
            errors: report.errors.len(),
        });
        debug!(
            operations = report.operations.len(),
            executed = report.executed,
            deferred = report.deferred,
            errors = report.errors.len(),
            "🔄 RECONCILE: Cycle completed"
        );
        report
    }

    /// Ingest process terminations, process readiness, and remote task
    /// states. Called exactly once at the start of each cycle.
    pub fn poll_events(&mut self, manager: &dyn ProcessManager) {
        self.ingest_terminations(manager);
        self.ingest_readiness(manager);
        self.ingest_remote_states();
    }

    fn ingest_terminations(&mut self, manager: &dyn ProcessManager) {
        for (handle, status) in manager.poll_terminations() {
            let Some(deployment) = self
                .processes
                .iter()
                .find(|(_, record)| record.handle == handle)
                .map(|(name, _)| name.clone())
            else {
                continue;
            };
            self.processes.remove(&deployment);
            let expected = self.expected_stops.remove(&deployment) || status.is_clean();

            log_process_operation(
                "terminated",
                &deployment,
                None,
                &status.to_string(),
                None,
            );
            self.publisher.publish(OrchestrationEvent::ProcessDied {
                deployment: deployment.clone(),
                status,
            });

            // every task the process hosted dies in one step; unrelated
            // deployments are untouched
            let hosted: Vec<String> = self
                .live
                .tasks()
                .filter(|(_, task)| {
                    task.deployment
                        .as_ref()
                        .is_some_and(|d| d.deployment == deployment)
                })
                .map(|(_, task)| task.name.clone())
                .collect();
            for task_name in hosted {
                self.handles.remove(&task_name);
                let Some(id) = self.live.id_of(&task_name) else {
                    continue;
                };
                if let Some(task) = self.live.remove_task(id) {
                    if !expected {
                        warn!(
                            task = %task_name,
                            deployment = %deployment,
                            status = %status,
                            "🔄 RECONCILE: Task lost with its process"
                        );
                        self.publisher
                            .publish(OrchestrationEvent::RequirementsAffected {
                                task: task_name.clone(),
                                requirements: task.requirement_refs.iter().copied().collect(),
                                reason: format!("deployment process died ({status})"),
                            });
                    }
                }
            }
        }
    }

    fn ingest_readiness(&mut self, manager: &dyn ProcessManager) {
        let pending: Vec<String> = self
            .processes
            .iter()
            .filter(|(_, record)| !record.ready)
            .map(|(name, _)| name.clone())
            .collect();

        for deployment in pending {
            let handle = self.processes[&deployment].handle;
            let Some(task_handles) = manager.poll_running(handle) else {
                continue;
            };
            if let Some(record) = self.processes.get_mut(&deployment) {
                record.ready = true;
                record.task_handles = task_handles;
            }
            log_process_operation("ready", &deployment, None, "running", None);
            self.publisher.publish(OrchestrationEvent::ProcessReady {
                deployment: deployment.clone(),
            });

            let waiting: Vec<(String, String)> = self
                .live
                .tasks()
                .filter(|(_, task)| {
                    task.state == DeploymentState::WaitingForProcess
                        && task
                            .deployment
                            .as_ref()
                            .is_some_and(|d| d.deployment == deployment)
                })
                .filter_map(|(_, task)| {
                    task.deployment
                        .as_ref()
                        .map(|d| (task.name.clone(), d.remote_name.clone()))
                })
                .collect();
            for (task_name, remote_name) in waiting {
                let handle = self
                    .processes
                    .get(&deployment)
                    .and_then(|record| record.task_handles.get(&remote_name))
                    .cloned();
                let Some(handle) = handle else {
                    warn!(
                        task = %task_name,
                        remote_name = %remote_name,
                        deployment = %deployment,
                        "🔄 RECONCILE: Process is missing an expected task"
                    );
                    continue;
                };
                self.handles.insert(task_name.clone(), handle);
                let _ = self.apply_event(&task_name, TaskEvent::ProcessReady);
            }
        }
    }

    fn ingest_remote_states(&mut self) {
        let snapshot: Vec<(String, crate::state_machine::RemoteState)> = self
            .handles
            .iter()
            .map(|(name, handle)| (name.clone(), handle.remote_state()))
            .collect();

        for (task_name, remote) in snapshot {
            let (lifecycle, state, refs) = {
                let Some(task) = self.live.by_name_mut(&task_name) else {
                    continue;
                };
                task.remote_state = Some(remote);
                (
                    task.lifecycle,
                    task.state,
                    task.requirement_refs.iter().copied().collect::<Vec<_>>(),
                )
            };

            if remote.is_fault() && state.is_fault_sensitive() {
                let reason = format!("remote component reported {remote}");
                let _ = self.apply_event(&task_name, TaskEvent::fault(reason.clone()));
                self.publisher.publish(OrchestrationEvent::TaskQuarantined {
                    task: task_name.clone(),
                    reason: reason.clone(),
                });
                self.publisher
                    .publish(OrchestrationEvent::RequirementsAffected {
                        task: task_name.clone(),
                        requirements: refs,
                        reason,
                    });
                continue;
            }

            if lifecycle == TaskLifecycle::Starting && remote.is_running() {
                if let Some(task) = self.live.by_name_mut(&task_name) {
                    task.lifecycle = TaskLifecycle::Running;
                }
                self.restart_attempts.remove(&task_name);
                log_task_operation("started", &task_name, "running", None);
            }

            if lifecycle == TaskLifecycle::Stopping
                && remote == crate::state_machine::RemoteState::Stopped
            {
                if let Some(task) = self.live.by_name_mut(&task_name) {
                    task.lifecycle = TaskLifecycle::Finished;
                }
                if state == DeploymentState::Stopping {
                    let _ = self.apply_event(&task_name, TaskEvent::Stopped);
                }
                log_task_operation("stopped", &task_name, "finished", None);
            }
        }
    }

    /// Plan the cycle's operations. Returns the ordered list plus the count
    /// of items deferred to a later cycle because a precondition is not met.
    pub fn reconcile(
        &mut self,
        context: &OrchestratorContext,
        target: &DataFlowGraph,
    ) -> (Vec<Operation>, usize) {
        // requirement back-references follow the newest target
        for (_, wanted) in target.tasks() {
            if let Some(live_task) = self.live.by_name_mut(&wanted.name) {
                if live_task.same_definition_as(wanted) {
                    live_task.requirement_refs = wanted.requirement_refs.clone();
                }
            }
        }

        let delta = diff(
            target,
            &self.live,
            &context.models,
            &context.configuration.config().property_defaults,
        );

        let mut operations: Vec<Operation> = Vec::new();
        let mut deferred = 0usize;

        // unreferenced tasks become garbage, torn down once safe
        for name in &delta.tasks_unreferenced {
            let is_garbage = self
                .live
                .by_name(name)
                .map(|t| t.state.is_garbage())
                .unwrap_or(true);
            if !is_garbage {
                let _ = self.apply_event(name, TaskEvent::Unreferenced);
            }
        }

        for name in delta
            .tasks_unreferenced
            .iter()
            .chain(delta.tasks_to_replace.iter())
        {
            let Some(task) = self.live.by_name(name) else {
                continue;
            };
            match task.lifecycle {
                TaskLifecycle::Running => operations.push(Operation::Stop {
                    task: name.clone(),
                }),
                TaskLifecycle::Pending | TaskLifecycle::Finished => {
                    operations.push(Operation::Remove { task: name.clone() })
                }
                // never kill a task mid-start; wait for it to settle
                TaskLifecycle::Starting | TaskLifecycle::Stopping => deferred += 1,
            }
        }

        // new tasks: spawn their deployment, or admit them directly when the
        // process is already up
        let mut spawns: BTreeSet<String> = BTreeSet::new();
        for name in &delta.tasks_to_add {
            let Some(wanted) = target.by_name(name) else {
                continue;
            };
            let Some(assignment) = wanted.deployment.clone() else {
                deferred += 1;
                continue;
            };
            let process_ready = self
                .processes
                .get(&assignment.deployment)
                .map(|record| record.ready);
            match process_ready {
                None => {
                    spawns.insert(assignment.deployment.clone());
                }
                Some(false) => deferred += 1,
                Some(true) => self.admit_task(wanted.clone()),
            }
        }
        // quarantine-cleared tasks whose process is gone need a respawn too
        for (_, task) in self.live.tasks() {
            if task.state != DeploymentState::SelectedForDeployment {
                continue;
            }
            if target
                .by_name(&task.name)
                .map_or(true, |wanted| !task.same_definition_as(wanted))
            {
                continue;
            }
            if let Some(assignment) = &task.deployment {
                if !self.processes.contains_key(&assignment.deployment) {
                    spawns.insert(assignment.deployment.clone());
                }
            }
        }
        for deployment in spawns {
            operations.push(Operation::Spawn { deployment });
        }

        // progress wanted tasks through configuration and start
        let progress: Vec<(String, DeploymentState, TaskLifecycle)> = self
            .live
            .tasks()
            .filter(|(_, task)| {
                target
                    .by_name(&task.name)
                    .is_some_and(|wanted| task.same_definition_as(wanted))
            })
            .map(|(_, task)| (task.name.clone(), task.state, task.lifecycle))
            .collect();
        for (name, state, lifecycle) in progress {
            match state {
                DeploymentState::Setup => {
                    if self.handles.contains_key(&name) {
                        operations.push(Operation::Configure { task: name });
                    } else {
                        deferred += 1;
                    }
                }
                DeploymentState::ReadyToStart
                    if matches!(
                        lifecycle,
                        TaskLifecycle::Pending | TaskLifecycle::Finished
                    ) =>
                {
                    operations.push(Operation::Start { task: name });
                }
                DeploymentState::WaitingForProcess | DeploymentState::SelectedForDeployment => {
                    deferred += 1;
                }
                _ => {}
            }
        }

        for name in &delta.properties_to_update {
            if self.handles.contains_key(name) {
                operations.push(Operation::UpdateProperties { task: name.clone() });
            } else {
                deferred += 1;
            }
        }

        for spec in &delta.connections_to_remove {
            operations.push(Operation::Disconnect {
                connection: spec.clone(),
            });
        }

        // a connection is only created once both endpoints are ready
        for spec in &delta.connections_to_add {
            let ready = [spec.source.as_str(), spec.sink.as_str()].iter().all(|n| {
                self.live
                    .by_name(n)
                    .is_some_and(|t| t.state.is_ready_for_connections())
            });
            if ready {
                operations.push(Operation::Connect {
                    connection: spec.clone(),
                });
            } else {
                deferred += 1;
            }
        }

        // processes hosting nothing that is wanted or live get collected
        for deployment in self.processes.keys() {
            let hosts = |graph: &DataFlowGraph| {
                graph.tasks().any(|(_, task)| {
                    task.deployment
                        .as_ref()
                        .is_some_and(|d| &d.deployment == deployment)
                })
            };
            if !hosts(&self.live) && !hosts(target) {
                operations.push(Operation::KillProcess {
                    deployment: deployment.clone(),
                });
            }
        }

        // quarantined tasks stay put unless policy clears them exactly once
        if context.configuration.config().auto_restart.enabled {
            let quarantined: Vec<String> = self
                .live
                .tasks()
                .filter(|(_, task)| {
                    task.state.is_quarantined() && target.by_name(&task.name).is_some()
                })
                .map(|(_, task)| task.name.clone())
                .collect();
            for name in quarantined {
                let attempts = self.restart_attempts.entry(name.clone()).or_insert(0);
                if *attempts > 0 {
                    continue;
                }
                *attempts += 1;
                info!(task = %name, "🔄 RECONCILE: Auto-restart clearing quarantine");
                let _ = self.apply_event(&name, TaskEvent::QuarantineCleared);
                self.publisher.publish(OrchestrationEvent::QuarantineCleared {
                    task: name.clone(),
                    automatic: true,
                });
                self.reenter_pipeline(&name);
            }
        }

        let mut operations = order_operations(operations);
        let cap = context.configuration.config().execution.max_operations_per_cycle;
        if operations.len() > cap {
            deferred += operations.len() - cap;
            operations.truncate(cap);
        }
        (operations, deferred)
    }

    /// Execute one operation against the external capabilities
    async fn execute(
        &mut self,
        context: &OrchestratorContext,
        manager: &dyn ProcessManager,
        target: &DataFlowGraph,
        operation: &Operation,
    ) -> ExecutionOutcome {
        match operation {
            Operation::Spawn { deployment } => {
                self.execute_spawn(context, manager, target, deployment).await
            }
            Operation::KillProcess { deployment } => {
                let Some(record) = self.processes.get(deployment) else {
                    return ExecutionOutcome::Done;
                };
                let handle = record.handle;
                self.expected_stops.insert(deployment.clone());
                match manager.stop(handle, false).await {
                    Ok(()) => {
                        log_process_operation("stop", deployment, None, "requested", None);
                        ExecutionOutcome::Done
                    }
                    Err(error) => ExecutionOutcome::Failed(error.into()),
                }
            }
            Operation::Configure { task } => self.execute_configure(task).await,
            Operation::Start { task } => self.execute_start(task).await,
            Operation::Stop { task } => self.execute_stop(task).await,
            Operation::Remove { task } => self.execute_remove(task),
            Operation::UpdateProperties { task } => {
                self.execute_update_properties(context, task).await
            }
            Operation::Connect { connection } => {
                self.execute_connect(context, connection).await
            }
            Operation::Disconnect { connection } => self.execute_disconnect(connection).await,
        }
    }

    async fn execute_spawn(
        &mut self,
        context: &OrchestratorContext,
        manager: &dyn ProcessManager,
        target: &DataFlowGraph,
        deployment: &str,
    ) -> ExecutionOutcome {
        let Some(configured) = context.deployments.get(deployment) else {
            return ExecutionOutcome::Failed(ReconcileError::ProcessFailed {
                deployment: deployment.to_string(),
                message: "deployment is no longer registered".to_string(),
            });
        };
        match manager.start(configured).await {
            Ok(handle) => {
                self.processes.insert(
                    deployment.to_string(),
                    ProcessRecord {
                        handle,
                        deployment: deployment.to_string(),
                        ready: false,
                        task_handles: BTreeMap::new(),
                    },
                );
                log_process_operation(
                    "spawn",
                    deployment,
                    Some(&configured.process_server),
                    "requested",
                    None,
                );
                self.publisher.publish(OrchestrationEvent::ProcessSpawned {
                    deployment: deployment.to_string(),
                });

                // admit the target tasks this process will host
                let wanted: Vec<TaskInstance> = target
                    .tasks()
                    .filter(|(_, task)| {
                        task.deployment
                            .as_ref()
                            .is_some_and(|d| d.deployment == deployment)
                            && self.live.by_name(&task.name).is_none()
                    })
                    .map(|(_, task)| task.clone())
                    .collect();
                for task in wanted {
                    self.admit_task(task);
                }
                // live tasks re-entering the pipeline after quarantine
                let reentering: Vec<String> = self
                    .live
                    .tasks()
                    .filter(|(_, task)| {
                        task.state == DeploymentState::SelectedForDeployment
                            && task
                                .deployment
                                .as_ref()
                                .is_some_and(|d| d.deployment == deployment)
                    })
                    .map(|(_, task)| task.name.clone())
                    .collect();
                for name in reentering {
                    let _ = self.apply_event(&name, TaskEvent::SpawnIssued);
                }
                ExecutionOutcome::Done
            }
            Err(error) => ExecutionOutcome::Failed(error.into()),
        }
    }

    async fn execute_configure(&mut self, task_name: &str) -> ExecutionOutcome {
        let Some(handle) = self.handles.get(task_name).cloned() else {
            return ExecutionOutcome::Deferred;
        };
        if let Some(task) = self.live.by_name_mut(task_name) {
            task.setup = SetupState::Configuring;
        }
        match handle.configure().await {
            Ok(()) => {
                if let Some(task) = self.live.by_name_mut(task_name) {
                    task.setup = SetupState::Configured;
                }
                let _ = self.apply_event(task_name, TaskEvent::Configured);
                log_task_operation("configure", task_name, "configured", None);
                ExecutionOutcome::Done
            }
            Err(error) => {
                let reason = error.to_string();
                if let Some(task) = self.live.by_name_mut(task_name) {
                    task.setup = SetupState::SetupPending;
                }
                let refs = self.requirement_refs_of(task_name);
                let _ = self.apply_event(
                    task_name,
                    TaskEvent::configuration_failed(reason.clone()),
                );
                self.publisher.publish(OrchestrationEvent::TaskQuarantined {
                    task: task_name.to_string(),
                    reason: reason.clone(),
                });
                self.publisher
                    .publish(OrchestrationEvent::RequirementsAffected {
                        task: task_name.to_string(),
                        requirements: refs.clone(),
                        reason: reason.clone(),
                    });
                ExecutionOutcome::Quarantined(
                    task_name.to_string(),
                    ReconcileError::TaskFailed {
                        task: task_name.to_string(),
                        requirements: refs,
                        reason,
                    },
                )
            }
        }
    }

    async fn execute_start(&mut self, task_name: &str) -> ExecutionOutcome {
        let Some(handle) = self.handles.get(task_name).cloned() else {
            return ExecutionOutcome::Deferred;
        };
        {
            let Some(task) = self.live.by_name(task_name) else {
                return ExecutionOutcome::Deferred;
            };
            if ConfiguredBeforeStart.check(task).is_err() {
                return ExecutionOutcome::Deferred;
            }
        }
        match handle.start().await {
            Ok(()) => {
                if let Some(task) = self.live.by_name_mut(task_name) {
                    task.lifecycle = TaskLifecycle::Starting;
                }
                let _ = self.apply_event(task_name, TaskEvent::Started);
                log_task_operation("start", task_name, "starting", None);
                ExecutionOutcome::Done
            }
            Err(error) => {
                let reason = error.to_string();
                let refs = self.requirement_refs_of(task_name);
                let _ = self.apply_event(task_name, TaskEvent::fault(reason.clone()));
                self.publisher.publish(OrchestrationEvent::TaskQuarantined {
                    task: task_name.to_string(),
                    reason: reason.clone(),
                });
                ExecutionOutcome::Quarantined(
                    task_name.to_string(),
                    ReconcileError::TaskFailed {
                        task: task_name.to_string(),
                        requirements: refs,
                        reason,
                    },
                )
            }
        }
    }

    async fn execute_stop(&mut self, task_name: &str) -> ExecutionOutcome {
        let Some(handle) = self.handles.get(task_name).cloned() else {
            // no live handle, nothing to stop remotely
            return ExecutionOutcome::Done;
        };
        {
            let Some(task) = self.live.by_name(task_name) else {
                return ExecutionOutcome::Done;
            };
            if SafeToStop.check(task).is_err() {
                return ExecutionOutcome::Deferred;
            }
        }
        match handle.stop().await {
            Ok(()) => {
                let state = self
                    .live
                    .by_name(task_name)
                    .map(|t| t.state)
                    .unwrap_or_default();
                if let Some(task) = self.live.by_name_mut(task_name) {
                    task.lifecycle = TaskLifecycle::Stopping;
                }
                if state == DeploymentState::Running {
                    let _ = self.apply_event(task_name, TaskEvent::StopRequested);
                }
                log_task_operation("stop", task_name, "stopping", None);
                ExecutionOutcome::Done
            }
            Err(error) => ExecutionOutcome::Failed(error.into()),
        }
    }

    fn execute_remove(&mut self, task_name: &str) -> ExecutionOutcome {
        let _ = self.apply_event(task_name, TaskEvent::Remove);
        self.handles.remove(task_name);
        if let Some(id) = self.live.id_of(task_name) {
            self.live.remove_task(id);
        }
        log_task_operation("remove", task_name, "removed", None);
        ExecutionOutcome::Done
    }

    async fn execute_update_properties(
        &mut self,
        context: &OrchestratorContext,
        task_name: &str,
    ) -> ExecutionOutcome {
        let Some(handle) = self.handles.get(task_name).cloned() else {
            return ExecutionOutcome::Deferred;
        };
        let defaults = self
            .live
            .by_name(task_name)
            .and_then(|task| {
                context
                    .configuration
                    .config()
                    .property_defaults_for(&task.model)
            })
            .cloned();
        match commit_properties(
            &context.models,
            defaults.as_ref(),
            task_name,
            &mut self.live,
            handle.as_ref(),
        )
        .await
        {
            Ok(count) => {
                if count > 0 {
                    self.publisher
                        .publish(OrchestrationEvent::PropertiesCommitted {
                            task: task_name.to_string(),
                            count,
                        });
                }
                ExecutionOutcome::Done
            }
            Err(error) => ExecutionOutcome::Failed(error.into()),
        }
    }

    async fn execute_connect(
        &mut self,
        context: &OrchestratorContext,
        spec: &ConnectionSpec,
    ) -> ExecutionOutcome {
        match apply_connection(
            &context.models,
            &mut self.live,
            &self.handles,
            &spec.source,
            &spec.source_port,
            &spec.sink,
            &spec.sink_port,
            spec.policy,
        )
        .await
        {
            Ok(true) => {
                self.publisher
                    .publish(OrchestrationEvent::ConnectionEstablished {
                        source: spec.source.clone(),
                        source_port: spec.source_port.clone(),
                        sink: spec.sink.clone(),
                        sink_port: spec.sink_port.clone(),
                    });
                ExecutionOutcome::Done
            }
            Ok(false) => ExecutionOutcome::Done,
            Err(SyncError::NotReady { .. }) => ExecutionOutcome::Deferred,
            Err(error) => ExecutionOutcome::Failed(error.into()),
        }
    }

    async fn execute_disconnect(&mut self, spec: &ConnectionSpec) -> ExecutionOutcome {
        match remove_connection(
            &mut self.live,
            &self.handles,
            &spec.source,
            &spec.source_port,
            &spec.sink,
            &spec.sink_port,
        )
        .await
        {
            Ok(true) => {
                self.publisher.publish(OrchestrationEvent::ConnectionRemoved {
                    source: spec.source.clone(),
                    source_port: spec.source_port.clone(),
                    sink: spec.sink.clone(),
                    sink_port: spec.sink_port.clone(),
                });
                ExecutionOutcome::Done
            }
            Ok(false) => ExecutionOutcome::Done,
            Err(error) => ExecutionOutcome::Failed(error.into()),
        }
    }

    /// Coordinated stop and respawn of whole deployments. Their tasks stay
    /// referenced by the unchanged requirements, so dependent tasks are not
    /// torn down while the processes cycle.
    pub async fn restart_deployments(
        &mut self,
        manager: &dyn ProcessManager,
        deployments: &[String],
    ) -> Vec<ReconcileError> {
        let mut handles = Vec::new();
        for deployment in deployments {
            let Some(record) = self.processes.get(deployment) else {
                continue;
            };
            self.expected_stops.insert(deployment.clone());
            info!(deployment = %deployment, "🔄 RECONCILE: Restarting deployment");
            handles.push(record.handle);
        }

        let results =
            futures::future::join_all(handles.into_iter().map(|h| manager.stop(h, false))).await;
        results
            .into_iter()
            .filter_map(|result| result.err())
            .map(ReconcileError::from)
            .collect()
    }

    /// Operator action: clear a quarantine so the task is retried
    pub fn clear_quarantine(&mut self, task_name: &str) -> Result<(), ReconcileError> {
        let quarantined = self
            .live
            .by_name(task_name)
            .ok_or_else(|| ReconcileError::UnknownTask {
                name: task_name.to_string(),
            })?
            .state
            .is_quarantined();
        if !quarantined {
            return Ok(());
        }
        self.apply_event(task_name, TaskEvent::QuarantineCleared)?;
        self.restart_attempts.remove(task_name);
        self.publisher.publish(OrchestrationEvent::QuarantineCleared {
            task: task_name.to_string(),
            automatic: false,
        });
        self.reenter_pipeline(task_name);
        Ok(())
    }

    /// Put a freshly spawned task into the live graph
    fn admit_task(&mut self, mut task: TaskInstance) {
        task.state = DeploymentState::SelectedForDeployment;
        task.lifecycle = TaskLifecycle::Pending;
        task.setup = SetupState::SetupPending;
        let name = task.name.clone();
        if self.live.add_task(task).is_err() {
            return;
        }
        let _ = self.apply_event(&name, TaskEvent::SpawnIssued);
        self.reenter_pipeline(&name);
    }

    /// Advance a task in `WaitingForProcess` straight to `Setup` when its
    /// process is already up, binding the remote handle
    fn reenter_pipeline(&mut self, task_name: &str) {
        let Some((deployment, remote_name, state)) = self.live.by_name(task_name).and_then(|t| {
            t.deployment
                .as_ref()
                .map(|d| (d.deployment.clone(), d.remote_name.clone(), t.state))
        }) else {
            return;
        };

        if state == DeploymentState::SelectedForDeployment {
            if self.processes.contains_key(&deployment) {
                let _ = self.apply_event(task_name, TaskEvent::SpawnIssued);
            } else {
                return;
            }
        }

        let ready_handle = self
            .processes
            .get(&deployment)
            .filter(|record| record.ready)
            .and_then(|record| record.task_handles.get(&remote_name))
            .cloned();
        if let Some(handle) = ready_handle {
            let waiting = self
                .live
                .by_name(task_name)
                .map(|t| t.state == DeploymentState::WaitingForProcess)
                .unwrap_or(false);
            if waiting {
                self.handles.insert(task_name.to_string(), handle);
                let _ = self.apply_event(task_name, TaskEvent::ProcessReady);
            }
        }
    }

    fn requirement_refs_of(&self, task_name: &str) -> Vec<RequirementId> {
        self.live
            .by_name(task_name)
            .map(|task| task.requirement_refs.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Apply a state-machine event to a live task, recording the transition
    /// and publishing it
    fn apply_event(
        &mut self,
        task_name: &str,
        event: TaskEvent,
    ) -> Result<DeploymentState, ReconcileError> {
        let task = self
            .live
            .by_name_mut(task_name)
            .ok_or_else(|| ReconcileError::UnknownTask {
                name: task_name.to_string(),
            })?;
        let from = task.state;
        let to = determine_target_state(from, &event)?;
        task.state = to;
        task.history.record(from, to, &event);
        self.publisher.publish(OrchestrationEvent::TaskStateChanged {
            task: task_name.to_string(),
            from,
            to,
        });
        Ok(to)
    }
}

enum ExecutionOutcome {
    Done,
    Deferred,
    Failed(ReconcileError),
    Quarantined(String, ReconcileError),
}
