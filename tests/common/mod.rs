//! Shared fixtures and capability mocks for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use composer_core::config::ConfigurationManager;
use composer_core::context::OrchestratorContext;
use composer_core::deployment::{ConfiguredDeployment, Deployment, DeploymentRegistry};
use composer_core::graph::ConnectionPolicy;
use composer_core::model::{
    ChildDefinition, ComponentModel, CompositionModel, InternalConnection, Model, ModelRegistry,
    Port, Property, ServiceModel,
};
use composer_core::reconciler::Operation;
use composer_core::runtime::{
    ExitStatus, ProcessError, ProcessHandle, ProcessManager, ProcessResult, RemoteTask,
    SyncError, SyncResult,
};
use composer_core::state_machine::RemoteState;

/// Remote task double with scriptable behavior
pub struct MockRemoteTask {
    name: String,
    state: Mutex<RemoteState>,
    fail_configure: AtomicBool,
    /// When set, start() succeeds but the remote stays in its current state
    /// until the test flips it to Running
    manual_start: AtomicBool,
    pub properties: Mutex<BTreeMap<String, Value>>,
    pub connections: Mutex<Vec<(String, String, String, ConnectionPolicy)>>,
}

impl MockRemoteTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(RemoteState::PreOperational),
            fail_configure: AtomicBool::new(false),
            manual_start: AtomicBool::new(false),
            properties: Mutex::new(BTreeMap::new()),
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn set_remote_state(&self, state: RemoteState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn fail_next_configure(&self) {
        self.fail_configure.store(true, Ordering::SeqCst);
    }

    pub fn hold_start(&self) {
        self.manual_start.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteTask for MockRemoteTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn configure(&self) -> SyncResult<()> {
        if self.fail_configure.swap(false, Ordering::SeqCst) {
            return Err(SyncError::configuration_failed(
                self.name.clone(),
                "mock configuration failure",
            ));
        }
        self.set_remote_state(RemoteState::Stopped);
        Ok(())
    }

    async fn start(&self) -> SyncResult<()> {
        if !self.manual_start.load(Ordering::SeqCst) {
            self.set_remote_state(RemoteState::Running);
        }
        Ok(())
    }

    async fn stop(&self) -> SyncResult<()> {
        self.set_remote_state(RemoteState::Stopped);
        Ok(())
    }

    fn remote_state(&self) -> RemoteState {
        *self.state.lock().unwrap()
    }

    async fn connect_ports(
        &self,
        source_port: &str,
        sink: &dyn RemoteTask,
        sink_port: &str,
        policy: &ConnectionPolicy,
    ) -> SyncResult<()> {
        self.connections.lock().unwrap().push((
            source_port.to_string(),
            sink.name().to_string(),
            sink_port.to_string(),
            *policy,
        ));
        Ok(())
    }

    async fn disconnect_ports(
        &self,
        source_port: &str,
        sink: &dyn RemoteTask,
        sink_port: &str,
    ) -> SyncResult<()> {
        self.connections.lock().unwrap().retain(|(s, t, p, _)| {
            (s.as_str(), t.as_str(), p.as_str()) != (source_port, sink.name(), sink_port)
        });
        Ok(())
    }

    async fn set_property(&self, name: &str, value: &Value) -> SyncResult<()> {
        self.properties
            .lock()
            .unwrap()
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn read_port(&self, _port: &str) -> SyncResult<Option<Value>> {
        Ok(None)
    }

    async fn write_port(&self, _port: &str, _value: &Value) -> SyncResult<()> {
        Ok(())
    }
}

struct SpawnedProcess {
    deployment: String,
    tasks: BTreeMap<String, Arc<MockRemoteTask>>,
    polls_until_ready: u32,
}

#[derive(Default)]
struct ManagerInner {
    processes: BTreeMap<ProcessHandle, SpawnedProcess>,
    terminations: Vec<(ProcessHandle, ExitStatus)>,
    spawn_poll_delay: u32,
    fail_spawns_of: Option<String>,
}

/// Process manager double: spawns are instantaneous, readiness is reported
/// after a configurable number of polls, terminations are injected by tests
#[derive(Default)]
pub struct MockProcessManager {
    inner: Mutex<ManagerInner>,
}

impl MockProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `polls` readiness polls before a process reports running
    pub fn with_spawn_delay(polls: u32) -> Self {
        let manager = Self::new();
        manager.inner.lock().unwrap().spawn_poll_delay = polls;
        manager
    }

    pub fn fail_spawns_of(&self, deployment: impl Into<String>) {
        self.inner.lock().unwrap().fail_spawns_of = Some(deployment.into());
    }

    /// Simulate an unexpected process death
    pub fn kill_process(&self, deployment: &str, status: ExitStatus) {
        let mut inner = self.inner.lock().unwrap();
        let handle = inner
            .processes
            .iter()
            .find(|(_, p)| p.deployment == deployment)
            .map(|(h, _)| *h);
        if let Some(handle) = handle {
            inner.processes.remove(&handle);
            inner.terminations.push((handle, status));
        }
    }

    /// Handle of a task inside a spawned process, for fault injection
    pub fn task(&self, deployment: &str, remote_name: &str) -> Option<Arc<MockRemoteTask>> {
        self.inner
            .lock()
            .unwrap()
            .processes
            .values()
            .find(|p| p.deployment == deployment)
            .and_then(|p| p.tasks.get(remote_name))
            .cloned()
    }

    pub fn running_deployments(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .processes
            .values()
            .map(|p| p.deployment.clone())
            .collect()
    }
}

#[async_trait]
impl ProcessManager for MockProcessManager {
    async fn start(&self, deployment: &ConfiguredDeployment) -> ProcessResult<ProcessHandle> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_spawns_of.as_deref() == Some(deployment.name()) {
            return Err(ProcessError::spawn_failed(
                deployment.name(),
                "mock spawn failure",
            ));
        }
        let handle = ProcessHandle::new();
        let tasks: BTreeMap<String, Arc<MockRemoteTask>> = deployment
            .deployment
            .tasks
            .keys()
            .map(|logical| {
                let remote = deployment.deployment.remote_name(logical).to_string();
                (remote.clone(), Arc::new(MockRemoteTask::new(remote)))
            })
            .collect();
        let polls = inner.spawn_poll_delay;
        inner.processes.insert(
            handle,
            SpawnedProcess {
                deployment: deployment.name().to_string(),
                tasks,
                polls_until_ready: polls,
            },
        );
        Ok(handle)
    }

    async fn stop(&self, handle: ProcessHandle, _hard: bool) -> ProcessResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.processes.remove(&handle).is_some() {
            inner.terminations.push((handle, ExitStatus::Clean));
            Ok(())
        } else {
            Err(ProcessError::UnknownHandle { handle })
        }
    }

    fn poll_running(
        &self,
        handle: ProcessHandle,
    ) -> Option<BTreeMap<String, Arc<dyn RemoteTask>>> {
        let mut inner = self.inner.lock().unwrap();
        let process = inner.processes.get_mut(&handle)?;
        if process.polls_until_ready > 0 {
            process.polls_until_ready -= 1;
            return None;
        }
        Some(
            process
                .tasks
                .iter()
                .map(|(name, task)| (name.clone(), task.clone() as Arc<dyn RemoteTask>))
                .collect(),
        )
    }

    fn poll_terminations(&self) -> Vec<(ProcessHandle, ExitStatus)> {
        std::mem::take(&mut self.inner.lock().unwrap().terminations)
    }
}

/// Models used across the integration tests: a camera source, an edge
/// detector, a multiplexing recorder, an abstract image service, and a
/// two-stage pipeline composition
pub fn model_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register(Model::Service(ServiceModel::new("image_source")))
        .unwrap();
    registry
        .register(Model::Component(
            ComponentModel::new("video_source")
                .with_port(Port::output("frames", "image"))
                .with_property(Property::new("frame_rate", "int32").with_default(30.into()))
                .with_property(
                    Property::new("exposure", "double")
                        .with_default(Value::from(0.5))
                        .live_updatable(),
                )
                .providing("image_source", []),
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
        .register(Model::Component(
            ComponentModel::new("recorder")
                .with_port(Port::input("frames", "image").multiplexing()),
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

/// Deployments matching [`model_registry`]: one process for the pipeline,
/// one for the recorder
pub fn deployment_registry() -> DeploymentRegistry {
    let mut deployments = DeploymentRegistry::new();
    deployments.register(ConfiguredDeployment::new(
        Deployment::new("vision_proc")
            .hosting("camera", "video_source")
            .hosting("filter", "edge_detector"),
        "localhost",
    ));
    deployments.register(ConfiguredDeployment::new(
        Deployment::new("record_proc").hosting("recorder", "recorder"),
        "localhost",
    ));
    deployments
}

pub fn test_context() -> OrchestratorContext {
    OrchestratorContext::new(
        model_registry(),
        deployment_registry(),
        ConfigurationManager::for_testing(),
    )
}

/// Assert the safety-ordering property on an operation list: no connect
/// before the configure/start of either endpoint, disconnect before stop
pub fn assert_safety_ordering(operations: &[Operation]) {
    for (index, operation) in operations.iter().enumerate() {
        if let Operation::Connect { connection } = operation {
            for (later_index, later) in operations.iter().enumerate() {
                let relevant = match later {
                    Operation::Configure { task } | Operation::Start { task } => {
                        task == &connection.source || task == &connection.sink
                    }
                    _ => false,
                };
                assert!(
                    !(relevant && later_index > index),
                    "connect at {index} precedes {later} at {later_index}"
                );
            }
        }
        if let Operation::Disconnect { connection } = operation {
            for earlier in operations.iter().take(index) {
                if let Operation::Stop { task } = earlier {
                    assert!(
                        task != &connection.source && task != &connection.sink,
                        "stop of {task} precedes disconnect {connection}"
                    );
                }
            }
        }
    }
}
