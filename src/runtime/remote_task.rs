//! Remote task handle capability.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::graph::ConnectionPolicy;
use crate::state_machine::RemoteState;

/// Errors from talking to a live remote task
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("port {port} not found on task {task}")]
    PortNotFound { task: String, port: String },

    #[error("type mismatch between {source_id}.{source_port} and {sink}.{sink_port}")]
    TypeMismatch {
        source_id: String,
        source_port: String,
        sink: String,
        sink_port: String,
    },

    #[error("task {task} is not ready for connections ({state})")]
    NotReady { task: String, state: String },

    #[error("configuration of task {task} failed: {message}")]
    ConfigurationFailed { task: String, message: String },

    #[error("changing the policy of {source_id}.{source_port} -> {sink}.{sink_port} requires disconnect and reconnect")]
    PolicyChangeRequiresReconnect {
        source_id: String,
        source_port: String,
        sink: String,
        sink_port: String,
    },

    #[error("lost communication with task {task}: {message}")]
    CommunicationLost { task: String, message: String },

    #[error("no live handle for task {task}")]
    NoHandle { task: String },
}

impl SyncError {
    pub fn port_not_found(task: impl Into<String>, port: impl Into<String>) -> Self {
        Self::PortNotFound {
            task: task.into(),
            port: port.into(),
        }
    }

    pub fn configuration_failed(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigurationFailed {
            task: task.into(),
            message: message.into(),
        }
    }

    pub fn communication_lost(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommunicationLost {
            task: task.into(),
            message: message.into(),
        }
    }

    pub fn no_handle(task: impl Into<String>) -> Self {
        Self::NoHandle { task: task.into() }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Handle to a live task inside a running deployment process.
///
/// All lifecycle calls go through this capability; the engine never talks to
/// the wire protocol directly.
#[async_trait]
pub trait RemoteTask: Send + Sync {
    /// Name of the task inside its process
    fn name(&self) -> &str;

    async fn configure(&self) -> SyncResult<()>;

    async fn start(&self) -> SyncResult<()>;

    async fn stop(&self) -> SyncResult<()>;

    /// Last known component state, refreshed by the remote side
    fn remote_state(&self) -> RemoteState;

    /// Create a connection from an output port of this task to an input port
    /// of `sink`
    async fn connect_ports(
        &self,
        source_port: &str,
        sink: &dyn RemoteTask,
        sink_port: &str,
        policy: &ConnectionPolicy,
    ) -> SyncResult<()>;

    /// Tear down a connection previously created with `connect_ports`
    async fn disconnect_ports(
        &self,
        source_port: &str,
        sink: &dyn RemoteTask,
        sink_port: &str,
    ) -> SyncResult<()>;

    async fn set_property(&self, name: &str, value: &Value) -> SyncResult<()>;

    async fn read_port(&self, port: &str) -> SyncResult<Option<Value>>;

    async fn write_port(&self, port: &str, value: &Value) -> SyncResult<()>;
}
