//! Process manager capability: spawn, stop, and poll deployment processes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::remote_task::RemoteTask;
use crate::deployment::ConfiguredDeployment;

/// Opaque identity of a spawned deployment process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessHandle(Uuid);

impl ProcessHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc-{}", self.0.simple())
    }
}

/// How a deployment process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ExitStatus {
    /// Ended because we asked it to
    Clean,
    /// Killed by a signal
    Signal(i32),
    /// Exited on its own with a non-zero status
    Crashed(i32),
}

impl ExitStatus {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Signal(sig) => write!(f, "signal({sig})"),
            Self::Crashed(code) => write!(f, "crashed({code})"),
        }
    }
}

/// Errors from the process management boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessError {
    #[error("failed to spawn deployment {deployment}: {message}")]
    SpawnFailed { deployment: String, message: String },

    #[error("communication error with process server: {message}")]
    ComError { message: String },

    #[error("operation {operation} timed out after {timeout_seconds}s")]
    Timeout {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("unknown process handle: {handle}")]
    UnknownHandle { handle: ProcessHandle },
}

impl ProcessError {
    pub fn spawn_failed(deployment: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            deployment: deployment.into(),
            message: message.into(),
        }
    }

    pub fn com_error(message: impl Into<String>) -> Self {
        Self::ComError {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_seconds,
        }
    }
}

pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Capability for spawning and supervising deployment processes, possibly on
/// remote hosts.
///
/// `start` returns a handle immediately; readiness and termination are polled
/// once per reconciliation cycle through the non-blocking `poll_*` methods,
/// so a slow network spawn never stalls a cycle.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Request a process for the deployment; the returned handle tracks the
    /// asynchronous launch
    async fn start(&self, deployment: &ConfiguredDeployment) -> ProcessResult<ProcessHandle>;

    /// Request termination; `hard` escalates to a kill
    async fn stop(&self, handle: ProcessHandle, hard: bool) -> ProcessResult<()>;

    /// Non-blocking readiness poll. Once the process is up this returns the
    /// handles of the tasks it hosts, keyed by their remote names.
    fn poll_running(
        &self,
        handle: ProcessHandle,
    ) -> Option<BTreeMap<String, Arc<dyn RemoteTask>>>;

    /// Non-blocking poll draining processes that terminated since the last
    /// call
    fn poll_terminations(&self) -> Vec<(ProcessHandle, ExitStatus)>;
}
