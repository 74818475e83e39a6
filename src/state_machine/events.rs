//! Events that drive deployment-state transitions.

use serde::{Deserialize, Serialize};

/// Events applied to a managed task's deployment state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A configured deployment was chosen for the task
    Selected,
    /// The spawn request for the hosting process was issued
    SpawnIssued,
    /// The hosting process reported ready; the task is reachable
    ProcessReady,
    /// Remote configure() succeeded
    Configured,
    /// Remote configure() failed
    ConfigurationFailed(String),
    /// Remote start() was issued and acknowledged
    Started,
    /// A stop was requested
    StopRequested,
    /// The remote side reports the task stopped
    Stopped,
    /// Unexpected remote fault (fatal error, exception, process crash)
    Fault(String),
    /// Operator or auto-restart policy cleared a quarantine
    QuarantineCleared,
    /// No live requirement references the task any more
    Unreferenced,
    /// The task was torn down and dropped from the live graph
    Remove,
}

impl TaskEvent {
    /// String form of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Selected => "selected",
            Self::SpawnIssued => "spawn_issued",
            Self::ProcessReady => "process_ready",
            Self::Configured => "configured",
            Self::ConfigurationFailed(_) => "configuration_failed",
            Self::Started => "started",
            Self::StopRequested => "stop_requested",
            Self::Stopped => "stopped",
            Self::Fault(_) => "fault",
            Self::QuarantineCleared => "quarantine_cleared",
            Self::Unreferenced => "unreferenced",
            Self::Remove => "remove",
        }
    }

    /// Extract the failure message if this is a fault-like event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fault(msg) | Self::ConfigurationFailed(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn fault(reason: impl Into<String>) -> Self {
        Self::Fault(reason.into())
    }

    pub fn configuration_failed(reason: impl Into<String>) -> Self {
        Self::ConfigurationFailed(reason.into())
    }
}
