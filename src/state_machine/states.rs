//! State definitions for reconciler-managed tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reconciler-level state of a managed task, distinct from the host plan's
/// own event states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    /// Not yet bound to a deployment
    Abstract,
    /// Deployment chosen, process not yet requested
    SelectedForDeployment,
    /// Process spawn issued, waiting for readiness
    WaitingForProcess,
    /// Process ready, task reachable, configuration pending
    Setup,
    /// Configured, connections may be created, start allowed
    ReadyToStart,
    /// Started and running
    Running,
    /// Stop issued, waiting for the remote side to wind down
    Stopping,
    /// Torn down and gone from the live graph
    Removed,
    /// Unexpected remote fault; requires operator clearing or the one-shot
    /// auto-restart policy
    Quarantined,
    /// No live requirement references the task; stopped and disposed
    /// opportunistically once safe
    Garbage,
}

impl DeploymentState {
    /// States in which the task is reachable on a live process
    pub fn is_deployed(&self) -> bool {
        matches!(
            self,
            Self::Setup | Self::ReadyToStart | Self::Running | Self::Stopping
        )
    }

    /// Connections may only be created to/from tasks at or past this point
    pub fn is_ready_for_connections(&self) -> bool {
        matches!(self, Self::ReadyToStart | Self::Running)
    }

    /// Whether an unexpected remote fault in this state leads to quarantine
    pub fn is_fault_sensitive(&self) -> bool {
        matches!(self, Self::ReadyToStart | Self::Running | Self::Stopping)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Removed)
    }

    pub fn is_quarantined(&self) -> bool {
        matches!(self, Self::Quarantined)
    }

    pub fn is_garbage(&self) -> bool {
        matches!(self, Self::Garbage)
    }
}

impl Default for DeploymentState {
    fn default() -> Self {
        Self::Abstract
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Abstract => "abstract",
            Self::SelectedForDeployment => "selected_for_deployment",
            Self::WaitingForProcess => "waiting_for_process",
            Self::Setup => "setup",
            Self::ReadyToStart => "ready_to_start",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Removed => "removed",
            Self::Quarantined => "quarantined",
            Self::Garbage => "garbage",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DeploymentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abstract" => Ok(Self::Abstract),
            "selected_for_deployment" => Ok(Self::SelectedForDeployment),
            "waiting_for_process" => Ok(Self::WaitingForProcess),
            "setup" => Ok(Self::Setup),
            "ready_to_start" => Ok(Self::ReadyToStart),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "removed" => Ok(Self::Removed),
            "quarantined" => Ok(Self::Quarantined),
            "garbage" => Ok(Self::Garbage),
            _ => Err(format!("Invalid deployment state: {s}")),
        }
    }
}

/// Plan-level lifecycle of a task instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskLifecycle {
    Pending,
    Starting,
    Running,
    Stopping,
    Finished,
}

impl TaskLifecycle {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }

    /// A task may only be torn down once it is out of its start transition
    pub fn is_safe_to_stop(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl Default for TaskLifecycle {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for TaskLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Finished => "finished",
        };
        write!(f, "{s}")
    }
}

/// Orthogonal configuration axis; must reach `Configured` before a start is
/// allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupState {
    SetupPending,
    Configuring,
    Configured,
}

impl SetupState {
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Configured)
    }
}

impl Default for SetupState {
    fn default() -> Self {
        Self::SetupPending
    }
}

impl fmt::Display for SetupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SetupPending => "setup_pending",
            Self::Configuring => "configuring",
            Self::Configured => "configured",
        };
        write!(f, "{s}")
    }
}

/// State reported asynchronously by the remote component itself, which can
/// force a quarantine regardless of what the reconciler asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteState {
    PreOperational,
    Stopped,
    Running,
    RuntimeError,
    FatalError,
    Exception,
}

impl RemoteState {
    /// Whether this state is an unexpected fault requiring intervention
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::RuntimeError | Self::FatalError | Self::Exception)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for RemoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PreOperational => "pre_operational",
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::RuntimeError => "runtime_error",
            Self::FatalError => "fatal_error",
            Self::Exception => "exception",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_readiness() {
        assert!(DeploymentState::ReadyToStart.is_ready_for_connections());
        assert!(DeploymentState::Running.is_ready_for_connections());
        assert!(!DeploymentState::Setup.is_ready_for_connections());
        assert!(!DeploymentState::WaitingForProcess.is_ready_for_connections());
    }

    #[test]
    fn test_fault_sensitivity_matches_post_ready_states() {
        assert!(!DeploymentState::Setup.is_fault_sensitive());
        assert!(DeploymentState::ReadyToStart.is_fault_sensitive());
        assert!(DeploymentState::Running.is_fault_sensitive());
        assert!(DeploymentState::Stopping.is_fault_sensitive());
    }

    #[test]
    fn test_lifecycle_stop_safety() {
        assert!(TaskLifecycle::Pending.is_safe_to_stop());
        assert!(TaskLifecycle::Running.is_safe_to_stop());
        assert!(!TaskLifecycle::Starting.is_safe_to_stop());
        assert!(!TaskLifecycle::Stopping.is_safe_to_stop());
    }

    #[test]
    fn test_remote_fault_detection() {
        assert!(RemoteState::Exception.is_fault());
        assert!(RemoteState::FatalError.is_fault());
        assert!(!RemoteState::Running.is_fault());
        assert!(!RemoteState::Stopped.is_fault());
    }

    #[test]
    fn test_state_string_round_trip() {
        assert_eq!(DeploymentState::ReadyToStart.to_string(), "ready_to_start");
        assert_eq!(
            "ready_to_start".parse::<DeploymentState>().unwrap(),
            DeploymentState::ReadyToStart
        );
        assert!("bogus".parse::<DeploymentState>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&DeploymentState::WaitingForProcess).unwrap();
        assert_eq!(json, "\"waiting_for_process\"");
        let parsed: DeploymentState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, DeploymentState::WaitingForProcess);
    }
}
