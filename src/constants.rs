//! # System Constants
//!
//! Core constants and groupings that define the operational boundaries of the
//! composer orchestration engine.

// Re-export state types for convenience
pub use crate::state_machine::{DeploymentState, RemoteState, SetupState, TaskLifecycle};

/// Core system events published on the orchestration event channel
pub mod events {
    // Task lifecycle events
    pub const TASK_STATE_CHANGED: &str = "task.state_changed";
    pub const TASK_QUARANTINED: &str = "task.quarantined";
    pub const TASK_QUARANTINE_CLEARED: &str = "task.quarantine_cleared";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_REMOVED: &str = "task.removed";

    // Process lifecycle events
    pub const PROCESS_SPAWNED: &str = "process.spawned";
    pub const PROCESS_READY: &str = "process.ready";
    pub const PROCESS_DIED: &str = "process.died";

    // Data-flow events
    pub const CONNECTION_ESTABLISHED: &str = "connection.established";
    pub const CONNECTION_REMOVED: &str = "connection.removed";
    pub const PROPERTIES_COMMITTED: &str = "properties.committed";

    // Generation / reconciliation events
    pub const GENERATION_COMPLETED: &str = "generation.completed";
    pub const GENERATION_FAILED: &str = "generation.failed";
    pub const CYCLE_COMPLETED: &str = "reconciler.cycle_completed";
}

/// Groupings of deployment states used by reconciliation decisions
pub mod status_groups {
    use crate::state_machine::DeploymentState;

    /// States in which a task is reachable on a live process
    pub const DEPLOYED: &[DeploymentState] = &[
        DeploymentState::Setup,
        DeploymentState::ReadyToStart,
        DeploymentState::Running,
        DeploymentState::Stopping,
    ];

    /// States from which an unexpected remote fault leads to quarantine
    pub const FAULT_SENSITIVE: &[DeploymentState] = &[
        DeploymentState::ReadyToStart,
        DeploymentState::Running,
        DeploymentState::Stopping,
    ];

    /// States in which the reconciler has nothing left to do for the task
    pub const SETTLED: &[DeploymentState] =
        &[DeploymentState::Running, DeploymentState::Removed];
}

/// System-wide constants
pub mod system {
    /// Maximum number of transition records retained per task
    pub const TRANSITION_HISTORY_LIMIT: usize = 64;

    /// Default capacity of the orchestration event channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
}
