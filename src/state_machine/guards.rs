//! Guard conditions checked before applying state transitions.

use super::task_state_machine::{StateMachineError, StateMachineResult};
use crate::graph::TaskInstance;

/// A condition that must hold for a transition to be applied
pub trait StateGuard {
    fn check(&self, task: &TaskInstance) -> StateMachineResult<()>;

    /// Description of this guard for logging
    fn description(&self) -> &'static str;
}

/// A task may only start once its setup axis reached `Configured`
pub struct ConfiguredBeforeStart;

impl StateGuard for ConfiguredBeforeStart {
    fn check(&self, task: &TaskInstance) -> StateMachineResult<()> {
        if task.setup.is_configured() {
            Ok(())
        } else {
            Err(StateMachineError::GuardRejected {
                guard: self.description(),
                reason: format!(
                    "task {} is {} and cannot start before it is configured",
                    task.name, task.setup
                ),
            })
        }
    }

    fn description(&self) -> &'static str {
        "configured_before_start"
    }
}

/// A task must not be stopped while its start transition is in flight
pub struct SafeToStop;

impl StateGuard for SafeToStop {
    fn check(&self, task: &TaskInstance) -> StateMachineResult<()> {
        if task.lifecycle.is_safe_to_stop() {
            Ok(())
        } else {
            Err(StateMachineError::GuardRejected {
                guard: self.description(),
                reason: format!(
                    "task {} is {} and must settle before it can be stopped",
                    task.name, task.lifecycle
                ),
            })
        }
    }

    fn description(&self) -> &'static str {
        "safe_to_stop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{SetupState, TaskLifecycle};

    #[test]
    fn test_start_requires_configured() {
        let mut task = TaskInstance::new("camera", "video_source");
        assert!(ConfiguredBeforeStart.check(&task).is_err());
        task.setup = SetupState::Configured;
        assert!(ConfiguredBeforeStart.check(&task).is_ok());
    }

    #[test]
    fn test_stop_rejected_mid_start() {
        let mut task = TaskInstance::new("camera", "video_source");
        task.lifecycle = TaskLifecycle::Starting;
        assert!(SafeToStop.check(&task).is_err());
        task.lifecycle = TaskLifecycle::Running;
        assert!(SafeToStop.check(&task).is_ok());
    }
}
