//! Transition function for the deployment-state machine.
//!
//! Pure: the reconciliation engine owns the task data and applies the
//! resulting state itself, publishing a transition event. State is re-derived
//! from the live graph every cycle, so there is no persistence layer here,
//! only a bounded in-memory history per task for diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::events::TaskEvent;
use super::states::DeploymentState;
use crate::constants::system::TRANSITION_HISTORY_LIMIT;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateMachineError {
    #[error("invalid transition from {from} on {event}")]
    InvalidTransition { from: DeploymentState, event: String },

    #[error("guard {guard} rejected transition: {reason}")]
    GuardRejected { guard: &'static str, reason: String },
}

pub type StateMachineResult<T> = std::result::Result<T, StateMachineError>;

/// Determine the target state for an event applied in `current`
pub fn determine_target_state(
    current: DeploymentState,
    event: &TaskEvent,
) -> StateMachineResult<DeploymentState> {
    use DeploymentState as S;

    let target = match (current, event) {
        // deployment pipeline
        (S::Abstract, TaskEvent::Selected) => S::SelectedForDeployment,
        (S::SelectedForDeployment, TaskEvent::SpawnIssued) => S::WaitingForProcess,
        (S::WaitingForProcess, TaskEvent::ProcessReady) => S::Setup,
        (S::Setup, TaskEvent::Configured) => S::ReadyToStart,
        (S::ReadyToStart, TaskEvent::Started) => S::Running,

        // stop and restart
        (S::Running, TaskEvent::StopRequested) => S::Stopping,
        (S::Stopping, TaskEvent::Stopped) => S::ReadyToStart,

        // fault handling
        (S::Setup, TaskEvent::ConfigurationFailed(_)) => S::Quarantined,
        (state, TaskEvent::Fault(_)) if state.is_fault_sensitive() => S::Quarantined,
        (S::Quarantined, TaskEvent::QuarantineCleared) => S::SelectedForDeployment,

        // garbage collection
        (state, TaskEvent::Unreferenced) if state != S::Removed => S::Garbage,
        (S::Garbage, TaskEvent::StopRequested) => S::Garbage,
        (S::Garbage, TaskEvent::Stopped) => S::Garbage,

        // removal: never directly from an active remote state
        (
            S::Abstract
            | S::SelectedForDeployment
            | S::WaitingForProcess
            | S::Setup
            | S::ReadyToStart
            | S::Quarantined
            | S::Garbage,
            TaskEvent::Remove,
        ) => S::Removed,

        (from, event) => {
            return Err(StateMachineError::InvalidTransition {
                from,
                event: event.event_type().to_string(),
            })
        }
    };

    Ok(target)
}

/// One recorded state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: DeploymentState,
    pub to: DeploymentState,
    pub event: String,
    pub at: DateTime<Utc>,
}

/// Bounded per-task transition history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionLog {
    records: Vec<TransitionRecord>,
}

impl TransitionLog {
    pub fn record(&mut self, from: DeploymentState, to: DeploymentState, event: &TaskEvent) {
        if self.records.len() == TRANSITION_HISTORY_LIMIT {
            self.records.remove(0);
        }
        self.records.push(TransitionRecord {
            from,
            to,
            event: event.event_type().to_string(),
            at: Utc::now(),
        });
    }

    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&TransitionRecord> {
        self.records.last()
    }
}
