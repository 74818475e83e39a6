//! # Task State Management
//!
//! The reconciler-level state machine layered on top of the host plan's own
//! task events: deployment states, the orthogonal setup axis, the remote
//! component state mirror, and the transition function with its guards.

pub mod events;
pub mod guards;
pub mod states;
pub mod task_state_machine;

pub use events::TaskEvent;
pub use guards::{ConfiguredBeforeStart, SafeToStop, StateGuard};
pub use states::{DeploymentState, RemoteState, SetupState, TaskLifecycle};
pub use task_state_machine::{
    determine_target_state, StateMachineError, StateMachineResult, TransitionLog,
    TransitionRecord,
};
