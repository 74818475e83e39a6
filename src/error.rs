//! # Structured Error Handling
//!
//! Top-level error type aggregating the subsystem error enums. Each subsystem
//! keeps its own `thiserror` enum and `Result` alias; this type is what the
//! orchestrator facade surfaces to callers.

use thiserror::Error;

use crate::generation::GenerationFailure;
use crate::graph::GraphError;
use crate::model::ModelError;
use crate::reconciler::ReconcileError;
use crate::requirements::RequirementError;
use crate::runtime::{ProcessError, SyncError};
use crate::state_machine::StateMachineError;

/// Errors surfaced by the orchestrator facade.
#[derive(Debug, Error)]
pub enum ComposerError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Requirement(#[from] RequirementError),

    #[error(transparent)]
    Generation(#[from] GenerationFailure),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Reconciliation(#[from] ReconcileError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ComposerError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ComposerError>;
