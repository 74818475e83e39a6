//! Generation error taxonomy and the batch failure container.

use std::fmt;

use thiserror::Error;

use crate::graph::GraphError;
use crate::model::ModelError;
use crate::requirements::RequirementError;

/// One error gathered during a generation pass
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("cannot install missing model {request} required by {required_by}")]
    CannotInstallMissingModel {
        request: String,
        required_by: String,
    },

    #[error("requirement {required_by} is still abstract: candidates {candidates:?}")]
    AmbiguousModel {
        required_by: String,
        candidates: Vec<String>,
    },

    #[error("ambiguous connection between {source_id} and {sink}: candidates {candidates:?}")]
    AmbiguousConnection {
        source_id: String,
        sink: String,
        candidates: Vec<String>,
    },

    #[error("no port of {task} (model {model}) can be connected to {other}")]
    NoConnectionCandidate {
        task: String,
        model: String,
        other: String,
    },

    #[error("port {port} not found on {task} (model {model})")]
    MissingPort {
        task: String,
        model: String,
        port: String,
    },

    #[error("no configured deployment can host {task} (model {model}, group {group:?})")]
    MissingDeployment {
        task: String,
        model: String,
        group: Option<String>,
    },

    #[error(transparent)]
    Requirement(#[from] RequirementError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

/// All errors of one failed generation batch, reported together so the user
/// sees every problem at once instead of the first one only
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationFailure {
    pub errors: Vec<GenerationError>,
}

impl std::error::Error for GenerationFailure {}

impl GenerationFailure {
    pub fn new(errors: Vec<GenerationError>) -> Self {
        Self { errors }
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "network generation failed with {} error(s):",
            self.errors.len()
        )?;
        for (index, error) in self.errors.iter().enumerate() {
            writeln!(f, "  {}: {error}", index + 1)?;
        }
        Ok(())
    }
}
