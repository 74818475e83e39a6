//! Concrete task instances: the nodes of a data-flow graph.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::requirements::RequirementId;
use crate::state_machine::{
    DeploymentState, RemoteState, SetupState, TaskLifecycle, TransitionLog,
};

/// Arena index of a task inside one data-flow graph generation.
///
/// Ids are only meaningful within the graph that issued them; cross-graph
/// identity goes by task name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TaskId(pub u32);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Binding of a task to the configured deployment that hosts it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentAssignment {
    pub deployment: String,
    pub process_server: String,
    /// Name the task goes by inside the deployment's process
    pub remote_name: String,
}

/// A concrete task instance in a data-flow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub name: String,
    /// Resolved concrete component model
    pub model: String,
    /// Bound construction arguments
    pub arguments: BTreeMap<String, Value>,
    pub deployment: Option<DeploymentAssignment>,
    pub state: DeploymentState,
    pub lifecycle: TaskLifecycle,
    pub setup: SetupState,
    /// Last state reported by the remote component, if any
    pub remote_state: Option<RemoteState>,
    /// Live requirements that need this task
    pub requirement_refs: BTreeSet<RequirementId>,
    /// Property values most recently committed to the remote task
    pub applied_properties: BTreeMap<String, Value>,
    pub history: TransitionLog,
}

impl TaskInstance {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            arguments: BTreeMap::new(),
            deployment: None,
            state: DeploymentState::default(),
            lifecycle: TaskLifecycle::default(),
            setup: SetupState::default(),
            remote_state: None,
            requirement_refs: BTreeSet::new(),
            applied_properties: BTreeMap::new(),
            history: TransitionLog::default(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn with_deployment(mut self, assignment: DeploymentAssignment) -> Self {
        self.deployment = Some(assignment);
        self
    }

    pub fn with_requirement_ref(mut self, id: RequirementId) -> Self {
        self.requirement_refs.insert(id);
        self
    }

    /// Whether any live requirement still needs this task
    pub fn is_referenced(&self) -> bool {
        !self.requirement_refs.is_empty()
    }

    /// Structural identity: same name, model, and arguments. A task that
    /// matches by name but not structurally must be torn down and rebuilt,
    /// never mutated in place.
    pub fn same_definition_as(&self, other: &TaskInstance) -> bool {
        self.name == other.name
            && self.model == other.model
            && self.arguments == other.arguments
    }
}
