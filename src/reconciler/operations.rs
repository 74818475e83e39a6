//! Operations emitted by a reconciliation pass.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::ConnectionPolicy;

/// Name-based identity of a connection, valid across graph generations
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub source: String,
    pub source_port: String,
    pub sink: String,
    pub sink_port: String,
    pub policy: ConnectionPolicy,
}

impl ConnectionSpec {
    /// Endpoint identity without the policy
    pub fn endpoints(&self) -> (&str, &str, &str, &str) {
        (
            &self.source,
            &self.source_port,
            &self.sink,
            &self.sink_port,
        )
    }
}

impl fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{} [{}]",
            self.source, self.source_port, self.sink, self.sink_port, self.policy
        )
    }
}

/// One action the reconciler wants executed against the running system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Disconnect { connection: ConnectionSpec },
    Stop { task: String },
    Remove { task: String },
    KillProcess { deployment: String },
    Spawn { deployment: String },
    Configure { task: String },
    UpdateProperties { task: String },
    Start { task: String },
    Connect { connection: ConnectionSpec },
}

impl Operation {
    /// Execution phase. Lower phases run first: disconnect before stop of
    /// either endpoint, stop before start for in-place replacement,
    /// configure (and property writes) before start, connect last.
    pub fn phase(&self) -> u8 {
        match self {
            Self::Disconnect { .. } => 0,
            Self::Stop { .. } => 1,
            Self::Remove { .. } => 2,
            Self::KillProcess { .. } => 3,
            Self::Spawn { .. } => 4,
            Self::Configure { .. } => 5,
            Self::UpdateProperties { .. } => 6,
            Self::Start { .. } => 7,
            Self::Connect { .. } => 8,
        }
    }

    /// Secondary sort key for deterministic ordering within a phase
    pub fn sort_key(&self) -> String {
        match self {
            Self::Disconnect { connection } | Self::Connect { connection } => {
                connection.to_string()
            }
            Self::Stop { task }
            | Self::Remove { task }
            | Self::Configure { task }
            | Self::UpdateProperties { task }
            | Self::Start { task } => task.clone(),
            Self::KillProcess { deployment } | Self::Spawn { deployment } => deployment.clone(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnect { connection } => write!(f, "disconnect {connection}"),
            Self::Stop { task } => write!(f, "stop {task}"),
            Self::Remove { task } => write!(f, "remove {task}"),
            Self::KillProcess { deployment } => write!(f, "kill_process {deployment}"),
            Self::Spawn { deployment } => write!(f, "spawn {deployment}"),
            Self::Configure { task } => write!(f, "configure {task}"),
            Self::UpdateProperties { task } => write!(f, "update_properties {task}"),
            Self::Start { task } => write!(f, "start {task}"),
            Self::Connect { connection } => write!(f, "connect {connection}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering_constraints() {
        let connection = ConnectionSpec {
            source: "a".to_string(),
            source_port: "out".to_string(),
            sink: "b".to_string(),
            sink_port: "in".to_string(),
            policy: ConnectionPolicy::data(),
        };
        let disconnect = Operation::Disconnect {
            connection: connection.clone(),
        };
        let connect = Operation::Connect { connection };
        let stop = Operation::Stop {
            task: "a".to_string(),
        };
        let configure = Operation::Configure {
            task: "a".to_string(),
        };
        let start = Operation::Start {
            task: "a".to_string(),
        };

        assert!(disconnect.phase() < stop.phase());
        assert!(stop.phase() < start.phase());
        assert!(configure.phase() < start.phase());
        assert!(start.phase() < connect.phase());
    }
}
