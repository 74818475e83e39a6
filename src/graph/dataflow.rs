//! # Data-Flow Graph
//!
//! Directed multigraph of concrete task instances and typed port-to-port
//! connections. Tasks live in an arena indexed by [`TaskId`]; connections and
//! requirement references are side tables of id pairs, so there are no
//! ownership cycles between tasks, compositions, and connections.
//!
//! Two instances of this type exist at runtime: the **target** graph produced
//! fresh by each generation pass, and the **live** graph owned by the
//! reconciliation engine, mirroring what is actually running and connected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::policy::ConnectionPolicy;
use super::task_instance::{TaskId, TaskInstance};
use crate::model::{ModelRegistry, PortDirection};

/// Errors raised by graph mutation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("duplicate task name: {name}")]
    DuplicateTask { name: String },

    #[error("unknown task: {id}")]
    UnknownTask { id: TaskId },

    #[error("port {port} not found on {task} (model {model})")]
    PortNotFound {
        task: String,
        model: String,
        port: String,
    },

    #[error("port {port} on {task} is not an {expected} port")]
    WrongDirection {
        task: String,
        port: String,
        expected: &'static str,
    },

    #[error(
        "type mismatch connecting {source_id}.{source_port} ({source_type}) to {sink}.{sink_port} ({sink_type})"
    )]
    TypeMismatch {
        source_id: String,
        source_port: String,
        source_type: String,
        sink: String,
        sink_port: String,
        sink_type: String,
    },

    #[error("sink port {sink}.{port} already has a writer and does not multiplex")]
    SinkPortOccupied { sink: String, port: String },
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// A typed connection between an output port and an input port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub source: TaskId,
    pub source_port: String,
    pub sink: TaskId,
    pub sink_port: String,
    pub policy: ConnectionPolicy,
}

impl Connection {
    /// Endpoint identity without the policy, used to detect policy changes
    pub fn endpoints(&self) -> (TaskId, &str, TaskId, &str) {
        (
            self.source,
            self.source_port.as_str(),
            self.sink,
            self.sink_port.as_str(),
        )
    }
}

/// Arena of task instances plus the connection side table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataFlowGraph {
    tasks: BTreeMap<TaskId, TaskInstance>,
    by_name: BTreeMap<String, TaskId>,
    connections: Vec<Connection>,
    next_id: u32,
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task, failing on duplicate names
    pub fn add_task(&mut self, task: TaskInstance) -> GraphResult<TaskId> {
        if self.by_name.contains_key(&task.name) {
            return Err(GraphError::DuplicateTask {
                name: task.name.clone(),
            });
        }
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.by_name.insert(task.name.clone(), id);
        self.tasks.insert(id, task);
        Ok(id)
    }

    /// Remove a task and every connection touching it
    pub fn remove_task(&mut self, id: TaskId) -> Option<TaskInstance> {
        let task = self.tasks.remove(&id)?;
        self.by_name.remove(&task.name);
        self.connections
            .retain(|c| c.source != id && c.sink != id);
        Some(task)
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskInstance> {
        self.tasks.get(&id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut TaskInstance> {
        self.tasks.get_mut(&id)
    }

    pub fn id_of(&self, name: &str) -> Option<TaskId> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&TaskInstance> {
        self.id_of(name).and_then(|id| self.task(id))
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut TaskInstance> {
        let id = self.id_of(name)?;
        self.task_mut(id)
    }

    /// Tasks in deterministic (id) order
    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &TaskInstance)> {
        self.tasks.iter().map(|(id, task)| (*id, task))
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Connections that touch the given task
    pub fn connections_of(&self, id: TaskId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.source == id || c.sink == id)
    }

    /// Validate and add a connection.
    ///
    /// Checks, in order: both endpoints exist, both ports exist on the
    /// endpoint models with the right direction, the port types are
    /// compatible, and the sink port has no other writer unless it
    /// multiplexes.
    pub fn add_connection(
        &mut self,
        connection: Connection,
        registry: &ModelRegistry,
    ) -> GraphResult<()> {
        let source = self
            .tasks
            .get(&connection.source)
            .ok_or(GraphError::UnknownTask {
                id: connection.source,
            })?;
        let sink = self
            .tasks
            .get(&connection.sink)
            .ok_or(GraphError::UnknownTask {
                id: connection.sink,
            })?;

        let source_port = lookup_port(
            registry,
            source,
            &connection.source_port,
            PortDirection::Output,
        )?;
        let sink_port = lookup_port(
            registry,
            sink,
            &connection.sink_port,
            PortDirection::Input,
        )?;

        if !source_port.data_type.is_compatible_with(&sink_port.data_type) {
            return Err(GraphError::TypeMismatch {
                source_id: source.name.clone(),
                source_port: connection.source_port.clone(),
                source_type: source_port.data_type.to_string(),
                sink: sink.name.clone(),
                sink_port: connection.sink_port.clone(),
                sink_type: sink_port.data_type.to_string(),
            });
        }

        if !sink_port.multiplexing {
            let occupied = self.connections.iter().any(|c| {
                c.sink == connection.sink
                    && c.sink_port == connection.sink_port
                    && (c.source, &c.source_port)
                        != (connection.source, &connection.source_port)
            });
            if occupied {
                return Err(GraphError::SinkPortOccupied {
                    sink: sink.name.clone(),
                    port: connection.sink_port.clone(),
                });
            }
        }

        // identical connection is a no-op; same endpoints with a different
        // policy replace the entry (the runtime layer is responsible for the
        // disconnect/reconnect ordering)
        if let Some(existing) = self
            .connections
            .iter_mut()
            .find(|c| c.endpoints() == connection.endpoints())
        {
            existing.policy = connection.policy;
            return Ok(());
        }

        self.connections.push(connection);
        Ok(())
    }

    /// Remove the connection with the given endpoints, returning whether one
    /// was present
    pub fn remove_connection(
        &mut self,
        source: TaskId,
        source_port: &str,
        sink: TaskId,
        sink_port: &str,
    ) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| {
            c.endpoints() != (source, source_port, sink, sink_port)
        });
        before != self.connections.len()
    }

    /// Check the no-dangling-edges invariant; violations indicate an engine
    /// bug rather than bad input
    pub fn check_consistency(&self) -> GraphResult<()> {
        for connection in &self.connections {
            if !self.tasks.contains_key(&connection.source) {
                return Err(GraphError::UnknownTask {
                    id: connection.source,
                });
            }
            if !self.tasks.contains_key(&connection.sink) {
                return Err(GraphError::UnknownTask {
                    id: connection.sink,
                });
            }
        }
        Ok(())
    }
}

fn lookup_port(
    registry: &ModelRegistry,
    task: &TaskInstance,
    port_name: &str,
    expected: PortDirection,
) -> GraphResult<crate::model::Port> {
    let port = registry
        .resolve_port(&task.model, port_name)
        .ok()
        .flatten()
        .ok_or_else(|| GraphError::PortNotFound {
            task: task.name.clone(),
            model: task.model.clone(),
            port: port_name.to_string(),
        })?;
    if port.direction != expected {
        return Err(GraphError::WrongDirection {
            task: task.name.clone(),
            port: port_name.to_string(),
            expected: match expected {
                PortDirection::Input => "input",
                PortDirection::Output => "output",
            },
        });
    }
    Ok(port)
}
