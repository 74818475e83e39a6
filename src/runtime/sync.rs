//! Connection and property synchronization against live remote tasks.
//!
//! Model-level failures (missing port, type mismatch) are detected before any
//! remote call is made. Connection application is idempotent: re-applying an
//! identical policy is a no-op, and a policy change is refused here; the
//! reconciler must order an explicit disconnect first.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::remote_task::{RemoteTask, SyncError, SyncResult};
use crate::graph::{Connection, ConnectionPolicy, DataFlowGraph};
use crate::model::{ModelRegistry, PortDirection};
use crate::state_machine::TaskLifecycle;

/// Apply one connection between two live tasks.
///
/// Returns `Ok(false)` when an identical connection is already live (no-op),
/// `Ok(true)` when the connection was created.
pub async fn apply_connection(
    registry: &ModelRegistry,
    live: &mut DataFlowGraph,
    handles: &BTreeMap<String, Arc<dyn RemoteTask>>,
    source: &str,
    source_port: &str,
    sink: &str,
    sink_port: &str,
    policy: ConnectionPolicy,
) -> SyncResult<bool> {
    let source_id = live
        .id_of(source)
        .ok_or_else(|| SyncError::no_handle(source))?;
    let sink_id = live.id_of(sink).ok_or_else(|| SyncError::no_handle(sink))?;

    let source_task = live
        .task(source_id)
        .ok_or_else(|| SyncError::no_handle(source))?;
    let sink_task = live
        .task(sink_id)
        .ok_or_else(|| SyncError::no_handle(sink))?;

    for task in [source_task, sink_task] {
        if !task.state.is_ready_for_connections() {
            return Err(SyncError::NotReady {
                task: task.name.clone(),
                state: task.state.to_string(),
            });
        }
    }

    // model-level checks come first: these are definition errors, not
    // runtime failures, and must not reach the wire
    check_port(registry, &source_task.model, source, source_port, PortDirection::Output)?;
    check_port(registry, &sink_task.model, sink, sink_port, PortDirection::Input)?;

    let source_type = registry
        .resolve_port(&source_task.model, source_port)
        .ok()
        .flatten()
        .map(|p| p.data_type);
    let sink_type = registry
        .resolve_port(&sink_task.model, sink_port)
        .ok()
        .flatten()
        .map(|p| p.data_type);
    if source_type != sink_type {
        return Err(SyncError::TypeMismatch {
            source_id: source.to_string(),
            source_port: source_port.to_string(),
            sink: sink.to_string(),
            sink_port: sink_port.to_string(),
        });
    }

    if let Some(existing) = live
        .connections()
        .iter()
        .find(|c| c.endpoints() == (source_id, source_port, sink_id, sink_port))
    {
        if existing.policy == policy {
            return Ok(false);
        }
        return Err(SyncError::PolicyChangeRequiresReconnect {
            source_id: source.to_string(),
            source_port: source_port.to_string(),
            sink: sink.to_string(),
            sink_port: sink_port.to_string(),
        });
    }

    let source_handle = handles
        .get(source)
        .ok_or_else(|| SyncError::no_handle(source))?;
    let sink_handle = handles
        .get(sink)
        .ok_or_else(|| SyncError::no_handle(sink))?;

    source_handle
        .connect_ports(source_port, sink_handle.as_ref(), sink_port, &policy)
        .await?;

    live.add_connection(
        Connection {
            source: source_id,
            source_port: source_port.to_string(),
            sink: sink_id,
            sink_port: sink_port.to_string(),
            policy,
        },
        registry,
    )
    .map_err(|e| SyncError::communication_lost(source, e.to_string()))?;

    debug!(
        source = %source,
        source_port = %source_port,
        sink = %sink,
        sink_port = %sink_port,
        policy = %policy,
        "🔌 SYNC: Connection established"
    );
    Ok(true)
}

/// Tear down one live connection.
///
/// Returns `Ok(false)` when no such connection is live.
pub async fn remove_connection(
    live: &mut DataFlowGraph,
    handles: &BTreeMap<String, Arc<dyn RemoteTask>>,
    source: &str,
    source_port: &str,
    sink: &str,
    sink_port: &str,
) -> SyncResult<bool> {
    let (Some(source_id), Some(sink_id)) = (live.id_of(source), live.id_of(sink)) else {
        return Ok(false);
    };
    let present = live
        .connections()
        .iter()
        .any(|c| c.endpoints() == (source_id, source_port, sink_id, sink_port));
    if !present {
        return Ok(false);
    }

    // the remote side may already be gone (dead process); the live graph
    // entry is removed either way
    if let (Some(source_handle), Some(sink_handle)) = (handles.get(source), handles.get(sink)) {
        source_handle
            .disconnect_ports(source_port, sink_handle.as_ref(), sink_port)
            .await?;
    }

    live.remove_connection(source_id, source_port, sink_id, sink_port);
    debug!(
        source = %source,
        source_port = %source_port,
        sink = %sink,
        sink_port = %sink_port,
        "🔌 SYNC: Connection removed"
    );
    Ok(true)
}

/// Write all pending property values of a task, batched.
///
/// Values layer as: model defaults, then configuration defaults, then the
/// task's own arguments. While the task is `Running`, only properties marked
/// live-updatable are written; everything else stays pending for the next
/// commit in a non-running state. The applied set is only recorded once every
/// write succeeded, so a partial failure is retried wholesale.
pub async fn commit_properties(
    registry: &ModelRegistry,
    config_defaults: Option<&BTreeMap<String, Value>>,
    task_name: &str,
    live: &mut DataFlowGraph,
    handle: &dyn RemoteTask,
) -> SyncResult<usize> {
    let task = live
        .by_name(task_name)
        .ok_or_else(|| SyncError::no_handle(task_name))?;
    let pending = pending_properties(registry, config_defaults, task);

    if pending.is_empty() {
        return Ok(0);
    }

    for (name, value) in &pending {
        handle.set_property(name, value).await?;
    }

    let written = pending.len();
    let task = live
        .by_name_mut(task_name)
        .ok_or_else(|| SyncError::no_handle(task_name))?;
    for (name, value) in pending {
        task.applied_properties.insert(name, value);
    }

    debug!(
        task = %task_name,
        written = written,
        "🔧 SYNC: Properties committed"
    );
    Ok(written)
}

/// Property values a commit would write right now.
///
/// Values layer as model defaults, then configuration defaults, then the
/// task's own arguments; only properties declared on the model count. While
/// the task is `Running`, properties not marked live-updatable are excluded
/// and stay pending for the next commit in a non-running state.
pub fn pending_properties(
    registry: &ModelRegistry,
    config_defaults: Option<&BTreeMap<String, Value>>,
    task: &crate::graph::TaskInstance,
) -> Vec<(String, Value)> {
    let Ok(properties) = registry.effective_properties(&task.model) else {
        return Vec::new();
    };

    let mut desired: BTreeMap<String, Value> = BTreeMap::new();
    for property in &properties {
        if let Some(default) = &property.default {
            desired.insert(property.name.clone(), default.clone());
        }
    }
    if let Some(defaults) = config_defaults {
        for (name, value) in defaults {
            desired.insert(name.clone(), value.clone());
        }
    }
    for (name, value) in &task.arguments {
        desired.insert(name.clone(), value.clone());
    }
    desired.retain(|name, _| properties.iter().any(|p| &p.name == name));

    let running = task.lifecycle == TaskLifecycle::Running;
    let mut pending: Vec<(String, Value)> = desired
        .into_iter()
        .filter(|(name, value)| task.applied_properties.get(name) != Some(value))
        .collect();
    if running {
        pending.retain(|(name, _)| {
            properties
                .iter()
                .any(|p| &p.name == name && p.live_updatable)
        });
    }
    pending
}

fn check_port(
    registry: &ModelRegistry,
    model: &str,
    task: &str,
    port: &str,
    expected: PortDirection,
) -> SyncResult<()> {
    match registry.resolve_port(model, port) {
        Ok(Some(p)) if p.direction == expected => Ok(()),
        _ => Err(SyncError::port_not_found(task, port)),
    }
}
