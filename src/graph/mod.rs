//! # Data-Flow Graph
//!
//! Task arena, typed connections, and per-connection policy. See
//! [`dataflow::DataFlowGraph`] for the invariants enforced on mutation.

pub mod dataflow;
pub mod policy;
pub mod task_instance;

pub use dataflow::{Connection, DataFlowGraph, GraphError, GraphResult};
pub use policy::{ConnectionPolicy, PolicyKind};
pub use task_instance::{DeploymentAssignment, TaskId, TaskInstance};
