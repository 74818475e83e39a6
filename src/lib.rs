#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Composer Core
//!
//! Model-driven orchestration core for networks of long-running, statically
//! typed software components distributed across one or more OS processes.
//!
//! Users declare the component instances they want, how they interconnect,
//! and where they deploy; the engines converge the running world to that
//! declaration and keep converging it while remote processes start, crash,
//! or disappear.
//!
//! ## Architecture
//!
//! Two engines share one [`context::OrchestratorContext`]:
//!
//! - the **generation engine** merges abstract requirement trees into a
//!   minimal concrete data-flow graph (dependency injection, structural
//!   merging, connection resolution, deployment selection), producing a
//!   fresh target graph every cycle;
//! - the **reconciliation engine** owns the live graph, diffs it against the
//!   target, and executes the ordered operation list against the external
//!   process-management and task-handle capabilities, deferring whatever is
//!   not ready yet to a later cycle.
//!
//! A single [`orchestrator::Orchestrator`] drives both, one step per control
//! cycle of the host event loop. There is exactly one mutator of live state,
//! so the core needs no internal locking; concurrency enters only at the
//! capability boundary and is ingested at cycle start.
//!
//! ## Module Organization
//!
//! - [`model`] - Component/service/composition models and the registry
//! - [`requirements`] - Instance requirements, merging, dependency injection
//! - [`graph`] - The data-flow graph arena and connection policies
//! - [`generation`] - Requirements to target graph
//! - [`state_machine`] - Per-task deployment state management
//! - [`reconciler`] - Target/live diffing and cycle execution
//! - [`deployment`] - Deployments and the process-server binding
//! - [`runtime`] - ProcessManager/RemoteTask capabilities and synchronization
//! - [`events`] - Lifecycle event publishing
//! - [`config`] - YAML configuration with environment overlays
//! - [`error`] - Structured error handling

pub mod config;
pub mod constants;
pub mod context;
pub mod deployment;
pub mod error;
pub mod events;
pub mod generation;
pub mod graph;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod reconciler;
pub mod requirements;
pub mod runtime;
pub mod state_machine;

pub use config::{ComposerConfig, ConfigurationManager};
pub use constants::events as system_events;
pub use context::OrchestratorContext;
pub use error::{ComposerError, Result};
pub use events::{EventPublisher, OrchestrationEvent};
pub use graph::{ConnectionPolicy, DataFlowGraph, TaskInstance};
pub use orchestrator::Orchestrator;
pub use reconciler::{CycleReport, Operation, ReconciliationEngine};
pub use requirements::{InstanceRequirements, RequirementId};
pub use state_machine::{DeploymentState, RemoteState, SetupState, TaskLifecycle};
