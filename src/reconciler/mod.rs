//! # Runtime Reconciliation Engine
//!
//! Diffs the target graph against the live graph each cycle, orders the
//! resulting operations under the runtime safety constraints, and drives
//! execution forward while deployment processes start, crash, or disappear.
//!
//! The engine is the sole mutator of the live graph. External state
//! (process readiness, terminations, remote component states) is ingested
//! once at the start of each cycle, never mid-cycle, so every pass works
//! from one consistent view of the world.

pub mod diff;
pub mod engine;
pub mod operations;
pub mod ordering;

pub use diff::{diff, GraphDelta};
pub use engine::{CycleReport, ProcessRecord, ReconcileError, ReconciliationEngine};
pub use operations::{ConnectionSpec, Operation};
pub use ordering::order_operations;
