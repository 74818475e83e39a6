//! # Network Merge / Generation Engine
//!
//! Turns a batch of instance requirements into a minimal concrete data-flow
//! graph: recursive instantiation with dependency injection and
//! specialization matching, structural merging to a fixpoint, connection
//! resolution, and deployment selection.
//!
//! Generation is all-or-nothing per invocation: a failure anywhere aborts the
//! batch, and every gathered error is reported at once.

pub mod candidates;
pub mod connections;
pub mod deployments;
pub mod engine;
pub mod errors;
pub mod instantiate;
pub mod merge;

pub use engine::GenerationEngine;
pub use errors::{GenerationError, GenerationFailure, GenerationResult};
