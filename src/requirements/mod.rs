//! # Instance Requirements & Dependency Injection
//!
//! The abstract "what the user wants" layer: tree-shaped requirement
//! specifications, requirement merging, and the selection-scope stack that
//! substitutes abstract service requests with concrete models.
//!
//! Everything here is a pure function over immutable trees: merging and
//! injection produce new requirement trees, supporting safe sharing between
//! generation cycles.

pub mod injection;
pub mod instance_requirements;

pub use injection::{resolve_injection, InjectionContext, SelectionScope};
pub use instance_requirements::{
    ArgumentValue, InstanceRequirements, RequirementError, RequirementId, RequirementResult,
};
