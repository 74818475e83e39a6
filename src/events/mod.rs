//! # Orchestration Events
//!
//! Broadcast channel carrying lifecycle events out of the engines. Publishing
//! never fails: events are observability, not control flow, and a channel
//! with no subscribers simply drops them.

pub mod publisher;

pub use publisher::{EventPublisher, OrchestrationEvent, PublishedEvent};
