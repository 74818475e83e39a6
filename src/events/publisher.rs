//! Event publisher for orchestration lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::constants::system::EVENT_CHANNEL_CAPACITY;
use crate::requirements::RequirementId;
use crate::runtime::ExitStatus;
use crate::state_machine::DeploymentState;

/// Lifecycle events emitted by the generation and reconciliation engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    TaskStateChanged {
        task: String,
        from: DeploymentState,
        to: DeploymentState,
    },
    TaskQuarantined {
        task: String,
        reason: String,
    },
    QuarantineCleared {
        task: String,
        automatic: bool,
    },
    /// A task failure propagated to the requirements that needed the task
    RequirementsAffected {
        task: String,
        requirements: Vec<RequirementId>,
        reason: String,
    },
    ProcessSpawned {
        deployment: String,
    },
    ProcessReady {
        deployment: String,
    },
    ProcessDied {
        deployment: String,
        status: ExitStatus,
    },
    ConnectionEstablished {
        source: String,
        source_port: String,
        sink: String,
        sink_port: String,
    },
    ConnectionRemoved {
        source: String,
        source_port: String,
        sink: String,
        sink_port: String,
    },
    PropertiesCommitted {
        task: String,
        count: usize,
    },
    GenerationCompleted {
        tasks: usize,
        connections: usize,
    },
    GenerationFailed {
        errors: Vec<String>,
    },
    CycleCompleted {
        operations: usize,
        deferred: usize,
        errors: usize,
    },
}

/// An event with its publication timestamp
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: OrchestrationEvent,
    pub published_at: DateTime<Utc>,
}

/// High-throughput publisher for orchestration lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl EventPublisher {
    /// Create a new publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Succeeds regardless of subscriber count.
    pub fn publish(&self, event: OrchestrationEvent) {
        let published = PublishedEvent {
            event,
            published_at: Utc::now(),
        };
        // send() errors only when there are no subscribers, which is fine
        // for observability events
        let _ = self.sender.send(published);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let publisher = EventPublisher::default();
        publisher.publish(OrchestrationEvent::ProcessReady {
            deployment: "vision".to_string(),
        });
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = EventPublisher::default();
        let mut receiver = publisher.subscribe();

        publisher.publish(OrchestrationEvent::TaskStateChanged {
            task: "camera".to_string(),
            from: DeploymentState::Setup,
            to: DeploymentState::ReadyToStart,
        });

        let received = receiver.recv().await.unwrap();
        assert!(matches!(
            received.event,
            OrchestrationEvent::TaskStateChanged { .. }
        ));
    }
}
