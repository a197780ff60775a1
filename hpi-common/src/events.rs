//! Integration event types and broadcast event bus
//!
//! The orchestrator emits one event per plan/task lifecycle step. Subscribers
//! (status streaming, audit logging, tests) receive them through [`EventBus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Integration lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum IntegrationEvent {
    /// Plan built for a hospital
    PlanCreated {
        plan_id: Uuid,
        hospital_id: String,
        task_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A priority tier began dispatching its pending tasks
    TierStarted {
        plan_id: Uuid,
        priority: String,
        task_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Task attempt dispatched to its collector
    TaskStarted {
        plan_id: Uuid,
        task_id: Uuid,
        source: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// Task attempt failed and will be retried
    TaskRetrying {
        plan_id: Uuid,
        task_id: Uuid,
        source: String,
        retry_count: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Task collected and validated data
    TaskCompleted {
        plan_id: Uuid,
        task_id: Uuid,
        source: String,
        quality_score: u8,
        timestamp: DateTime<Utc>,
    },

    /// Task permanently failed
    TaskFailed {
        plan_id: Uuid,
        task_id: Uuid,
        source: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Plan moved to the next phase
    PhaseChanged {
        plan_id: Uuid,
        phase: String,
        timestamp: DateTime<Utc>,
    },

    /// Plan reached a terminal status
    PlanFinished {
        plan_id: Uuid,
        hospital_id: String,
        status: String,
        overall_quality: Option<f64>,
        timestamp: DateTime<Utc>,
    },

    /// One hospital of a batch finished
    BatchProgress {
        batch_id: Uuid,
        completed: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`IntegrationEvent`]s
///
/// Backed by `tokio::sync::broadcast`: publishing never blocks, slow
/// subscribers observe `Lagged`, and dropped receivers are cleaned up
/// automatically.
///
/// # Examples
///
/// ```
/// use hpi_common::events::{EventBus, IntegrationEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(IntegrationEvent::PhaseChanged {
///     plan_id: uuid::Uuid::new_v4(),
///     phase: "VALIDATION".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IntegrationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<IntegrationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning the subscriber count
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: IntegrationEvent,
    ) -> Result<usize, broadcast::error::SendError<IntegrationEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: IntegrationEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        let result = bus.emit(IntegrationEvent::PhaseChanged {
            plan_id: Uuid::new_v4(),
            phase: "ENRICHMENT".to_string(),
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let plan_id = Uuid::new_v4();
        bus.emit_lossy(IntegrationEvent::PlanCreated {
            plan_id,
            hospital_id: "H-1".to_string(),
            task_count: 3,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            IntegrationEvent::PlanCreated {
                plan_id: received,
                task_count,
                ..
            } => {
                assert_eq!(received, plan_id);
                assert_eq!(task_count, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = IntegrationEvent::BatchProgress {
            batch_id: Uuid::new_v4(),
            completed: 2,
            total: 20,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BatchProgress");
        assert_eq!(json["total"], 20);
    }
}
