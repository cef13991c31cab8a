//! Broadcast event bus for workflow lifecycle events.
//!
//! One `EventBus` is shared by every run on an engine, so a subscriber sees
//! the interleaved events of all concurrent workflows. `subscribe_workflow`
//! narrows that stream to a single workflow id. Publishing with no active
//! subscribers is a no-op.

use stepwise_types::event::WorkflowEvent;
use tokio::sync::broadcast;

/// Multi-consumer bus for workflow lifecycle events.
///
/// Wraps a `tokio::sync::broadcast` channel. Cloning the bus clones the
/// sender, allowing multiple producers and consumers.
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to the future events of one workflow only.
    pub fn subscribe_workflow(&self, workflow_id: impl Into<String>) -> WorkflowSubscription {
        WorkflowSubscription {
            workflow_id: workflow_id.into(),
            receiver: self.sender.subscribe(),
            lagged: 0,
        }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no subscribers, the event is silently dropped.
    pub fn publish(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live receivers, filtered or not.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver that yields only the events of a single workflow.
///
/// Lag is absorbed rather than surfaced: missed events are counted and the
/// subscription continues with the oldest retained event.
#[derive(Debug)]
pub struct WorkflowSubscription {
    workflow_id: String,
    receiver: broadcast::Receiver<WorkflowEvent>,
    lagged: u64,
}

impl WorkflowSubscription {
    /// Next event for this workflow, or `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<WorkflowEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.workflow_id() == self.workflow_id => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    self.lagged += missed;
                    tracing::warn!(
                        workflow_id = self.workflow_id.as_str(),
                        missed,
                        "event subscriber lagged, events dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Events of any workflow dropped because this subscriber fell behind.
    pub fn lagged(&self) -> u64 {
        self.lagged
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(step_number: u32) -> WorkflowEvent {
        WorkflowEvent::StepSkipped {
            workflow_id: "wf".to_string(),
            step_number,
            step_name: format!("step-{step_number}"),
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe_delivers_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(sample_event(0));

        let received = rx.recv().await.unwrap();
        assert_eq!(received, sample_event(0));
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.clone().subscribe();

        bus.publish(sample_event(3));

        assert_eq!(rx1.recv().await.unwrap().step_number(), Some(3));
        assert_eq!(rx2.recv().await.unwrap().step_number(), Some(3));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(sample_event(0));
        bus.publish(sample_event(1));
    }

    #[tokio::test]
    async fn lagged_receiver_handles_gracefully() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        for i in 0..10 {
            bus.publish(sample_event(i));
        }

        let result = rx.recv().await;
        assert!(matches!(
            result,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        // After the lag notice the receiver continues with the retained tail.
        assert_eq!(rx.recv().await.unwrap().step_number(), Some(6));
    }

    fn skipped(workflow_id: &str, step_number: u32) -> WorkflowEvent {
        WorkflowEvent::StepSkipped {
            workflow_id: workflow_id.to_string(),
            step_number,
            step_name: format!("step-{step_number}"),
        }
    }

    #[tokio::test]
    async fn workflow_subscription_skips_other_workflows() {
        let bus = EventBus::new(16);
        let mut mine = bus.subscribe_workflow("mine");
        let mut all = bus.subscribe();

        bus.publish(skipped("other", 0));
        bus.publish(skipped("mine", 1));
        bus.publish(skipped("other", 2));
        bus.publish(skipped("mine", 3));

        assert_eq!(mine.recv().await, Some(skipped("mine", 1)));
        assert_eq!(mine.recv().await, Some(skipped("mine", 3)));
        assert_eq!(all.recv().await.unwrap(), skipped("other", 0));
        assert_eq!(mine.workflow_id(), "mine");
    }

    #[tokio::test]
    async fn workflow_subscription_ends_when_bus_dropped() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe_workflow("wf");
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(skipped("wf", 0));
        drop(bus);

        assert_eq!(sub.recv().await, Some(skipped("wf", 0)));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn workflow_subscription_absorbs_lag() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe_workflow("wf");

        for i in 0..10 {
            bus.publish(skipped("wf", i));
        }

        assert_eq!(sub.recv().await.unwrap().step_number(), Some(6));
        assert_eq!(sub.lagged(), 6);
    }
}
