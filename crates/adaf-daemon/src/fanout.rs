//! Event fan-out to attach subscribers.
//!
//! Every subscriber gets its own bounded queue. Events are delivered in
//! emission order to each queue; a full queue either evicts its subscriber
//! or blocks the producer, per the configured policy. Eviction never
//! affects other subscribers or the controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use adaf_runner::event::RunnerEvent;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::bootstrap::OverflowPolicy;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<RunnerEvent>,
}

pub struct FanOut {
    subscribers: Mutex<Vec<Subscriber>>,
    capacity: usize,
    policy: OverflowPolicy,
    next_id: AtomicU64,
}

impl FanOut {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(Vec::new()),
            capacity,
            policy,
            next_id: AtomicU64::new(1),
        })
    }

    /// Register a new subscriber and return its queue.
    pub async fn subscribe(&self) -> mpsc::Receiver<RunnerEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().await.push(Subscriber { id, tx });
        rx
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Deliver one event to every subscriber.
    pub async fn publish(&self, event: &RunnerEvent) {
        let mut subscribers = self.subscribers.lock().await;
        let mut evicted: Vec<u64> = Vec::new();

        for subscriber in subscribers.iter() {
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => evicted.push(subscriber.id),
                Err(mpsc::error::TrySendError::Full(ev)) => match self.policy {
                    OverflowPolicy::DropSubscriber => {
                        warn!(subscriber = subscriber.id, "slow subscriber evicted");
                        evicted.push(subscriber.id);
                    }
                    OverflowPolicy::Block => {
                        if subscriber.tx.send(ev).await.is_err() {
                            evicted.push(subscriber.id);
                        }
                    }
                },
            }
        }

        if !evicted.is_empty() {
            subscribers.retain(|s| !evicted.contains(&s.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FanOut;
    use crate::bootstrap::OverflowPolicy;
    use adaf_core::loop_run::StopReason;
    use adaf_runner::event::RunnerEvent;

    fn event(n: u64) -> RunnerEvent {
        RunnerEvent::AgentRawOutput {
            turn_id: n,
            line: format!("line {n}"),
        }
    }

    #[tokio::test]
    async fn subscribers_see_events_in_emission_order() {
        let fanout = FanOut::new(16, OverflowPolicy::DropSubscriber);
        let mut a = fanout.subscribe().await;
        let mut b = fanout.subscribe().await;

        for n in 0..5 {
            fanout.publish(&event(n)).await;
        }

        for receiver in [&mut a, &mut b] {
            for n in 0..5 {
                match receiver.recv().await {
                    Some(RunnerEvent::AgentRawOutput { turn_id, .. }) => assert_eq!(turn_id, n),
                    other => panic!("expected raw output {n}, got {other:?}"),
                }
            }
        }
    }

    #[tokio::test]
    async fn slow_subscriber_is_evicted_without_affecting_others() {
        let fanout = FanOut::new(2, OverflowPolicy::DropSubscriber);
        let _slow = fanout.subscribe().await; // never drained
        let mut fast = fanout.subscribe().await;

        // Overflow the slow subscriber's queue of 2.
        for n in 0..3 {
            fanout.publish(&event(n)).await;
            // Keep the fast queue drained.
            let received = fast.recv().await;
            assert!(received.is_some());
        }
        assert_eq!(fanout.subscriber_count().await, 1);

        fanout
            .publish(&RunnerEvent::LoopDone {
                reason: StopReason::Completed,
            })
            .await;
        assert!(matches!(
            fast.recv().await,
            Some(RunnerEvent::LoopDone { .. })
        ));
    }

    #[tokio::test]
    async fn dropped_receiver_is_cleaned_up() {
        let fanout = FanOut::new(4, OverflowPolicy::DropSubscriber);
        let rx = fanout.subscribe().await;
        drop(rx);
        fanout.publish(&event(0)).await;
        assert_eq!(fanout.subscriber_count().await, 0);
    }
}
