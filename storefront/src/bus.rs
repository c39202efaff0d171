use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use storefront_db::OrderStatus;
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

const HISTORY_LEN: usize = 8;
const SUBSCRIBER_CAPACITY: usize = 32;

#[derive(Debug, Clone, Serialize)]
pub struct StatusChanged {
    pub order_id: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
}

struct Topic {
    history: VecDeque<StatusChanged>,
    sender: broadcast::Sender<StatusChanged>,
}

impl Topic {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            history: VecDeque::with_capacity(HISTORY_LEN),
            sender,
        }
    }
}

/// In-process publish/subscribe keyed by order id. Bounded per-subscriber
/// history for late joiners; no persistence, matching spec.md §4.5 — the
/// store and notification outbox own durability, this is presentation only.
#[derive(Clone)]
pub struct EventBus {
    topics: Arc<Mutex<HashMap<String, Topic>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn publish(&self, event: StatusChanged) {
        let mut topics = self.topics.lock().await;
        let topic = topics.entry(event.order_id.clone()).or_insert_with(Topic::new);

        if topic.history.len() == HISTORY_LEN {
            topic.history.pop_front();
            // diagnostic counter: late joiners lost the oldest frame for this order
            warn!(order_id = %event.order_id, "event bus history dropped oldest frame");
        }
        topic.history.push_back(event.clone());

        // A broadcast send only errors when there are zero receivers, which
        // is the common case between orders being created and the first SSE
        // client connecting; that is not a failure worth logging.
        let _ = topic.sender.send(event);
    }

    /// Late joiners receive the bounded history first, then live events.
    pub async fn subscribe(&self, order_id: &str) -> (Vec<StatusChanged>, broadcast::Receiver<StatusChanged>) {
        let mut topics = self.topics.lock().await;
        let topic = topics.entry(order_id.to_string()).or_insert_with(Topic::new);
        (topic.history.iter().cloned().collect(), topic.sender.subscribe())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscriber_receives_bounded_history_then_live_events() {
        let bus = EventBus::new();
        for i in 0..3u8 {
            bus.publish(StatusChanged {
                order_id: "o1".to_string(),
                from: OrderStatus::Pending,
                to: if i == 2 { OrderStatus::Paid } else { OrderStatus::Pending },
                at: Utc::now(),
            })
            .await;
        }
        let (history, mut rx) = bus.subscribe("o1").await;
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().to, OrderStatus::Paid);

        bus.publish(StatusChanged {
            order_id: "o1".to_string(),
            from: OrderStatus::Paid,
            to: OrderStatus::Preparation,
            at: Utc::now(),
        })
        .await;
        let live = rx.recv().await.unwrap();
        assert_eq!(live.to, OrderStatus::Preparation);
    }

    #[tokio::test]
    async fn history_drops_oldest_beyond_capacity() {
        let bus = EventBus::new();
        for _ in 0..(HISTORY_LEN + 5) {
            bus.publish(StatusChanged {
                order_id: "o2".to_string(),
                from: OrderStatus::Pending,
                to: OrderStatus::Mempool,
                at: Utc::now(),
            })
            .await;
        }
        let (history, _rx) = bus.subscribe("o2").await;
        assert_eq!(history.len(), HISTORY_LEN);
    }
}
