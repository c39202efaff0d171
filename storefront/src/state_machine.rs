use crate::bus::{EventBus, StatusChanged};
use crate::error::DomainError;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use storefront_db::{Order, OrderStatus, StorefrontDb};
use tracing::{info, warn};

/// Notified whenever an order reaches one of the three customer-visible
/// terminal-ish states. Implemented by the notification dispatcher; kept as
/// a trait here so the state machine doesn't need to know about templates,
/// SMTP or the relay pool.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn enqueue(&self, order_id: &str, new_state: OrderStatus);
}

/// The three states a successful transition enqueues a notification for.
const CUSTOMER_VISIBLE: [OrderStatus; 3] = [OrderStatus::Paid, OrderStatus::Preparation, OrderStatus::Shipped];

fn allowed_from(to: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match to {
        Mempool => &[Pending],
        Confirmed => &[Pending, Mempool],
        Paid => &[Pending, Mempool, Confirmed],
        Expired => &[Pending, Mempool],
        Failed => &[Pending, Mempool, Confirmed],
        Preparation => &[Paid],
        Shipped => &[Preparation],
        Pending => &[],
    }
}

/// Owns every order's lifecycle; the only component allowed to mutate
/// `status` (spec.md §4.2). All other components call `try_transition`.
pub struct StateMachine {
    db: StorefrontDb,
    bus: EventBus,
    notify: std::sync::Arc<dyn NotificationSink>,
}

impl StateMachine {
    pub fn new(db: StorefrontDb, bus: EventBus, notify: std::sync::Arc<dyn NotificationSink>) -> Self {
        Self { db, bus, notify }
    }

    /// Attempts a transition restricted to the graph edges for `to`, further
    /// narrowed by the caller-supplied `reported_from` (the driver/admin is
    /// only ever allowed to assert transitions their own evidence covers).
    /// Disallowed transitions are logged and dropped rather than erroring —
    /// a downgrade attempt from a slow poller racing a push update is
    /// expected traffic, not a bug.
    pub async fn try_transition(&self, order_id: &str, to: OrderStatus) -> Result<Order> {
        let from = allowed_from(to);
        if from.is_empty() {
            warn!(order_id, ?to, "rejected transition with no valid predecessor");
            return self.db.get_order(order_id).await;
        }

        let (applied, order, prior_status) = self.db.transition_status(order_id, from, to).await?;
        if applied {
            info!(order_id, ?to, "order transitioned");
            self.bus
                .publish(StatusChanged {
                    order_id: order_id.to_string(),
                    from: prior_status,
                    to,
                    at: Utc::now(),
                })
                .await;
            if CUSTOMER_VISIBLE.contains(&to) {
                self.notify.enqueue(order_id, to).await;
            }
        } else {
            info!(order_id, ?to, current = ?order.status, "dropped disallowed or already-applied transition");
        }
        Ok(order)
    }

    /// Admin-driven fulfillment update. `SHIPPED` requires non-empty
    /// courier/tracking and admin may move bidirectionally between
    /// PREPARATION/SHIPPED, but never out of a payment-terminal state.
    pub async fn admin_set_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        courier: Option<String>,
        tracking: Option<String>,
    ) -> Result<Order, DomainError> {
        let current = self
            .db
            .get_order(order_id)
            .await
            .map_err(|_| DomainError::NotFound)?;

        if current.status.is_payment_terminal() && matches!(current.status, OrderStatus::Expired | OrderStatus::Failed) {
            return Err(DomainError::Conflict("order payment is terminal".to_string()));
        }

        match status {
            OrderStatus::Shipped => {
                let (courier, tracking) = (courier.clone(), tracking.clone());
                if courier.as_deref().unwrap_or("").trim().is_empty()
                    || tracking.as_deref().unwrap_or("").trim().is_empty()
                {
                    return Err(DomainError::Validation(
                        "SHIPPED requires non-empty courier and tracking".to_string(),
                    ));
                }
                self.db
                    .set_fulfillment(order_id, &courier.unwrap(), &tracking.unwrap())
                    .await
                    .map_err(crate::error::internal)?;
            }
            OrderStatus::Preparation | OrderStatus::Paid => {}
            _ => return Err(DomainError::Validation("admin may only set PAID/PREPARATION/SHIPPED".to_string())),
        }

        let allowed: &[OrderStatus] = match status {
            OrderStatus::Preparation => &[OrderStatus::Paid, OrderStatus::Shipped],
            OrderStatus::Shipped => &[OrderStatus::Preparation, OrderStatus::Paid],
            OrderStatus::Paid => &[OrderStatus::Preparation, OrderStatus::Shipped],
            _ => &[],
        };

        let (applied, order, _) = self
            .db
            .transition_status(order_id, allowed, status)
            .await
            .map_err(crate::error::internal)?;
        if applied {
            self.bus
                .publish(StatusChanged {
                    order_id: order_id.to_string(),
                    from: current.status,
                    to: status,
                    at: Utc::now(),
                })
                .await;
            if CUSTOMER_VISIBLE.contains(&status) {
                self.notify.enqueue(order_id, status).await;
            }
            Ok(order)
        } else {
            Err(DomainError::Conflict(format!(
                "cannot move order from {} to {status}",
                current.status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl NotificationSink for CountingSink {
        async fn enqueue(&self, _order_id: &str, _new_state: OrderStatus) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn draft() -> storefront_db::OrderDraft {
        storefront_db::OrderDraft {
            payment_method: storefront_db::PaymentMethod::Lightning,
            provider: "test".to_string(),
            payment_hash: Some(uuid::Uuid::new_v4().to_string()),
            payment_request: Some("lnbc1...".to_string()),
            swap_id: None,
            onchain_address: None,
            onchain_amount_sats: None,
            bip21: None,
            subtotal_sats: 1_000,
            shipping_sats: 100,
            items: vec![],
            address: Default::default(),
            contact: Default::default(),
            notes: None,
            session_id: None,
            invoice_expires_at: Utc::now() + chrono::Duration::minutes(10),
        }
    }

    #[tokio::test]
    async fn paid_notifies_once_even_under_concurrent_callers() {
        let db = StorefrontDb::new(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        let order = db.create_order(draft().await).await.unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let sm = StateMachine::new(db, EventBus::new(), Arc::new(CountingSink(count.clone())));

        let (a, b) = tokio::join!(
            sm.try_transition(&order.id, OrderStatus::Paid),
            sm.try_transition(&order.id, OrderStatus::Paid),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shipped_requires_courier_and_tracking() {
        let db = StorefrontDb::new(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        let order = db.create_order(draft().await).await.unwrap();
        let sm = StateMachine::new(db, EventBus::new(), Arc::new(CountingSink(Arc::new(AtomicUsize::new(0)))));
        sm.try_transition(&order.id, OrderStatus::Paid).await.unwrap();

        let err = sm
            .admin_set_status(&order.id, OrderStatus::Shipped, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
