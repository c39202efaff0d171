use crate::driver::{to_order_status, DriverStatus, DriverUpdate, PaymentDriver};
use crate::state_machine::StateMachine;
use chrono::Utc;
use futures_util::StreamExt;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use storefront_db::{Order, OrderStatus, StorefrontDb};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const POLL_INTERVAL: StdDuration = StdDuration::from_secs(20);
const POLL_JITTER: StdDuration = StdDuration::from_secs(5);
const GRACE_PERIOD: chrono::Duration = chrono::Duration::seconds(30);

fn jittered_poll_interval() -> StdDuration {
    let jitter_ms = rand::thread_rng().gen_range(0..POLL_JITTER.as_millis() as u64);
    POLL_INTERVAL + StdDuration::from_millis(jitter_ms)
}

/// Reconciles one order's payment status against its driver, per spec.md
/// §4.4: race a push subscription (when the driver supports one) against a
/// jittered poll timer, with an absolute deadline past the invoice's
/// expiry that forces one last authoritative poll before giving up.
/// Mirrors the teacher's `PaymentHandler::start_payment_handler`, generalized
/// from a single global subscription to one task per in-flight order.
pub struct PaymentWatcher {
    db: StorefrontDb,
    driver: Arc<dyn PaymentDriver>,
    state_machine: Arc<StateMachine>,
    tasks: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl PaymentWatcher {
    pub fn new(db: StorefrontDb, driver: Arc<dyn PaymentDriver>, state_machine: Arc<StateMachine>) -> Self {
        Self {
            db,
            driver,
            state_machine,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Launches a watcher task for every order that hasn't reached a
    /// payment-terminal state, called once at process startup so an
    /// interrupted reconciliation resumes after a restart.
    pub async fn resume_all(self: &Arc<Self>) -> anyhow::Result<()> {
        let orders = self.db.list_non_terminal().await?;
        for order in orders {
            if !order.status.is_payment_terminal() {
                self.spawn(order).await;
            }
        }
        Ok(())
    }

    /// Registers a watcher for a freshly created order. A no-op if one is
    /// already running for this id.
    pub async fn spawn(self: &Arc<Self>, order: Order) {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&order.id) {
            return;
        }
        let order_id = order.id.clone();
        let token = CancellationToken::new();
        tasks.insert(order_id.clone(), token.clone());
        drop(tasks);

        let watcher = self.clone();
        tokio::spawn(async move {
            watcher.run(order, token).await;
            watcher.tasks.lock().await.remove(&order_id);
        });
    }

    pub async fn stop(&self, order_id: &str) {
        if let Some(token) = self.tasks.lock().await.remove(order_id) {
            token.cancel();
        }
    }

    /// Cancels every running watcher task, used during the shutdown drain.
    /// Cancellation itself is near-instant; callers wait separately for the
    /// tasks to actually unwind.
    pub async fn shutdown(&self) {
        let tasks = self.tasks.lock().await;
        for token in tasks.values() {
            token.cancel();
        }
    }

    async fn run(self: &Arc<Self>, order: Order, token: CancellationToken) {
        let reference = payment_reference(&order);
        let deadline = order.invoice_expires_at + GRACE_PERIOD;

        let mut push = match self.driver.subscribe_push().await {
            Ok(s) => s,
            Err(e) => {
                warn!(order_id = %order.id, "push subscription unavailable, falling back to poll only: {e:#}");
                Box::pin(futures_util::stream::empty())
            }
        };

        loop {
            if token.is_cancelled() {
                info!(order_id = %order.id, "payment watcher cancelled");
                return;
            }

            if Utc::now() >= deadline {
                // one last authoritative poll before giving up on this order
                self.poll_once(&order.id, &reference).await;
                if !self.is_terminal_now(&order.id).await {
                    self.expire(&order.id).await;
                }
                return;
            }

            tokio::select! {
                _ = token.cancelled() => {
                    info!(order_id = %order.id, "payment watcher cancelled");
                    return;
                }
                update = push.next() => {
                    match update {
                        Some(DriverUpdate::Status { reference: update_ref, status }) => {
                            if update_ref != reference {
                                // belongs to a different order sharing this driver's global push feed
                                continue;
                            }
                            if self.apply(&order.id, status).await {
                                return;
                            }
                        }
                        Some(DriverUpdate::Error(e)) => warn!(order_id = %order.id, "driver push error: {e}"),
                        None => {
                            // push stream ended; poll carries the rest of this order's lifetime
                        }
                    }
                }
                _ = tokio::time::sleep(time_until(deadline).min(jittered_poll_interval())) => {
                    self.poll_once(&order.id, &reference).await;
                    if self.is_terminal_now(&order.id).await {
                        return;
                    }
                }
            }
        }
    }

    async fn poll_once(&self, order_id: &str, reference: &str) {
        match self.driver.invoice_status(reference).await {
            Ok(status) => {
                self.apply(order_id, status).await;
            }
            Err(e) => warn!(order_id, "poll failed: {e:#}"),
        }
    }

    /// Returns true once the order has reached a payment-terminal state.
    async fn apply(&self, order_id: &str, status: DriverStatus) -> bool {
        let to = to_order_status(status);
        match self.state_machine.try_transition(order_id, to).await {
            Ok(order) => order.status.is_payment_terminal(),
            Err(e) => {
                warn!(order_id, "state transition failed: {e:#}");
                false
            }
        }
    }

    async fn is_terminal_now(&self, order_id: &str) -> bool {
        matches!(self.db.get_order(order_id).await, Ok(o) if o.status.is_payment_terminal())
    }

    async fn expire(&self, order_id: &str) {
        if let Err(e) = self
            .state_machine
            .try_transition(order_id, OrderStatus::Expired)
            .await
        {
            warn!(order_id, "failed to expire order past grace period: {e:#}");
        }
    }
}

fn payment_reference(order: &Order) -> String {
    order
        .payment_hash
        .clone()
        .or_else(|| order.swap_id.clone())
        .unwrap_or_default()
}

fn time_until(deadline: chrono::DateTime<Utc>) -> StdDuration {
    let delta = deadline - Utc::now();
    delta.to_std().unwrap_or(StdDuration::from_secs(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_order_status_covers_all_driver_states() {
        for s in [
            DriverStatus::Pending,
            DriverStatus::Mempool,
            DriverStatus::Confirmed,
            DriverStatus::Paid,
            DriverStatus::Expired,
            DriverStatus::Failed,
        ] {
            let _ = to_order_status(s);
        }
    }

    #[test]
    fn time_until_never_goes_negative() {
        let past = Utc::now() - chrono::Duration::minutes(5);
        assert_eq!(time_until(past), StdDuration::from_secs(0));
    }
}
