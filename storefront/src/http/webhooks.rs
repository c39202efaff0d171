use super::AppState;
use crate::driver::to_order_status;
use crate::error::DomainError;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use tracing::{info, warn};

/// Provider-initiated push delivered over HTTP instead of a long-lived
/// subscription (the `HostedDriver` path). The body is only trusted after
/// `verify_webhook` passes; a bad signature is a 401 with no body, never a
/// parsed-but-ignored 200 (that would let an attacker probe order state).
pub async fn receive(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<(), DomainError> {
    if provider != state.provider {
        return Err(DomainError::NotFound);
    }

    let event = state
        .driver
        .verify_webhook(&headers, &body)
        .map_err(|_| DomainError::Unauthorized)?;

    let order = match state.db.by_payment_hash(&event.order_ref).await.map_err(crate::error::internal)? {
        Some(o) => o,
        None => match state.db.by_swap_id(&event.order_ref).await.map_err(crate::error::internal)? {
            Some(o) => o,
            None => {
                warn!(reference = %event.order_ref, "webhook for unknown order reference");
                return Ok(());
            }
        },
    };

    let to = to_order_status(event.new_state);
    match state.state_machine.try_transition(&order.id, to).await {
        Ok(updated) => {
            info!(order_id = %order.id, ?to, "webhook applied transition");
            if updated.status.is_payment_terminal() {
                state.watcher.stop(&order.id).await;
            }
        }
        Err(e) => warn!(order_id = %order.id, "webhook transition failed: {e:#}"),
    }
    Ok(())
}
