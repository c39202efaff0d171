use super::AppState;
use crate::error::DomainError;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use storefront_db::OrderStatus;

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verifies the `x-admin-pin` header against the configured pepper+hash.
/// The PIN entry/session UI itself is out of scope (spec.md Non-goals); this
/// is the minimal collaborator the HTTP surface needs to gate `/api/admin/*`.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), DomainError> {
    let pin = headers
        .get("x-admin-pin")
        .and_then(|v| v.to_str().ok())
        .ok_or(DomainError::Unauthorized)?;
    let hash = hex::encode(Sha256::digest(format!("{pin}{}", state.admin.session_secret).as_bytes()));
    if constant_time_eq(hash.as_bytes(), state.admin.pin_hash.as_bytes()) {
        Ok(())
    } else {
        Err(DomainError::Unauthorized)
    }
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    status: OrderStatus,
    courier: Option<String>,
    tracking: Option<String>,
}

pub async fn set_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<storefront_db::Order>, DomainError> {
    require_admin(&state, &headers)?;
    let order = state
        .state_machine
        .admin_set_status(&order_id, req.status, req.courier, req.tracking)
        .await?;
    if order.status.is_payment_terminal() {
        state.watcher.stop(&order_id).await;
    }
    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct ResendQuery {
    state: OrderStatus,
}

pub async fn resend_notification(
    State(app): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    axum::extract::Query(q): axum::extract::Query<ResendQuery>,
) -> Result<(), DomainError> {
    require_admin(&app, &headers)?;
    app.notify.resend(&order_id, q.state).await.map_err(crate::error::internal)
}
