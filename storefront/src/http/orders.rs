use super::AppState;
use crate::error::DomainError;
use crate::nostr_auth::verify_nip98;
use crate::session::Session;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use storefront_db::Order;

#[derive(Deserialize)]
pub struct MineQuery {
    nostr_pubkey: Option<String>,
}

/// Returns the union of orders bound to this anonymous session and, when
/// supplied, to a Nostr pubkey — matching spec.md's "session binding" rule
/// that `/orders/mine` returns both without requiring the caller to pick one.
/// Claiming a pubkey requires proving ownership of it via a NIP-98 signed
/// event; an unauthenticated `nostr_pubkey` is dropped rather than widening
/// the result set to someone else's orders.
pub async fn mine(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Query(q): Query<MineQuery>,
) -> Result<Json<Vec<Order>>, DomainError> {
    let nostr_pubkey = match &q.nostr_pubkey {
        Some(pk) => {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or(DomainError::Unauthorized)?;
            if !verify_nip98(auth, pk).map_err(|_| DomainError::Unauthorized)? {
                return Err(DomainError::Unauthorized);
            }
            Some(pk.as_str())
        }
        None => None,
    };

    let orders = state
        .db
        .list_mine_by_contact(Some(session.id.as_str()), nostr_pubkey)
        .await
        .map_err(crate::error::internal)?;
    Ok(Json(orders))
}
