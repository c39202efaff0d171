use super::AppState;
use crate::error::DomainError;
use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use storefront_nostr::issue_comment_proof;

#[derive(Deserialize)]
pub struct CommentProofQuery {
    product_id: String,
}

#[derive(Serialize)]
pub struct CommentProofResponse {
    proof: ProofBody,
    store_pubkey: String,
}

#[derive(Serialize)]
pub struct ProofBody {
    sig: String,
    ts: i64,
}

/// Issues a short-lived signed `(storePubkey, productId, ts)` tuple so a
/// buyer's comment can be cryptographically linked to this shop without any
/// relay needing to know about it (spec.md §4.7/S6).
pub async fn comment_proof(
    State(state): State<AppState>,
    Query(q): Query<CommentProofQuery>,
) -> Result<Json<CommentProofResponse>, DomainError> {
    let proof = issue_comment_proof(&state.nostr_keys, &q.product_id, Utc::now())
        .map_err(crate::error::internal)?;
    Ok(Json(CommentProofResponse {
        proof: ProofBody { sig: proof.sig, ts: proof.ts },
        store_pubkey: proof.store_pubkey,
    }))
}
